use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write_config_dir(root: &TempDir) -> PathBuf {
    let dir = root.path().join("configs");
    fs::create_dir_all(&dir).unwrap();

    fs::write(
        dir.join("commands.yaml"),
        r#"
commands:
  hello:
    cmd: echo hello from the agent
    risk: READ_ONLY
  uptime:
    cmd: "echo '10:00:00 up 3 days, load average: 7.10, 6.50, 6.20'"
    risk: READ_ONLY
  unit_status:
    cmd: echo unit {service} ok
    risk: READ_ONLY
  kill9:
    cmd: kill -9 {pid}
    risk: READ_ONLY
"#,
    )
    .unwrap();

    fs::write(
        dir.join("policy.yaml"),
        r#"
action_policy:
  allowed_risks: [READ_ONLY]
  deny_keywords: [kill, reboot, shutdown]
"#,
    )
    .unwrap();

    fs::write(
        dir.join("routing.yaml"),
        r#"
routing:
  routes:
    CPU: []
baseline:
  cmds: [uptime]
"#,
    )
    .unwrap();

    let runtime = format!(
        "evidence:\n  base_dir: {}\naudit_log: {}\n",
        root.path().join("report").display(),
        root.path().join("audit.jsonl").display()
    );
    fs::write(dir.join("runtime.yaml"), runtime).unwrap();

    dir
}

fn sre_agent() -> Command {
    Command::cargo_bin("sre-agent").unwrap()
}

#[test]
fn exec_local_prints_output_and_writes_audit() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);
    let audit = root.path().join("exec_audit.jsonl");

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "exec",
            "--host",
            "localhost",
            "--cmd-id",
            "hello",
            "--exec-mode",
            "local",
            "--audit-log",
            audit.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from the agent"));

    let line = fs::read_to_string(&audit).unwrap();
    assert!(line.contains("\"cmd_id\":\"hello\""));
    assert!(line.contains("\"output_hash\""));
}

#[test]
fn exec_renders_service_placeholder() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "exec",
            "--host",
            "localhost",
            "--cmd-id",
            "unit_status",
            "--service",
            "nginx",
            "--exec-mode",
            "local",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("unit nginx ok"));
}

#[test]
fn exec_unknown_command_exits_2() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "exec",
            "--host",
            "localhost",
            "--cmd-id",
            "nope",
            "--exec-mode",
            "local",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("command not found"));
}

#[test]
fn exec_policy_block_exits_3() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "exec",
            "--host",
            "localhost",
            "--cmd-id",
            "kill9",
            "--pid",
            "123",
            "--exec-mode",
            "local",
        ])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("blocked by policy"));
}

#[test]
fn exec_missing_service_exits_4() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "exec",
            "--host",
            "localhost",
            "--cmd-id",
            "unit_status",
            "--exec-mode",
            "local",
        ])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("--service"));
}

#[test]
fn exec_invalid_exec_mode_exits_6() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "exec",
            "--host",
            "localhost",
            "--cmd-id",
            "hello",
            "--exec-mode",
            "docker",
        ])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("invalid exec mode"));
}

#[test]
fn run_local_emits_schema_valid_evidence_pack() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);
    let out = root.path().join("pack.json");

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "run",
            "--host",
            "localhost",
            "--service",
            "nginx",
            "--exec-mode",
            "local",
            "--platform",
            "linux",
            "--session-id",
            "it_run_001",
            "--output",
            out.to_str().unwrap(),
        ])
        .assert()
        .success();

    let pack: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(pack["meta"]["session_id"], serde_json::json!("it_run_001"));
    assert_eq!(pack["signals"]["loadavg_1m"], serde_json::json!(7.10));
    assert_eq!(pack["hypothesis"][0]["category"], serde_json::json!("CPU"));

    // evidence layout on disk
    let session_dir = root.path().join("report").join("it_run_001");
    assert!(session_dir.join("index").join("evidence_pack.json").exists());
    assert!(session_dir.join("redacted").is_dir());

    // audit entries carry the session id
    let audit = fs::read_to_string(root.path().join("audit.jsonl")).unwrap();
    assert!(audit.contains("\"session_id\":\"it_run_001\""));
}

#[test]
fn run_invalid_service_exits_4() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "run",
            "--host",
            "localhost",
            "--service",
            "bad name",
            "--exec-mode",
            "local",
        ])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("invalid input"));
}

#[test]
fn ingest_alert_normalizes_payload() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);
    let payload = root.path().join("alert.json");
    fs::write(
        &payload,
        r#"{"hostname": "web1", "app": "nginx", "environment": "prod", "window": 15}"#,
    )
    .unwrap();

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "ingest-alert",
            "--payload",
            payload.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"host\": \"web1\""))
        .stdout(predicate::str::contains("\"window_minutes\": 15"));
}

#[test]
fn ticket_converts_report() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);
    let report = root.path().join("report.json");
    fs::write(
        &report,
        r#"{"meta": {"host": "web1", "service": "nginx"},
            "root_cause": {"category": "CPU", "summary": "busy"}}"#,
    )
    .unwrap();

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "ticket",
            "--report",
            report.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("SRE diagnosis: nginx on web1"));
}

#[test]
fn replay_reports_suite_metrics() {
    let root = TempDir::new().unwrap();
    let configs = write_config_dir(&root);
    let cases = root.path().join("cases.json");
    fs::write(
        &cases,
        r#"[
            {"id": "cpu", "signals": {"loadavg_1m": 7.1}, "expected_category": "CPU"},
            {"id": "io", "signals": {"iowait_pct": 42.3}, "expected_category": "IO_WAIT"}
        ]"#,
    )
    .unwrap();

    sre_agent()
        .args([
            "--config-dir",
            configs.to_str().unwrap(),
            "replay",
            "--cases",
            cases.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"accuracy\": 1.0"))
        .stdout(predicate::str::contains("\"total\": 2"));
}
