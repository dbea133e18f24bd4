//! sre-agent: read-only SRE diagnostic agent CLI.
//!
//! Subcommands cover the whole pipeline: one-off command execution,
//! deterministic evidence collection, multi-round LLM-planned diagnosis,
//! report generation, offline replay, and alert/ticket adapters.

mod replay;
mod webhook;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use sre_audit_log::{AuditLog, AuditRecord};
use sre_config::{
    apply_env_overrides, load_config_files, standard_config_paths, AgentConfig, ConfigError,
};
use sre_exec::{Executor, LocalExecutor, SshConfig, SshExecutor};
use sre_llm::{create_planner, LlmError};
use sre_orchestrator::{
    multi_round_diagnose, DiagnoseBudget, ExecMode, Orchestrator, OrchestratorContext,
    OrchestratorError,
};
use sre_policy::{is_command_allowed, validators};
use sre_registry::{get_command_meta, render_command};
use sre_report::{build_report, schemas, validate_schema, ReportError, SchemaError};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError),
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Report(#[from] ReportError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("audit error: {0}")]
    Audit(#[from] sre_audit_log::AuditLogError),
}

#[derive(Parser)]
#[command(name = "sre-agent", version, about = "Read-only SRE diagnostic agent")]
struct Args {
    /// Directory holding the YAML config set
    #[arg(long, global = true, default_value = "configs")]
    config_dir: PathBuf,

    /// Log level (overrides SRE_LOG_LEVEL)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show the resolved planner vendor and its capabilities.
    Info {
        #[arg(long)]
        llm_vendor: Option<String>,
    },

    /// Execute a single registered read-only command by cmd_id.
    Exec {
        #[arg(long)]
        host: String,
        #[arg(long)]
        cmd_id: String,
        #[arg(long)]
        service: Option<String>,
        #[arg(long)]
        pid: Option<String>,
        #[arg(long, default_value_t = 30)]
        timeout: u64,
        #[arg(long, default_value = "ssh")]
        exec_mode: String,
        #[arg(long)]
        ssh_user: Option<String>,
        #[arg(long)]
        ssh_password: Option<String>,
        #[arg(long)]
        ssh_port: Option<u16>,
        #[arg(long)]
        audit_log: Option<PathBuf>,
    },

    /// Run the deterministic orchestrator and emit the evidence pack.
    Run {
        #[arg(long)]
        host: String,
        #[arg(long)]
        service: String,
        #[arg(long, default_value_t = 30)]
        window_minutes: u32,
        #[arg(long, default_value = "")]
        env: String,
        #[arg(long)]
        pid: Option<String>,
        /// auto|linux|darwin|k8s
        #[arg(long, default_value = "auto")]
        platform: String,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value = "ssh")]
        exec_mode: String,
        #[arg(long)]
        ssh_user: Option<String>,
        #[arg(long)]
        ssh_password: Option<String>,
        #[arg(long)]
        ssh_port: Option<u16>,
        /// Path to an evidence schema; builtin schema when omitted
        #[arg(long)]
        evidence_schema: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Multi-round diagnose: collect, plan under budget, report.
    Diagnose {
        #[arg(long)]
        host: String,
        #[arg(long)]
        service: String,
        #[arg(long, default_value_t = 30)]
        window_minutes: u32,
        #[arg(long, default_value = "")]
        env: String,
        #[arg(long)]
        pid: Option<String>,
        #[arg(long, default_value = "auto")]
        platform: String,
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long, default_value = "ssh")]
        exec_mode: String,
        #[arg(long)]
        ssh_user: Option<String>,
        #[arg(long)]
        ssh_password: Option<String>,
        #[arg(long)]
        ssh_port: Option<u16>,
        #[arg(long)]
        llm_vendor: Option<String>,
        #[arg(long)]
        plan_schema: Option<PathBuf>,
        #[arg(long)]
        report_schema: Option<PathBuf>,
        #[arg(long, default_value_t = 3)]
        max_rounds: u32,
        #[arg(long, default_value_t = 3)]
        max_cmds_per_round: usize,
        #[arg(long, default_value_t = 12)]
        max_total_cmds: usize,
        #[arg(long, default_value_t = 120)]
        time_budget_sec: u64,
        #[arg(long, default_value_t = 0.85)]
        confidence_threshold: f64,
        #[arg(long)]
        output_evidence: Option<PathBuf>,
        #[arg(long)]
        output_report: Option<PathBuf>,
        #[arg(long)]
        output_trace: Option<PathBuf>,
    },

    /// Generate a report from a stored evidence pack via the planner.
    Report {
        #[arg(long)]
        evidence: PathBuf,
        /// Path to a report schema; builtin schema when omitted
        #[arg(long)]
        schema: Option<PathBuf>,
        #[arg(long)]
        llm_vendor: Option<String>,
    },

    /// Replay a fixture case suite through the rule engine.
    Replay {
        #[arg(long)]
        cases: PathBuf,
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Normalize an alert webhook payload into run arguments.
    IngestAlert {
        #[arg(long)]
        payload: PathBuf,
    },

    /// Convert a report JSON into a generic ticket payload.
    Ticket {
        #[arg(long)]
        report: PathBuf,
    },
}

fn init_logging(level: Option<&str>) {
    let level = level
        .map(str::to_string)
        .or_else(|| std::env::var("SRE_LOG_LEVEL").ok())
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_config(config_dir: &Path) -> Result<AgentConfig, CliError> {
    let mut config = load_config_files(&standard_config_paths(config_dir))?;
    apply_env_overrides(&mut config);
    Ok(config)
}

fn ssh_config_with_overrides(
    base: &SshConfig,
    user: Option<String>,
    password: Option<String>,
    port: Option<u16>,
) -> SshConfig {
    let mut ssh = base.clone();
    if let Some(user) = user {
        ssh.user = user;
    }
    if let Some(password) = password {
        ssh.password = password;
    }
    if let Some(port) = port {
        ssh.port = port;
    }
    ssh
}

fn build_executor(mode: ExecMode, ssh: SshConfig) -> Arc<dyn Executor> {
    match mode {
        ExecMode::Local => Arc::new(LocalExecutor),
        ExecMode::Ssh => Arc::new(SshExecutor::new(ssh)),
    }
}

fn load_json_file(path: &Path) -> Result<Value, CliError> {
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

fn load_schema_or(path: Option<&PathBuf>, builtin: Value) -> Result<Value, CliError> {
    match path {
        Some(p) => load_json_file(p),
        None => Ok(builtin),
    }
}

fn write_json_output(path: &Path, payload: &Value) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, serde_json::to_string_pretty(payload)?)?;
    Ok(())
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_logging(args.log_level.as_deref());
    dotenvy::dotenv().ok();

    match run(args).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("ERROR: {e}");
            std::process::exit(1);
        }
    }
}

async fn run(args: Args) -> Result<i32, CliError> {
    match args.cmd {
        Command::Info { llm_vendor } => {
            let mut config = resolve_config(&args.config_dir)?;
            if let Some(vendor) = llm_vendor {
                config.llm.vendor = vendor;
            }
            let vendor = if config.llm.vendor.is_empty() {
                "qwen".to_string()
            } else {
                config.llm.vendor.clone()
            };
            let planner = create_planner(&config.llm)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "llm_vendor": vendor,
                    "capabilities": planner.capabilities(),
                }))?
            );
            Ok(0)
        }

        Command::Exec {
            host,
            cmd_id,
            service,
            pid,
            timeout,
            exec_mode,
            ssh_user,
            ssh_password,
            ssh_port,
            audit_log,
        } => {
            let config = resolve_config(&args.config_dir)?;
            let commands = config.effective_commands();

            let meta = match get_command_meta(&commands, &cmd_id) {
                Ok(meta) => meta,
                Err(err) => {
                    eprintln!("command not found: {err}");
                    return Ok(2);
                }
            };

            let policy = &config.action_policy;
            if !is_command_allowed(meta, &policy.allowed_risks, &policy.deny_keywords) {
                eprintln!("command blocked by policy");
                return Ok(3);
            }

            let service = service.unwrap_or_default();
            if meta.requires_service() && !validators::validate_service(&service) {
                eprintln!("invalid or missing --service");
                return Ok(4);
            }
            let pid = pid.unwrap_or_default();
            if meta.requires_pid() && !validators::validate_pid(&pid) {
                eprintln!("invalid or missing --pid");
                return Ok(4);
            }

            let command = match render_command(&meta.cmd, Some(service.as_str()), Some(pid.as_str())) {
                Ok(command) => command,
                Err(err) => {
                    eprintln!("failed to render command: {err}");
                    return Ok(5);
                }
            };

            let mode = match exec_mode.parse::<ExecMode>() {
                Ok(mode) => mode,
                Err(err) => {
                    eprintln!("{err}");
                    return Ok(6);
                }
            };
            let ssh = ssh_config_with_overrides(&config.ssh, ssh_user, ssh_password, ssh_port);
            let executor = build_executor(mode, ssh);

            let started_at = sre_common::now_iso();
            let start = Instant::now();
            let output = executor.run(&host, &command, timeout).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            info!(%cmd_id, elapsed_ms, "exec finished");

            let (redacted, rules, replaced) = sre_redaction::redact(&output);
            let output_hash = sre_redaction::hash_text(&redacted);

            let audit_path = audit_log
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| config.audit_log.clone());
            if !audit_path.is_empty() {
                let epoch = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                AuditLog::new(&audit_path).append(&AuditRecord {
                    session_id: String::new(),
                    id: format!("{cmd_id}-{epoch}"),
                    cmd_id: cmd_id.clone(),
                    cmd: command,
                    started_at,
                    elapsed_ms,
                    output_hash,
                    redacted_fields: rules,
                    redacted_count: replaced as u64,
                })?;
            }

            println!("{redacted}");
            Ok(0)
        }

        Command::Run {
            host,
            service,
            window_minutes,
            env,
            pid,
            platform,
            session_id,
            exec_mode,
            ssh_user,
            ssh_password,
            ssh_port,
            evidence_schema,
            output,
        } => {
            let config = resolve_config(&args.config_dir)?;

            let mode = match exec_mode.parse::<ExecMode>() {
                Ok(mode) => mode,
                Err(err) => {
                    eprintln!("{err}");
                    return Ok(6);
                }
            };
            let ssh = ssh_config_with_overrides(&config.ssh, ssh_user, ssh_password, ssh_port);
            let executor = build_executor(mode, ssh);

            let ctx = OrchestratorContext {
                host,
                service,
                window_minutes,
                env,
                session_id: session_id.unwrap_or_else(sre_common::new_session_id),
                exec_mode: mode,
                pid,
                platform,
            };

            let orch = Orchestrator::new(config, executor);
            let pack = match orch.run(&ctx).await {
                Ok(pack) => pack,
                Err(OrchestratorError::InvalidInput(msg)) => {
                    eprintln!("invalid input: {msg}");
                    return Ok(4);
                }
                Err(err) => return Err(err.into()),
            };
            info!(session_id = %ctx.session_id, "run finished");

            let schema = load_schema_or(evidence_schema.as_ref(), schemas::evidence_schema())?;
            let pack_value = serde_json::to_value(&pack)?;
            validate_schema(&pack_value, &schema)?;

            match output {
                Some(path) => write_json_output(&path, &pack_value)?,
                None => println!("{}", serde_json::to_string_pretty(&pack_value)?),
            }
            Ok(0)
        }

        Command::Diagnose {
            host,
            service,
            window_minutes,
            env,
            pid,
            platform,
            session_id,
            exec_mode,
            ssh_user,
            ssh_password,
            ssh_port,
            llm_vendor,
            plan_schema,
            report_schema,
            max_rounds,
            max_cmds_per_round,
            max_total_cmds,
            time_budget_sec,
            confidence_threshold,
            output_evidence,
            output_report,
            output_trace,
        } => {
            let mut config = resolve_config(&args.config_dir)?;
            if let Some(vendor) = llm_vendor {
                config.llm.vendor = vendor;
            }

            let mode = match exec_mode.parse::<ExecMode>() {
                Ok(mode) => mode,
                Err(err) => {
                    eprintln!("{err}");
                    return Ok(6);
                }
            };
            let ssh = ssh_config_with_overrides(&config.ssh, ssh_user, ssh_password, ssh_port);
            let executor = build_executor(mode, ssh);
            let planner = create_planner(&config.llm)?;

            let ctx = OrchestratorContext {
                host,
                service,
                window_minutes,
                env,
                session_id: session_id.unwrap_or_else(sre_common::new_session_id),
                exec_mode: mode,
                pid,
                platform,
            };

            let budget = DiagnoseBudget {
                max_rounds,
                max_cmds_per_round,
                max_total_cmds,
                time_budget_sec,
                confidence_threshold,
            };

            let plan_schema = load_schema_or(plan_schema.as_ref(), schemas::plan_schema())?;
            let report_schema =
                load_schema_or(report_schema.as_ref(), schemas::report_schema())?;

            info!(
                host = %ctx.host,
                service = %ctx.service,
                session_id = %ctx.session_id,
                "diagnose start"
            );

            let outcome = match multi_round_diagnose(
                &config,
                &ctx,
                executor,
                planner.as_ref(),
                &plan_schema,
                &report_schema,
                &budget,
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(OrchestratorError::InvalidInput(msg)) => {
                    eprintln!("invalid input: {msg}");
                    return Ok(4);
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(path) = &output_evidence {
                write_json_output(path, &serde_json::to_value(&outcome.evidence_pack)?)?;
            }
            if let Some(path) = &output_report {
                write_json_output(path, &outcome.diagnosis_report)?;
            }
            if let Some(path) = &output_trace {
                write_json_output(path, &outcome.diagnosis_trace)?;
            }
            if output_report.is_none() {
                println!("{}", serde_json::to_string_pretty(&outcome.diagnosis_report)?);
            }
            Ok(0)
        }

        Command::Report {
            evidence,
            schema,
            llm_vendor,
        } => {
            let mut config = resolve_config(&args.config_dir)?;
            if let Some(vendor) = llm_vendor {
                config.llm.vendor = vendor;
            }
            let planner = create_planner(&config.llm)?;

            let mut evidence = load_json_file(&evidence)?;
            let schema = load_schema_or(schema.as_ref(), schemas::report_schema())?;

            // carry the configured policy into the evidence so the builder
            // can enforce it
            if let Some(obj) = evidence.as_object_mut() {
                if !obj.contains_key("policy") {
                    obj.insert(
                        "policy".to_string(),
                        serde_json::to_value(&config.action_policy)?,
                    );
                }
            }

            let report = build_report(planner.as_ref(), &evidence, &schema).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(0)
        }

        Command::Replay { cases, schema } => {
            let cases = load_json_file(&cases)?;
            let schema = load_schema_or(schema.as_ref(), schemas::evidence_schema())?;
            let results: Vec<replay::ReplayResult> = cases
                .as_array()
                .map(|arr| arr.iter().map(|c| replay::replay_case(c, &schema)).collect())
                .unwrap_or_default();
            let metrics = replay::compute_metrics(&results);
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "total": metrics.total,
                    "accuracy": metrics.accuracy(),
                    "schema_pass_rate": metrics.schema_pass_rate(),
                    "failed": results
                        .iter()
                        .filter(|r| !r.ok())
                        .map(|r| json!({"id": r.id, "predicted": r.predicted, "expected": r.expected}))
                        .collect::<Vec<_>>(),
                }))?
            );
            Ok(0)
        }

        Command::IngestAlert { payload } => {
            let payload = load_json_file(&payload)?;
            let normalized = webhook::normalize_alert(&payload);
            println!("{}", serde_json::to_string_pretty(&normalized)?);
            Ok(0)
        }

        Command::Ticket { report } => {
            let report = load_json_file(&report)?;
            let ticket = webhook::build_ticket_payload(&report);
            println!("{}", serde_json::to_string_pretty(&ticket)?);
            Ok(0)
        }
    }
}
