//! Command registry: metadata, builtin table, template rendering.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown cmd_id: {0}")]
    UnknownCommand(String),
    #[error("{placeholder} is required for this command")]
    MissingParameter { placeholder: &'static str },
}

/// Risk class of a registered command or proposed action.
/// Parsed case-insensitively so config files and model output may use any
/// casing; serialized in canonical SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", try_from = "String")]
pub enum RiskClass {
    ReadOnly,
    Low,
    Medium,
    High,
}

impl TryFrom<String> for RiskClass {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_uppercase().as_str() {
            "READ_ONLY" => Ok(RiskClass::ReadOnly),
            "LOW" => Ok(RiskClass::Low),
            "MEDIUM" => Ok(RiskClass::Medium),
            "HIGH" => Ok(RiskClass::High),
            other => Err(format!("unknown risk class: {other}")),
        }
    }
}

impl std::str::FromStr for RiskClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RiskClass::try_from(s.to_string())
    }
}

impl fmt::Display for RiskClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskClass::ReadOnly => "READ_ONLY",
            RiskClass::Low => "LOW",
            RiskClass::Medium => "MEDIUM",
            RiskClass::High => "HIGH",
        };
        f.write_str(s)
    }
}

/// One registry entry. `cmd` is a template that may contain `{service}`
/// and/or `{pid}`; no other placeholders are recognized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMeta {
    pub cmd: String,
    pub risk: RiskClass,
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_platform() -> String {
    "any".to_string()
}

impl CommandMeta {
    pub fn requires_service(&self) -> bool {
        self.cmd.contains("{service}")
    }

    pub fn requires_pid(&self) -> bool {
        self.cmd.contains("{pid}")
    }

    /// `any`/`all` entries run everywhere; otherwise the declared platform
    /// must equal the resolved session platform.
    pub fn platform_matches(&self, platform: &str) -> bool {
        let declared = self.platform.trim().to_ascii_lowercase();
        declared.is_empty()
            || declared == "any"
            || declared == "all"
            || declared == platform.to_ascii_lowercase()
    }
}

pub fn get_command_meta<'a>(
    commands: &'a BTreeMap<String, CommandMeta>,
    cmd_id: &str,
) -> Result<&'a CommandMeta, RegistryError> {
    commands
        .get(cmd_id)
        .ok_or_else(|| RegistryError::UnknownCommand(cmd_id.to_string()))
}

/// Literal substitution of `{service}` / `{pid}`. Fails when a placeholder
/// is present but the corresponding argument is empty.
pub fn render_command(
    template: &str,
    service: Option<&str>,
    pid: Option<&str>,
) -> Result<String, RegistryError> {
    let mut rendered = template.to_string();
    if template.contains("{service}") {
        let service = service.unwrap_or("");
        if service.is_empty() {
            return Err(RegistryError::MissingParameter {
                placeholder: "service",
            });
        }
        rendered = rendered.replace("{service}", service);
    }
    if template.contains("{pid}") {
        let pid = pid.unwrap_or("");
        if pid.is_empty() {
            return Err(RegistryError::MissingParameter { placeholder: "pid" });
        }
        rendered = rendered.replace("{pid}", pid);
    }
    Ok(rendered)
}

/// Builtin read-only command table, used when the config carries no
/// `commands` section.
pub fn default_commands() -> BTreeMap<String, CommandMeta> {
    let entries: &[(&str, &str)] = &[
        // base system
        ("uname", "uname -a"),
        ("uptime", "uptime"),
        ("loadavg", "cat /proc/loadavg"),
        ("top", "top -b -n 1 | head -n 50"),
        ("ps_cpu", "ps -eo pid,ppid,cmd,%cpu,%mem --sort=-%cpu | head -n 20"),
        ("ps_mem", "ps -eo pid,ppid,cmd,%cpu,%mem --sort=-%mem | head -n 15"),
        ("vmstat", "vmstat 1 5"),
        ("iostat", "iostat -x 1 3"),
        ("free", "free -m"),
        ("df", "df -h"),
        ("mpstat", "mpstat -P ALL 1 1"),
        ("pidstat", "pidstat -h 1 1"),
        // per-process cpu
        ("proc_pid_status", "cat /proc/{pid}/status"),
        ("proc_pid_stat", "cat /proc/{pid}/stat"),
        ("proc_pid_stack", "cat /proc/{pid}/stack"),
        ("proc_pid_sched", "cat /proc/{pid}/sched"),
        ("lsof_pid", "lsof -p {pid} 2>/dev/null | head -n 50"),
        // per-process io
        ("proc_pid_io", "cat /proc/{pid}/io"),
        ("iotop", "iotop -b -n 1 -o | head -n 20"),
        ("pidstat_io", "pidstat -d 1 2"),
        // jvm
        ("jps", "jps -l"),
        ("jstat", "jstat -gcutil {pid} 1 5"),
        ("jstat_gc", "jstat -gc {pid} 1 1"),
        ("jstack", "jstack -l {pid}"),
        ("jcmd_threads", "jcmd {pid} Thread.print"),
        ("jcmd_heap", "jcmd {pid} GC.heap_info"),
        // logs
        (
            "journalctl",
            "journalctl -u {service} --since \"30 min ago\" --no-pager",
        ),
        ("dmesg", "dmesg | tail -n 50"),
        // network
        ("netstat", "netstat -tnp 2>/dev/null | head -n 30"),
        ("ss", "ss -tnp | head -n 30"),
    ];

    entries
        .iter()
        .map(|(id, cmd)| {
            let platform = match *id {
                "journalctl" | "proc_pid_status" | "proc_pid_stat" | "proc_pid_stack"
                | "proc_pid_sched" | "proc_pid_io" | "loadavg" => "linux",
                _ => "any",
            };
            (
                (*id).to_string(),
                CommandMeta {
                    cmd: (*cmd).to_string(),
                    risk: RiskClass::ReadOnly,
                    platform: platform.to_string(),
                },
            )
        })
        .collect()
}
