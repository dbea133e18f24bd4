//! Session context.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    Ssh,
    Local,
}

impl FromStr for ExecMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssh" => Ok(ExecMode::Ssh),
            "local" => Ok(ExecMode::Local),
            other => Err(format!("invalid exec mode: {other} (use ssh|local)")),
        }
    }
}

impl fmt::Display for ExecMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExecMode::Ssh => "ssh",
            ExecMode::Local => "local",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorContext {
    pub host: String,
    pub service: String,
    pub window_minutes: u32,
    pub env: String,
    pub session_id: String,
    pub exec_mode: ExecMode,
    pub pid: Option<String>,
    /// auto | linux | darwin | k8s. Resolved once at session start.
    pub platform: String,
}

impl OrchestratorContext {
    /// `auto` resolves to darwin only for local execution on macOS;
    /// everything remote is assumed linux.
    pub fn resolve_platform(&self) -> String {
        let p = self.platform.trim().to_ascii_lowercase();
        if !p.is_empty() && p != "auto" {
            return p;
        }
        if self.exec_mode == ExecMode::Local && cfg!(target_os = "macos") {
            "darwin".to_string()
        } else {
            "linux".to_string()
        }
    }
}
