//! sre_exec
//!
//! Command execution transports. The `Executor` contract is best-effort:
//! implementations never fail — non-zero exits, timeouts, and transport
//! errors all come back as captured text so the pipeline keeps moving.
//!
//! Two transports:
//! - `LocalExecutor`: runs a shell pipeline on this host (dev/tests)
//! - `SshExecutor`: wraps the command in a login shell on a remote host

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs one rendered command against a target host and returns combined
/// stdout + stderr. MUST NOT raise on non-zero exit; on timeout the output
/// is the textual marker `command timeout after <N>s`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, host: &str, command: &str, timeout_sec: u64) -> String;
}

async fn run_collecting(mut cmd: Command, timeout_sec: u64, error_prefix: &str) -> String {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let fut = cmd.output();
    match tokio::time::timeout(Duration::from_secs(timeout_sec), fut).await {
        Ok(Ok(out)) => {
            let mut text = String::from_utf8_lossy(&out.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&out.stderr);
            if !stderr.is_empty() {
                text.push_str("\n[stderr]\n");
                text.push_str(&stderr);
            }
            text
        }
        Ok(Err(err)) => format!("{error_prefix}: {err}"),
        Err(_) => format!("command timeout after {timeout_sec}s"),
    }
}

/// POSIX single-quote escaping.
pub fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

// ---------------------------------------------------------------------------
// Local
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct LocalExecutor;

#[async_trait]
impl Executor for LocalExecutor {
    async fn run(&self, _host: &str, command: &str, timeout_sec: u64) -> String {
        debug!(command, timeout_sec, "local exec");
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        run_collecting(cmd, timeout_sec, "exec error").await
    }
}

// ---------------------------------------------------------------------------
// SSH
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub strict_host_key: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
}

fn default_user() -> String {
    "root".to_string()
}

fn default_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    10
}

impl Default for SshConfig {
    fn default() -> Self {
        SshConfig {
            user: default_user(),
            password: String::new(),
            port: default_port(),
            strict_host_key: false,
            connect_timeout: default_connect_timeout(),
        }
    }
}

pub struct SshExecutor {
    config: SshConfig,
}

/// Silent prelude for the remote login shell: source the standard startup
/// files and, when the JVM tools are not on PATH but `java` resolves,
/// derive JAVA_HOME from the resolved java binary. The whole block is
/// redirected so it can never leak into captured output.
const LOGIN_BOOTSTRAP: &str = "{ [ -f /etc/profile ] && . /etc/profile; \
[ -f \"$HOME/.bash_profile\" ] && . \"$HOME/.bash_profile\"; \
[ -f \"$HOME/.bashrc\" ] && . \"$HOME/.bashrc\"; \
if ! command -v jps && command -v java; then \
JAVA_HOME=\"$(dirname \"$(dirname \"$(readlink -f \"$(command -v java)\")\")\")\"; \
export JAVA_HOME; export PATH=\"$JAVA_HOME/bin:$PATH\"; \
fi; } >/dev/null 2>&1 || true; ";

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn target(&self, host: &str) -> String {
        if host.contains('@') {
            host.to_string()
        } else {
            format!("{}@{host}", self.config.user)
        }
    }

    /// Build the full argv (program + args). Exposed for tests.
    pub fn build_invocation(&self, host: &str, command: &str) -> Vec<String> {
        let wrapped = format!(
            "bash -l -c {}",
            shell_quote(&format!("{LOGIN_BOOTSTRAP}{command}"))
        );
        let strict = if self.config.strict_host_key {
            "yes"
        } else {
            "no"
        };

        let mut argv: Vec<String> = Vec::new();
        if !self.config.password.is_empty() {
            // password auth: sshpass reads the password from $SSHPASS,
            // never from the command line
            argv.push("sshpass".into());
            argv.push("-e".into());
            argv.push("ssh".into());
            argv.push("-o".into());
            argv.push("PreferredAuthentications=password".into());
        } else {
            argv.push("ssh".into());
            argv.push("-o".into());
            argv.push("BatchMode=yes".into());
        }
        argv.push("-o".into());
        argv.push(format!("StrictHostKeyChecking={strict}"));
        argv.push("-o".into());
        argv.push(format!("ConnectTimeout={}", self.config.connect_timeout));
        argv.push("-p".into());
        argv.push(self.config.port.to_string());
        argv.push(self.target(host));
        argv.push(wrapped);
        argv
    }
}

#[async_trait]
impl Executor for SshExecutor {
    async fn run(&self, host: &str, command: &str, timeout_sec: u64) -> String {
        let argv = self.build_invocation(host, command);
        debug!(host, command, timeout_sec, "ssh exec");
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..]);
        if !self.config.password.is_empty() {
            cmd.env("SSHPASS", &self.config.password);
        }
        run_collecting(cmd, timeout_sec, "ssh error").await
    }
}
