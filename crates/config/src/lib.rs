//! sre_config
//!
//! Typed agent configuration, assembled from a set of YAML files
//! (commands, routing, rules, policy, runtime) that are deep-merged in
//! order, overlaid by the `SRE_ENV` environment block, and finally patched
//! by individual `SRE_*` environment variables.
//!
//! The resolved config is passed by value into the orchestrator at session
//! start; nothing here is a process-wide singleton.

use serde::{Deserialize, Serialize};
use sre_exec::SshConfig;
use sre_llm::LlmConfig;
use sre_policy::ActionPolicy;
use sre_registry::{default_commands, CommandMeta};
use sre_rules::RulesConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config file {path}: {reason}")]
    Invalid { path: String, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RoutingConfig {
    /// primary category -> ordered targeted cmd_id list
    #[serde(default)]
    pub routes: BTreeMap<String, Vec<String>>,
}

/// Baseline command selection: either a flat list or per-platform lists
/// keyed by `any` / `linux` / `darwin` / ...
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BaselineCmds {
    Flat(Vec<String>),
    ByPlatform(BTreeMap<String, Vec<String>>),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BaselineConfig {
    #[serde(default)]
    pub cmds: Option<BaselineCmds>,
}

impl BaselineConfig {
    /// Resolve the baseline set for a platform. Fallback default mirrors a
    /// minimal first-look: uname, uptime, df.
    pub fn for_platform(&self, platform: &str) -> Vec<String> {
        match &self.cmds {
            Some(BaselineCmds::Flat(list)) => list.clone(),
            Some(BaselineCmds::ByPlatform(map)) => {
                let mut out: Vec<String> =
                    map.get("any").cloned().unwrap_or_default();
                out.extend(map.get(platform).cloned().unwrap_or_default());
                out
            }
            None => vec!["uname".into(), "uptime".into(), "df".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceConfig {
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default = "default_retain_raw")]
    pub retain_raw: bool,
}

fn default_base_dir() -> String {
    "report".to_string()
}

fn default_retain_raw() -> bool {
    true
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        EvidenceConfig {
            base_dir: default_base_dir(),
            retain_raw: default_retain_raw(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AgentConfig {
    #[serde(default)]
    pub commands: BTreeMap<String, CommandMeta>,
    #[serde(default, alias = "routing")]
    pub routes: RoutingConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub action_policy: ActionPolicy,
    #[serde(default)]
    pub baseline: BaselineConfig,
    #[serde(default)]
    pub evidence: EvidenceConfig,
    #[serde(default)]
    pub audit_log: String,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    /// `SRE_ENV`-selected overlays, deep-merged at load time.
    #[serde(default)]
    pub environments: BTreeMap<String, serde_yaml::Value>,
}

impl AgentConfig {
    /// Registered commands, falling back to the builtin read-only table
    /// when the config carries none.
    pub fn effective_commands(&self) -> BTreeMap<String, CommandMeta> {
        if self.commands.is_empty() {
            default_commands()
        } else {
            self.commands.clone()
        }
    }
}

/// The standard config file set for a config directory, in merge order
/// (later files win).
pub fn standard_config_paths(config_dir: &Path) -> Vec<PathBuf> {
    ["runtime.yaml", "policy.yaml", "commands.yaml", "routing.yaml", "rules.yaml"]
        .iter()
        .map(|f| config_dir.join(f))
        .collect()
}

fn deep_merge(base: &mut serde_yaml::Value, incoming: serde_yaml::Value) {
    use serde_yaml::Value;
    match (base, incoming) {
        (Value::Mapping(base_map), Value::Mapping(incoming_map)) => {
            for (k, v) in incoming_map {
                match base_map.get_mut(&k) {
                    Some(slot) if slot.is_mapping() && v.is_mapping() => deep_merge(slot, v),
                    Some(slot) => *slot = v,
                    None => {
                        base_map.insert(k, v);
                    }
                }
            }
        }
        (slot, v) => *slot = v,
    }
}

fn apply_environment_overlay(
    mut merged: serde_yaml::Value,
    env_name: Option<&str>,
) -> serde_yaml::Value {
    let Some(env_name) = env_name.filter(|e| !e.trim().is_empty()) else {
        return merged;
    };
    let overlay = merged
        .get("environments")
        .and_then(|envs| envs.get(env_name))
        .cloned();
    match overlay {
        Some(overlay) => {
            deep_merge(&mut merged, overlay);
            merged
        }
        None => merged,
    }
}

/// Load and deep-merge a list of YAML files. Missing files are skipped with
/// a warning so a partial config directory still works.
pub fn load_config_files(paths: &[PathBuf]) -> Result<AgentConfig, ConfigError> {
    load_config_files_with_env(paths, std::env::var("SRE_ENV").ok().as_deref())
}

pub fn load_config_files_with_env(
    paths: &[PathBuf],
    env_name: Option<&str>,
) -> Result<AgentConfig, ConfigError> {
    let mut merged = serde_yaml::Value::Mapping(Default::default());
    for path in paths {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, skipping");
            continue;
        }
        let text = fs::read_to_string(path)?;
        let value: serde_yaml::Value = serde_yaml::from_str(&text)?;
        if value.is_null() {
            continue;
        }
        if !value.is_mapping() {
            return Err(ConfigError::Invalid {
                path: path.display().to_string(),
                reason: "expected a top-level mapping".into(),
            });
        }
        deep_merge(&mut merged, value);
    }

    let merged = apply_environment_overlay(merged, env_name);
    Ok(serde_yaml::from_value(merged)?)
}

/// Patch the loaded config from the process environment. Split out with an
/// injectable lookup so tests never mutate process env.
pub fn apply_env_overrides(config: &mut AgentConfig) {
    apply_env_overrides_from(config, |name| std::env::var(name).ok());
}

pub fn apply_env_overrides_from(
    config: &mut AgentConfig,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(v) = lookup("SRE_SSH_USER").filter(|v| !v.is_empty()) {
        config.ssh.user = v;
    }
    if let Some(v) = lookup("SRE_SSH_PASSWORD").filter(|v| !v.is_empty()) {
        config.ssh.password = v;
    }
    if let Some(v) = lookup("SRE_SSH_PORT").and_then(|v| v.parse().ok()) {
        config.ssh.port = v;
    }
    if let Some(v) = lookup("SRE_LLM_VENDOR").filter(|v| !v.is_empty()) {
        config.llm.vendor = v;
    }
    if let Some(v) = lookup("SRE_LLM_MODEL").filter(|v| !v.is_empty()) {
        config.llm.model = v;
    }
    if let Some(v) = lookup("SRE_LLM_BASE_URL").filter(|v| !v.is_empty()) {
        config.llm.base_url = v;
    }
    if let Some(v) = lookup("SRE_LLM_API_KEY").filter(|v| !v.is_empty()) {
        config.llm.api_key = v;
    }
    if let Some(v) = lookup("OPS_AGENT_AUDIT_LOG").filter(|v| !v.is_empty()) {
        config.audit_log = v;
    }
}
