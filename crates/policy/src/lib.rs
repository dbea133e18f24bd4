//! sre_policy
//!
//! The read-only guard. Two pure checks gate everything that could touch a
//! host or end up in a report:
//! - `is_command_allowed` runs before any command execution
//! - `filter_actions` runs over LLM-proposed next_actions in the final report
//!
//! Neither function performs I/O or fails; a denied command is simply never
//! executed and the denial is recorded by the caller.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sre_registry::{CommandMeta, RiskClass};

pub mod validators;

/// Risk allowlist + deny-keyword list, usually loaded from policy.yaml.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPolicy {
    #[serde(default = "default_allowed_risks")]
    pub allowed_risks: Vec<RiskClass>,
    #[serde(default)]
    pub deny_keywords: Vec<String>,
}

fn default_allowed_risks() -> Vec<RiskClass> {
    vec![RiskClass::ReadOnly]
}

impl Default for ActionPolicy {
    fn default() -> Self {
        ActionPolicy {
            allowed_risks: default_allowed_risks(),
            deny_keywords: Vec::new(),
        }
    }
}

impl ActionPolicy {
    /// The report-stage default admits LOW next_actions in addition to
    /// READ_ONLY ones.
    pub fn report_default() -> Self {
        ActionPolicy {
            allowed_risks: vec![RiskClass::ReadOnly, RiskClass::Low],
            deny_keywords: Vec::new(),
        }
    }
}

/// True iff the command's risk class is allowed and no deny keyword appears
/// (case-insensitively) in the command template.
pub fn is_command_allowed(
    meta: &CommandMeta,
    allowed_risks: &[RiskClass],
    deny_keywords: &[String],
) -> bool {
    if !allowed_risks.is_empty() && !allowed_risks.contains(&meta.risk) {
        return false;
    }
    let cmd = meta.cmd.to_ascii_lowercase();
    !deny_keywords
        .iter()
        .any(|k| !k.is_empty() && cmd.contains(&k.to_ascii_lowercase()))
}

/// Split proposed actions into (allowed, blocked). Each blocked action is
/// annotated with `blocked_reason` = `risk_not_allowed` | `deny_keyword`.
/// An unparseable or missing risk counts as not allowed.
pub fn filter_actions(
    actions: &[Value],
    allowed_risks: &[RiskClass],
    deny_keywords: &[String],
) -> (Vec<Value>, Vec<Value>) {
    let mut allowed: Vec<Value> = Vec::new();
    let mut blocked: Vec<Value> = Vec::new();

    for action in actions {
        let risk = action
            .get("risk")
            .and_then(Value::as_str)
            .and_then(|s| s.parse::<RiskClass>().ok());
        let text = action
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_ascii_lowercase();

        let reason = if !allowed_risks.is_empty()
            && !risk.is_some_and(|r| allowed_risks.contains(&r))
        {
            Some("risk_not_allowed")
        } else if deny_keywords
            .iter()
            .any(|k| !k.is_empty() && text.contains(&k.to_ascii_lowercase()))
        {
            Some("deny_keyword")
        } else {
            None
        };

        match reason {
            Some(reason) => {
                let mut annotated = action.clone();
                if let Some(obj) = annotated.as_object_mut() {
                    obj.insert("blocked_reason".to_string(), Value::String(reason.into()));
                }
                blocked.push(annotated);
            }
            None => allowed.push(action.clone()),
        }
    }

    (allowed, blocked)
}
