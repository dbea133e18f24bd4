//! Evidence pack: the cumulative, session-scoped record of what was
//! collected and how it was classified.

use serde::{Deserialize, Serialize};
use sre_policy::ActionPolicy;
use sre_registry::SignalMap;
use sre_rules::Hypothesis;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackMeta {
    pub host: String,
    pub service: String,
    pub env: String,
    pub session_id: String,
    pub platform: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection_window_minutes: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
}

/// One successful command execution, summarized. `audit_ref` resolves to an
/// audit log entry of the same session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub cmd_id: String,
    pub signal: String,
    pub summary: String,
    pub audit_ref: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NextCheck {
    pub cmd_id: String,
    pub purpose: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackMetrics {
    pub timeouts: u64,
    pub empty_outputs: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidencePack {
    pub meta: PackMeta,
    pub snapshots: Vec<Snapshot>,
    pub hypothesis: Vec<Hypothesis>,
    pub next_checks: Vec<NextCheck>,
    pub signals: SignalMap,
    pub policy: ActionPolicy,
    pub metrics: PackMetrics,
}

impl EvidencePack {
    pub fn primary_category(&self) -> String {
        self.hypothesis
            .first()
            .map(|h| h.category.clone())
            .unwrap_or_else(|| "UNKNOWN".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_falls_back_to_unknown() {
        let pack = EvidencePack {
            meta: PackMeta {
                host: "h".into(),
                service: "s".into(),
                env: String::new(),
                session_id: "sid".into(),
                platform: "linux".into(),
                timestamp: "t".into(),
                collection_window_minutes: None,
                agent_version: None,
            },
            snapshots: vec![],
            hypothesis: vec![],
            next_checks: vec![],
            signals: SignalMap::new(),
            policy: ActionPolicy::default(),
            metrics: PackMetrics::default(),
        };
        assert_eq!(pack.primary_category(), "UNKNOWN");
    }

    #[test]
    fn optional_meta_fields_are_omitted_from_json() {
        let meta = PackMeta {
            host: "h".into(),
            service: "s".into(),
            env: String::new(),
            session_id: "sid".into(),
            platform: "linux".into(),
            timestamp: "t".into(),
            collection_window_minutes: None,
            agent_version: None,
        };
        let v = serde_json::to_value(&meta).unwrap();
        assert!(v.get("collection_window_minutes").is_none());
        assert!(v.get("agent_version").is_none());
    }
}
