//! Offline replay: re-run the rule engine over stored signals and check
//! schema validity, without touching any host.

use serde_json::{json, Value};
use sre_report::validate_schema;
use sre_rules::{RuleEngine, RulesConfig};

#[derive(Debug, Clone)]
pub struct ReplayResult {
    pub id: String,
    pub predicted: String,
    pub expected: String,
    pub schema_ok: bool,
}

impl ReplayResult {
    pub fn ok(&self) -> bool {
        self.schema_ok && self.predicted == self.expected
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Metrics {
    pub total: usize,
    pub correct: usize,
    pub schema_ok: usize,
}

impl Metrics {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    pub fn schema_pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.schema_ok as f64 / self.total as f64
        }
    }
}

fn synthetic_pack(signals: &Value) -> Value {
    json!({
        "meta": {"host": "h", "service": "svc", "session_id": "replay", "platform": "linux",
                 "timestamp": sre_common::now_iso()},
        "snapshots": [],
        "hypothesis": [],
        "next_checks": [],
        "signals": signals,
        "policy": {"allowed_risks": ["READ_ONLY"], "deny_keywords": []},
        "metrics": {"timeouts": 0, "empty_outputs": 0, "skipped": 0}
    })
}

/// Replay one case: `{id, signals, expected_category}`.
pub fn replay_case(case: &Value, evidence_schema: &Value) -> ReplayResult {
    let id = case.get("id").and_then(Value::as_str).unwrap_or("").to_string();
    let expected = case
        .get("expected_category")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN")
        .to_string();
    let signals = case.get("signals").cloned().unwrap_or_else(|| json!({}));

    let evidence = synthetic_pack(&signals);
    let schema_ok = validate_schema(&evidence, evidence_schema).is_ok();

    let signal_map = serde_json::from_value(signals).unwrap_or_default();
    let engine = RuleEngine::new(&RulesConfig::default());
    let predicted = engine
        .classify(&signal_map)
        .first()
        .map(|h| h.category.clone())
        .unwrap_or_else(|| "UNKNOWN".to_string());

    ReplayResult {
        id,
        predicted,
        expected,
        schema_ok,
    }
}

pub fn compute_metrics(results: &[ReplayResult]) -> Metrics {
    Metrics {
        total: results.len(),
        correct: results.iter().filter(|r| r.predicted == r.expected).count(),
        schema_ok: results.iter().filter(|r| r.schema_ok).count(),
    }
}
