//! Builtin schema set. Callers may substitute file-loaded schemas; these
//! are the defaults the CLI ships with.

use serde_json::{json, Value};

/// Per-round planner output.
pub fn plan_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "decision": {"type": "string", "enum": ["CONTINUE", "STOP"]},
            "next_cmds": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "cmd_id": {"type": "string"},
                        "timeout_sec": {"type": "integer", "minimum": 1},
                        "rationale": {"type": "string"}
                    },
                    "required": ["cmd_id"],
                    "additionalProperties": false
                }
            },
            "stop_reason": {"type": "string"}
        },
        "required": ["decision"],
        "additionalProperties": false
    })
}

/// Final diagnosis report.
pub fn report_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "meta": {
                "type": "object",
                "properties": {
                    "host": {"type": "string"},
                    "service": {"type": "string"},
                    "session_id": {"type": "string"},
                    "timestamp": {"type": "string"}
                },
                "required": ["host", "service"]
            },
            "root_cause": {
                "type": "object",
                "properties": {
                    "category": {"type": "string"},
                    "summary": {"type": "string"},
                    "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                    "details": {"type": "string"}
                },
                "required": ["category", "summary", "confidence"]
            },
            "evidence_summary": {
                "type": "array",
                "items": {"type": "string"}
            },
            "next_actions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "action": {"type": "string"},
                        "risk": {"type": "string"},
                        "expected_effect": {"type": "string"}
                    },
                    "required": ["action", "risk"]
                }
            },
            "audit": {
                "type": "object",
                "properties": {
                    "blocked_actions": {"type": "array"}
                }
            }
        },
        "required": ["meta", "root_cause", "evidence_summary", "next_actions"]
    })
}

/// Persisted evidence pack.
pub fn evidence_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "meta": {
                "type": "object",
                "properties": {
                    "host": {"type": "string"},
                    "service": {"type": "string"},
                    "session_id": {"type": "string"},
                    "platform": {"type": "string"},
                    "timestamp": {"type": "string"}
                },
                "required": ["host", "service", "timestamp"]
            },
            "snapshots": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "cmd_id": {"type": "string"},
                        "signal": {"type": "string"},
                        "summary": {"type": "string"},
                        "audit_ref": {"type": "string"}
                    },
                    "required": ["cmd_id"]
                }
            },
            "hypothesis": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "category": {"type": "string"},
                        "confidence": {"type": "number"},
                        "why": {"type": "string"},
                        "evidence_refs": {"type": "array"},
                        "counter_evidence": {"type": "array"}
                    },
                    "required": ["category", "confidence"]
                }
            },
            "next_checks": {"type": "array"},
            "signals": {"type": "object"},
            "policy": {"type": "object"},
            "metrics": {"type": "object"}
        },
        "required": ["meta", "snapshots", "hypothesis", "signals"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::validate_schema;
    use serde_json::json;

    #[test]
    fn plan_schema_accepts_minimal_stop() {
        validate_schema(&json!({"decision": "STOP", "stop_reason": "done"}), &plan_schema())
            .unwrap();
    }

    #[test]
    fn plan_schema_rejects_unknown_decision() {
        assert!(validate_schema(&json!({"decision": "MAYBE"}), &plan_schema()).is_err());
    }

    #[test]
    fn plan_schema_rejects_extra_keys() {
        assert!(validate_schema(
            &json!({"decision": "STOP", "tool_calls": []}),
            &plan_schema()
        )
        .is_err());
    }

    #[test]
    fn report_schema_accepts_canonical_shape() {
        let report = json!({
            "meta": {"host": "web1", "service": "nginx"},
            "root_cause": {"category": "CPU", "summary": "busy", "confidence": 0.7},
            "evidence_summary": ["loadavg_1m=7.1"],
            "next_actions": [{"action": "inspect top consumers", "risk": "READ_ONLY"}],
            "audit": {"blocked_actions": []}
        });
        validate_schema(&report, &report_schema()).unwrap();
    }
}
