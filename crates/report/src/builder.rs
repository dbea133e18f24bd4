//! Report builder.
//!
//! Prompts the planner with the evidence pack, then enforces the action
//! policy on `next_actions` even when the schema passes: blocked actions
//! move to `audit.blocked_actions`.

use crate::prompt::build_report_prompt;
use crate::schema::{validate_schema, SchemaError};
use serde_json::Value;
use sre_llm::{LlmError, PlannerClient};
use sre_policy::filter_actions;
use sre_registry::RiskClass;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

fn policy_from_evidence(evidence: &Value) -> (Vec<RiskClass>, Vec<String>) {
    let allowed = evidence
        .pointer("/policy/allowed_risks")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .filter_map(|s| s.parse().ok())
                .collect::<Vec<RiskClass>>()
        })
        .unwrap_or_else(|| vec![RiskClass::ReadOnly, RiskClass::Low]);
    let deny = evidence
        .pointer("/policy/deny_keywords")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    (allowed, deny)
}

pub async fn build_report(
    llm: &dyn PlannerClient,
    evidence: &Value,
    schema: &Value,
) -> Result<Value, ReportError> {
    let prompt = build_report_prompt(evidence, schema);
    let mut report = llm.generate_json(&prompt, schema, 0.2).await?;

    let (allowed_risks, deny_keywords) = policy_from_evidence(evidence);

    if let Some(obj) = report.as_object_mut() {
        let actions = obj.get("next_actions").and_then(Value::as_array).cloned();
        if let Some(actions) = actions {
            let (allowed, blocked) = filter_actions(&actions, &allowed_risks, &deny_keywords);
            if !blocked.is_empty() {
                info!(blocked = blocked.len(), "report actions blocked by policy");
            }
            obj.insert("next_actions".to_string(), Value::Array(allowed));

            let audit = obj
                .entry("audit")
                .or_insert_with(|| Value::Object(Default::default()));
            if let Some(audit_obj) = audit.as_object_mut() {
                let slot = audit_obj
                    .entry("blocked_actions")
                    .or_insert_with(|| Value::Array(Vec::new()));
                if let Some(list) = slot.as_array_mut() {
                    list.extend(blocked);
                }
            }
        }
    }

    validate_schema(&report, schema)?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::report_schema;
    use async_trait::async_trait;
    use serde_json::json;
    use sre_llm::Capabilities;

    #[derive(Debug)]
    struct CannedPlanner {
        reply: Value,
    }

    #[async_trait]
    impl PlannerClient for CannedPlanner {
        async fn generate_json(
            &self,
            _prompt: &str,
            _schema: &Value,
            _temperature: f64,
        ) -> Result<Value, LlmError> {
            Ok(self.reply.clone())
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities {
                json_schema: false,
                tool_calling: false,
                streaming: false,
            }
        }
    }

    fn canned_report() -> Value {
        json!({
            "meta": {"host": "web1", "service": "nginx"},
            "root_cause": {"category": "CPU", "summary": "runaway worker", "confidence": 0.8},
            "evidence_summary": ["loadavg_1m=7.1"],
            "next_actions": [
                {"action": "collect a second jstack", "risk": "READ_ONLY", "expected_effect": "none"},
                {"action": "restart the service", "risk": "HIGH", "expected_effect": "downtime"}
            ]
        })
    }

    #[tokio::test]
    async fn blocked_actions_move_to_audit() {
        let planner = CannedPlanner {
            reply: canned_report(),
        };
        let evidence = json!({"policy": {"allowed_risks": ["READ_ONLY", "LOW"], "deny_keywords": []}});
        let report = build_report(&planner, &evidence, &report_schema())
            .await
            .unwrap();

        assert_eq!(report["next_actions"].as_array().unwrap().len(), 1);
        let blocked = report["audit"]["blocked_actions"].as_array().unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0]["blocked_reason"], json!("risk_not_allowed"));
    }

    #[tokio::test]
    async fn deny_keywords_from_evidence_apply() {
        let planner = CannedPlanner {
            reply: canned_report(),
        };
        let evidence = json!({"policy": {
            "allowed_risks": ["READ_ONLY", "LOW", "HIGH"],
            "deny_keywords": ["restart"]
        }});
        let report = build_report(&planner, &evidence, &report_schema())
            .await
            .unwrap();
        let blocked = report["audit"]["blocked_actions"].as_array().unwrap();
        assert_eq!(blocked[0]["blocked_reason"], json!("deny_keyword"));
    }

    #[tokio::test]
    async fn default_policy_admits_read_only_and_low() {
        let planner = CannedPlanner {
            reply: canned_report(),
        };
        let report = build_report(&planner, &json!({}), &report_schema())
            .await
            .unwrap();
        assert_eq!(report["next_actions"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_report_fails_schema() {
        let planner = CannedPlanner {
            reply: json!({"meta": {"host": "h", "service": "s"}}),
        };
        let err = build_report(&planner, &json!({}), &report_schema())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Schema(_)));
    }
}
