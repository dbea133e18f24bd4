//! Multi-round diagnosis loop (routing-restricted).
//!
//! Deterministic-first baseline collection, then up to `max_rounds` planning
//! rounds. The planner returns a plan JSON; the system executes cmd_ids.
//! Command selection is restricted to the routing pool of the current
//! primary category, minus everything already executed. Stop conditions are
//! checked in a fixed order before each round.

use crate::context::OrchestratorContext;
use crate::graph::{first_line_summary, CmdOutcome, Orchestrator};
use crate::pack::{EvidencePack, NextCheck, Snapshot};
use crate::planner_prompt::build_plan_prompt;
use crate::OrchestratorError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sre_audit_log::AuditLog;
use sre_config::AgentConfig;
use sre_evidence::EvidenceStore;
use sre_exec::Executor;
use sre_llm::PlannerClient;
use sre_registry::get_command_meta;
use sre_report::{build_report, validate_schema};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct DiagnoseBudget {
    pub max_rounds: u32,
    pub max_cmds_per_round: usize,
    pub max_total_cmds: usize,
    pub time_budget_sec: u64,
    pub confidence_threshold: f64,
}

impl Default for DiagnoseBudget {
    fn default() -> Self {
        DiagnoseBudget {
            max_rounds: 3,
            max_cmds_per_round: 3,
            max_total_cmds: 12,
            time_budget_sec: 120,
            confidence_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Plan {
    decision: String,
    #[serde(default)]
    next_cmds: Vec<PlannedCmd>,
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedCmd {
    pub cmd_id: String,
    pub timeout_sec: Option<u64>,
    pub rationale: Option<String>,
}

pub struct DiagnoseOutcome {
    pub evidence_pack: EvidencePack,
    pub diagnosis_report: Value,
    pub diagnosis_trace: Value,
}

pub async fn multi_round_diagnose(
    config: &AgentConfig,
    ctx: &OrchestratorContext,
    executor: Arc<dyn Executor>,
    llm: &dyn PlannerClient,
    plan_schema: &Value,
    report_schema: &Value,
    budget: &DiagnoseBudget,
) -> Result<DiagnoseOutcome, OrchestratorError> {
    // Step 1: baseline + deterministic targeted collection
    let orch = Orchestrator::new(config.clone(), executor);
    let mut pack = orch.run(ctx).await?;
    let initial_primary = pack.primary_category();
    let mut primary = initial_primary.clone();

    let store = EvidenceStore::new(
        &config.evidence.base_dir,
        &ctx.session_id,
        config.evidence.retain_raw,
    )?;
    let audit = (!config.audit_log.is_empty()).then(|| AuditLog::new(&config.audit_log));
    let platform = ctx.resolve_platform();

    let mut executed: BTreeSet<String> =
        pack.snapshots.iter().map(|s| s.cmd_id.clone()).collect();
    let mut audit_refs: Vec<String> =
        pack.snapshots.iter().map(|s| s.audit_ref.clone()).collect();

    let start = Instant::now();
    let mut stop_reason = String::new();
    let mut trace_rounds: Vec<Value> = Vec::new();

    for round in 1..=budget.max_rounds {
        if start.elapsed().as_secs() >= budget.time_budget_sec {
            stop_reason = "time_budget_exceeded".into();
            break;
        }
        if executed.len() >= budget.max_total_cmds {
            stop_reason = "max_total_cmds_exceeded".into();
            break;
        }
        let pool: Vec<String> = config
            .routes
            .routes
            .get(&primary)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|c| !executed.contains(c))
            .collect();
        if pool.is_empty() {
            stop_reason = "allowed_cmd_pool_exhausted".into();
            break;
        }

        // Compact state for the planner: summaries + signals, never raw.
        let tail_start = pack.snapshots.len().saturating_sub(20);
        let state = json!({
            "meta": &pack.meta,
            "primary_category": primary,
            "hypothesis": &pack.hypothesis,
            "signals": &pack.signals,
            "snapshots": &pack.snapshots[tail_start..],
            "executed_cmd_ids": &executed,
            "budget": {
                "round": round,
                "max_rounds": budget.max_rounds,
                "max_cmds_per_round": budget.max_cmds_per_round,
                "max_total_cmds": budget.max_total_cmds,
                "time_budget_sec": budget.time_budget_sec,
                "confidence_threshold": budget.confidence_threshold,
            },
        });

        let prompt = build_plan_prompt(&state, &pool, plan_schema, budget.max_cmds_per_round);
        info!(round, %primary, remaining_pool = pool.len(), "llm plan round");
        let plan_value = llm.generate_json(&prompt, plan_schema, 0.2).await?;

        if let Err(err) = validate_schema(&plan_value, plan_schema) {
            warn!(round, %err, "plan rejected by schema");
            stop_reason = "plan_schema_error".into();
            trace_rounds.push(json!({
                "round": round,
                "decision": "INVALID",
                "error": err.to_string(),
                "allowed_cmd_pool": pool,
                "blocked": [],
                "executed": [],
            }));
            break;
        }
        let plan: Plan = serde_json::from_value(plan_value.clone())?;

        if plan.decision.eq_ignore_ascii_case("STOP") {
            stop_reason = plan
                .stop_reason
                .clone()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "llm_stop".to_string());
            trace_rounds.push(json!({
                "round": round,
                "decision": "STOP",
                "plan": plan_value,
                "allowed_cmd_pool": pool,
                "blocked": [],
                "executed": [],
            }));
            break;
        }

        // Filter proposed commands against the allowlist, dedup, registry.
        let mut kept: Vec<PlannedCmd> = Vec::new();
        let mut blocked: Vec<Value> = Vec::new();
        for item in &plan.next_cmds {
            let cmd_id = item.cmd_id.trim();
            if cmd_id.is_empty() {
                continue;
            }
            if !pool.iter().any(|c| c == cmd_id) {
                blocked.push(json!({"cmd_id": cmd_id, "reason": "not_in_allowed_pool"}));
                continue;
            }
            if executed.contains(cmd_id) {
                blocked.push(json!({"cmd_id": cmd_id, "reason": "duplicate"}));
                continue;
            }
            if get_command_meta(orch.commands(), cmd_id).is_err() {
                blocked.push(json!({"cmd_id": cmd_id, "reason": "unknown_cmd_id"}));
                continue;
            }
            kept.push(item.clone());
            if kept.len() >= budget.max_cmds_per_round {
                break;
            }
        }

        let mut executed_this_round: Vec<Value> = Vec::new();
        for item in &kept {
            let timeout_sec = item.timeout_sec.unwrap_or(30);
            match orch
                .exec_cmd(ctx, &item.cmd_id, &platform, &store, audit.as_ref(), timeout_sec)
                .await?
            {
                CmdOutcome::Executed(rec) => {
                    audit_refs.push(rec.audit_ref.clone());
                    for (k, v) in &rec.signals {
                        if !v.is_null() {
                            pack.signals.insert(k.clone(), v.clone());
                        }
                    }
                    if rec.redacted.trim().is_empty() {
                        pack.metrics.empty_outputs += 1;
                    }
                    if rec.timed_out {
                        pack.metrics.timeouts += 1;
                    }
                    pack.snapshots.push(Snapshot {
                        cmd_id: item.cmd_id.clone(),
                        signal: first_line_summary(&rec.redacted),
                        summary: format!("round_{round}"),
                        audit_ref: rec.audit_ref.clone(),
                    });
                    executed.insert(item.cmd_id.clone());
                    executed_this_round.push(json!({
                        "cmd_id": item.cmd_id.clone(),
                        "timeout_sec": timeout_sec,
                        "audit_ref": rec.audit_ref.clone(),
                    }));
                }
                CmdOutcome::Skipped(reason) => {
                    pack.metrics.skipped += 1;
                    executed.insert(item.cmd_id.clone());
                    blocked.push(json!({"cmd_id": item.cmd_id.clone(), "reason": reason.as_str()}));
                    pack.next_checks.push(NextCheck {
                        cmd_id: item.cmd_id.clone(),
                        purpose: reason.purpose().to_string(),
                    });
                }
            }
        }

        // Reclassify with the new evidence.
        pack.hypothesis = orch.classify(&pack.signals);
        for h in &mut pack.hypothesis {
            h.evidence_refs = audit_refs.iter().take(8).cloned().collect();
        }
        primary = pack.primary_category();

        let round_trace = json!({
            "round": round,
            "decision": "CONTINUE",
            "plan": plan_value,
            "allowed_cmd_pool": pool,
            "blocked": blocked,
            "executed": executed_this_round,
        });
        store.write_index(&format!("llm_round_{round:03}"), &round_trace)?;
        trace_rounds.push(round_trace);

        let top_confidence = pack.hypothesis.first().map(|h| h.confidence).unwrap_or(0.0);
        if top_confidence >= budget.confidence_threshold {
            stop_reason = "confidence_threshold_reached".into();
            break;
        }
    }

    if stop_reason.is_empty() {
        stop_reason = "max_rounds_reached".into();
    }
    info!(%stop_reason, %primary, rounds = trace_rounds.len(), "diagnose loop finished");

    pack.meta.collection_window_minutes = Some(ctx.window_minutes);
    pack.meta.agent_version = Some(env!("CARGO_PKG_VERSION").to_string());

    let evidence_value = serde_json::to_value(&pack)?;
    let report = build_report(llm, &evidence_value, report_schema).await?;

    let diagnosis_trace = json!({
        "session_id": ctx.session_id,
        "initial_primary": initial_primary,
        "primary": primary,
        "stop_reason": stop_reason,
        "budget": budget,
        "rounds": trace_rounds,
    });

    store.write_index("diagnosis_trace", &diagnosis_trace)?;
    store.write_index("diagnosis_report", &report)?;
    store.write_index("evidence_pack", &pack)?;

    Ok(DiagnoseOutcome {
        evidence_pack: pack,
        diagnosis_report: report,
        diagnosis_trace,
    })
}
