//! Planner prompt builder for the multi-round diagnose loop.
//!
//! The planner is constrained to pick cmd_ids only from the provided
//! allowlist and must return one JSON object conforming to the plan schema.
//! The state handed over contains redacted summaries and signals only —
//! never raw command output.

use serde_json::Value;

pub fn build_plan_prompt(
    state: &Value,
    allowed_cmd_pool: &[String],
    plan_schema: &Value,
    max_cmds_per_round: usize,
) -> String {
    let executed = state
        .get("executed_cmd_ids")
        .cloned()
        .unwrap_or_else(|| Value::Array(vec![]));
    let budget = state
        .get("budget")
        .cloned()
        .unwrap_or_else(|| Value::Object(Default::default()));
    let allowed = serde_json::to_string(allowed_cmd_pool).unwrap_or_else(|_| "[]".to_string());

    format!(
        "You are an SRE diagnosis planner. Your job is to decide what evidence to collect next.\n\
         Hard constraints:\n\
         - You MUST return ONLY a single JSON object (no markdown, no code fences).\n\
         - The JSON MUST conform to the provided plan schema (no extra keys).\n\
         - You MUST ONLY choose cmd_id from allowed_cmd_pool (never invent cmd_id).\n\
         - You MUST propose at most {max_cmds_per_round} cmd_id in next_cmds.\n\
         - If evidence is sufficient, choose decision=STOP and explain stop_reason.\n\n\
         Context (redacted summaries only):\n\
         state={state}\n\n\
         allowed_cmd_pool={allowed}\n\
         already_executed_cmd_ids={executed}\n\
         budget={budget}\n\n\
         Plan schema:\n{plan_schema}\n"
    )
}
