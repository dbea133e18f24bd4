//! Schema-aligned report prompt.

use serde_json::Value;

pub fn build_report_prompt(evidence: &Value, schema: &Value) -> String {
    format!(
        "You are an SRE assistant. Generate a diagnosis report strictly following the provided \
         JSON schema. Use the evidence pack and do not add extra keys.\n\n\
         Evidence pack:\n{evidence}\n\n\
         Schema:\n{schema}\n"
    )
}
