//! Alert/ticket adapters.
//!
//! Normalizes webhook-style alert payloads into run arguments and converts
//! a diagnosis report into a generic ticket payload.

use serde_json::{json, Value};

fn first_string(payload: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|k| payload.get(*k))
        .filter_map(Value::as_str)
        .map(str::to_string)
        .find(|s| !s.is_empty())
        .unwrap_or_default()
}

/// Map common alert payload keys onto the agent's run context fields.
pub fn normalize_alert(payload: &Value) -> Value {
    let host = first_string(payload, &["host", "hostname", "instance"]);
    let service = first_string(payload, &["service", "app", "job"]);
    let env = first_string(payload, &["env", "environment"]);
    let window = ["window_minutes", "window"]
        .iter()
        .filter_map(|k| payload.get(*k))
        .find_map(|v| {
            v.as_u64()
                .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
        })
        .unwrap_or(30);

    json!({
        "host": host,
        "service": service,
        "env": env,
        "window_minutes": window,
    })
}

/// Convert report JSON into a generic ticket payload.
pub fn build_ticket_payload(report: &Value) -> Value {
    let meta = report.get("meta").cloned().unwrap_or_else(|| json!({}));
    let root_cause = report.get("root_cause").cloned().unwrap_or_else(|| json!({}));
    let service = meta.get("service").and_then(Value::as_str).unwrap_or("");
    let host = meta.get("host").and_then(Value::as_str).unwrap_or("");
    let category = root_cause
        .get("category")
        .and_then(Value::as_str)
        .unwrap_or("UNKNOWN");

    json!({
        "title": format!("SRE diagnosis: {service} on {host}"),
        "severity": "info",
        "labels": ["sre-agent", category.to_ascii_lowercase()],
        "summary": root_cause.get("summary").and_then(Value::as_str).unwrap_or(""),
        "details": report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_aliased_keys() {
        let payload = json!({"hostname": "web1", "app": "nginx", "environment": "prod", "window": "15"});
        let norm = normalize_alert(&payload);
        assert_eq!(norm["host"], json!("web1"));
        assert_eq!(norm["service"], json!("nginx"));
        assert_eq!(norm["env"], json!("prod"));
        assert_eq!(norm["window_minutes"], json!(15));
    }

    #[test]
    fn bad_window_falls_back_to_default() {
        let norm = normalize_alert(&json!({"host": "h", "service": "s", "window": "soon"}));
        assert_eq!(norm["window_minutes"], json!(30));
    }

    #[test]
    fn ticket_payload_carries_category_label() {
        let report = json!({
            "meta": {"host": "web1", "service": "nginx"},
            "root_cause": {"category": "IO_WAIT", "summary": "disk saturated"}
        });
        let ticket = build_ticket_payload(&report);
        assert_eq!(ticket["title"], json!("SRE diagnosis: nginx on web1"));
        assert_eq!(ticket["labels"][1], json!("io_wait"));
        assert_eq!(ticket["summary"], json!("disk saturated"));
    }
}
