//! Signal extraction.
//!
//! Turns parsed output into the flat, normalized signal map the rule engine
//! and the planner consume. Unknown fields are dropped silently.

use serde_json::Value;
use std::collections::BTreeMap;

/// Session-wide signal map. Later writes overwrite earlier ones
/// (last-writer-wins within a session).
pub type SignalMap = BTreeMap<String, Value>;

pub fn extract_signals(parsed: &Value) -> SignalMap {
    let mut signals = SignalMap::new();
    let cmd_id = parsed.get("cmd_id").and_then(Value::as_str).unwrap_or("");

    match cmd_id {
        "uptime" | "loadavg" => {
            if let Some(load) = parsed.get("loadavg").and_then(Value::as_array) {
                if load.len() >= 3 {
                    signals.insert("loadavg_1m".to_string(), load[0].clone());
                    signals.insert("loadavg_5m".to_string(), load[1].clone());
                    signals.insert("loadavg_15m".to_string(), load[2].clone());
                }
            }
        }
        "free" => {
            if let Some(mem) = parsed.get("mem_mb") {
                if let Some(v) = mem.get("available").filter(|v| !v.is_null()) {
                    signals.insert("mem_available_mb".to_string(), v.clone());
                }
                if let Some(v) = mem.get("used").filter(|v| !v.is_null()) {
                    signals.insert("mem_used_mb".to_string(), v.clone());
                }
            }
            if let Some(v) = parsed
                .get("swap_mb")
                .and_then(|s| s.get("used"))
                .filter(|v| !v.is_null())
            {
                signals.insert("swap_used_mb".to_string(), v.clone());
            }
        }
        "iostat" => {
            if let Some(cpu) = parsed.get("iostat_avg_cpu") {
                // key varies across iostat versions
                for key in ["%iowait", "iowait"] {
                    if let Some(v) = cpu.get(key).filter(|v| !v.is_null()) {
                        signals.insert("iowait_pct".to_string(), v.clone());
                        break;
                    }
                }
            }
        }
        _ => {}
    }

    signals
}
