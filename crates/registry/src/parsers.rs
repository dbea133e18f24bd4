//! Per-command parsers.
//!
//! Parsers are intentionally lightweight and deterministic. They never fail
//! hard; whatever could not be understood is simply absent from the result.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::LazyLock;

static LOADAVG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"load averages?:\s*([0-9.]+)[, ]+([0-9.]+)[, ]+([0-9.]+)").unwrap()
});

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or("")
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn to_f64(v: &str) -> Option<f64> {
    v.parse::<f64>().ok()
}

fn to_mb(v: &str) -> Option<i64> {
    v.parse::<f64>().ok().map(|f| f as i64)
}

/// Best-effort structured extraction for one command output.
/// The returned object always carries `cmd_id`; commands without a dedicated
/// parser get a `first_line` summary field.
pub fn parse_output(cmd_id: &str, output: &str) -> Value {
    let mut parsed = Map::new();
    parsed.insert("cmd_id".to_string(), Value::String(cmd_id.to_string()));

    match cmd_id {
        "uptime" => {
            let line = first_line(output);
            parsed.insert("uptime_line".to_string(), Value::String(line.to_string()));
            if let Some(caps) = LOADAVG_RE.captures(line) {
                if let (Some(a), Some(b), Some(c)) =
                    (to_f64(&caps[1]), to_f64(&caps[2]), to_f64(&caps[3]))
                {
                    parsed.insert("loadavg".to_string(), json!([a, b, c]));
                }
            }
        }
        "loadavg" => {
            let parts: Vec<&str> = first_line(output).split_whitespace().collect();
            if parts.len() >= 3 {
                if let (Some(a), Some(b), Some(c)) =
                    (to_f64(parts[0]), to_f64(parts[1]), to_f64(parts[2]))
                {
                    parsed.insert("loadavg".to_string(), json!([a, b, c]));
                }
            }
        }
        "free" => {
            // free -m: "Mem: total used free shared buff/cache available"
            for line in output.lines() {
                let lower = line.to_ascii_lowercase();
                let cols: Vec<&str> = line.split_whitespace().collect();
                if lower.starts_with("mem:") && cols.len() >= 7 {
                    parsed.insert(
                        "mem_mb".to_string(),
                        json!({
                            "total": to_mb(cols[1]),
                            "used": to_mb(cols[2]),
                            "free": to_mb(cols[3]),
                            "available": to_mb(cols[6]),
                        }),
                    );
                }
                if lower.starts_with("swap:") && cols.len() >= 4 {
                    parsed.insert(
                        "swap_mb".to_string(),
                        json!({
                            "total": to_mb(cols[1]),
                            "used": to_mb(cols[2]),
                            "free": to_mb(cols[3]),
                        }),
                    );
                }
            }
        }
        "iostat" => {
            // Version-tolerant: find the header line carrying %iowait and
            // align the numeric row beneath it.
            let lines: Vec<&str> = output
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .collect();
            for (i, line) in lines.iter().enumerate() {
                if line.contains("%iowait") && i + 1 < lines.len() {
                    // drop the "avg-cpu:" label so columns line up with the
                    // numeric row
                    let header: Vec<&str> = line
                        .split_whitespace()
                        .filter(|t| t.starts_with('%'))
                        .collect();
                    let vals: Vec<&str> = lines[i + 1].split_whitespace().collect();
                    if !header.is_empty() && header.len() == vals.len() {
                        let mut cpu = Map::new();
                        for (h, v) in header.iter().zip(vals.iter()) {
                            cpu.insert(
                                (*h).to_string(),
                                to_f64(v).map(Value::from).unwrap_or(Value::Null),
                            );
                        }
                        parsed.insert("iostat_avg_cpu".to_string(), Value::Object(cpu));
                    }
                    break;
                }
            }
        }
        _ => {
            parsed.insert(
                "first_line".to_string(),
                Value::String(truncate_chars(first_line(output), 500)),
            );
        }
    }

    Value::Object(parsed)
}
