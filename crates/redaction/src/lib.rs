//! sre_redaction
//!
//! Output redaction boundary. Every command output passes through here
//! before it is persisted to the redacted layer, hashed, or shown to the
//! planner.
//!
//! - Rules run in declared order over the already-partly-redacted text,
//!   so a secret embedded in a path is consumed by the SECRET rule and
//!   never double-counted by PATH.
//! - Redaction MUST be deterministic: same input, same output, same count.

use regex::Regex;
use std::sync::LazyLock;

/// Ordered ruleset. Order is part of the contract.
static RULES: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vec![
        ("IP", Regex::new(r"\b(?:\d{1,3}\.){3}\d{1,3}\b").unwrap()),
        (
            "EMAIL",
            Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
        ),
        (
            "SECRET",
            Regex::new(r"(?i)(AKIA|ASIA|sk-|token=|apikey=)[A-Za-z0-9\-_]+").unwrap(),
        ),
        ("PATH", Regex::new(r"/(?:[\w.-]+/)+[\w.-]+").unwrap()),
        ("USER", Regex::new(r"(?i)\buser(?:name)?=\w+\b").unwrap()),
    ]
});

/// Apply all rules in order. Returns the redacted text, the tags of rules
/// that matched at least once, and the total replacement count.
pub fn redact(text: &str) -> (String, Vec<String>, usize) {
    let mut redacted = text.to_string();
    let mut applied: Vec<String> = Vec::new();
    let mut replaced_count = 0usize;

    for (tag, pattern) in RULES.iter() {
        let hits = pattern.find_iter(&redacted).count();
        if hits > 0 {
            applied.push((*tag).to_string());
            replaced_count += hits;
            redacted = pattern
                .replace_all(&redacted, format!("<{tag}>").as_str())
                .into_owned();
        }
    }

    (redacted, applied, replaced_count)
}

/// SHA-256 hex of the (redacted) text. Recorded as `output_hash` in audit
/// records, and recomputable from the file at `redacted_ref`.
pub fn hash_text(text: &str) -> String {
    sre_common::sha256_hex(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_ip_and_email() {
        let (out, tags, count) = redact("peer 10.0.0.12 notified ops@example.com");
        assert_eq!(out, "peer <IP> notified <EMAIL>");
        assert_eq!(tags, vec!["IP", "EMAIL"]);
        assert_eq!(count, 2);
    }

    #[test]
    fn secret_wins_over_path() {
        // The secret is consumed before PATH runs; the leading directory part
        // still matches PATH on the partly-redacted text.
        let (out, tags, _) = redact("loaded key from /etc/keys/AKIA0123456789ABCDEF");
        assert!(out.contains("<SECRET>"));
        assert!(!out.contains("AKIA"));
        assert!(tags.contains(&"SECRET".to_string()));
    }

    #[test]
    fn redacts_user_assignments_case_insensitive() {
        let (out, _, count) = redact("Username=root user=deploy");
        assert_eq!(out, "<USER> <USER>");
        assert_eq!(count, 2);
    }

    #[test]
    fn redaction_is_idempotent() {
        let input = "host 192.168.1.4 wrote /var/log/app/err.log token=abc123 by admin@corp.io";
        let (once, _, first_count) = redact(input);
        let (twice, _, second_count) = redact(&once);
        assert_eq!(once, twice);
        assert!(first_count > 0);
        assert_eq!(second_count, 0);
    }

    #[test]
    fn clean_text_passes_through() {
        let (out, tags, count) = redact("load average: 0.10, 0.20, 0.30");
        assert_eq!(out, "load average: 0.10, 0.20, 0.30");
        assert!(tags.is_empty());
        assert_eq!(count, 0);
    }

    #[test]
    fn hash_matches_common_digest() {
        let (out, _, _) = redact("plain");
        assert_eq!(hash_text(&out), sre_common::sha256_hex("plain"));
    }
}
