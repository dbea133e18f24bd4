//! Input validators for caller-supplied identifiers.
//! These run before anything reaches an executor.

use regex::Regex;
use std::sync::LazyLock;

static SERVICE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.@-]+$").unwrap());

pub fn validate_service(service: &str) -> bool {
    !service.is_empty() && SERVICE_RE.is_match(service)
}

pub fn validate_pid(pid: &str) -> bool {
    !pid.is_empty() && pid.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_accepts_common_unit_names() {
        assert!(validate_service("svc-1"));
        assert!(validate_service("nginx"));
        assert!(validate_service("api.worker@prod"));
    }

    #[test]
    fn service_rejects_shell_metacharacters() {
        assert!(!validate_service("bad name"));
        assert!(!validate_service("svc;rm"));
        assert!(!validate_service(""));
        assert!(!validate_service("svc$(id)"));
    }

    #[test]
    fn pid_must_be_all_digits() {
        assert!(validate_pid("123"));
        assert!(!validate_pid("abc"));
        assert!(!validate_pid("12a"));
        assert!(!validate_pid(""));
    }
}
