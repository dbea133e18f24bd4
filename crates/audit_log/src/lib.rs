//! sre_audit_log
//!
//! Append-only JSONL audit trail of every command execution.
//! - One record per line, written with a single append so concurrent
//!   sessions interleave at line granularity.
//! - Readers are tolerant: malformed lines are skipped, not fatal.

use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One executed command. `output_hash` is the SHA-256 of the redacted
/// output; the file behind the matching `redacted_ref` hashes to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub session_id: String,
    pub id: String,
    pub cmd_id: String,
    pub cmd: String,
    pub started_at: String,
    pub elapsed_ms: u64,
    pub output_hash: String,
    pub redacted_fields: Vec<String>,
    pub redacted_count: u64,
}

pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record as a single JSON line.
    pub fn append(&self, record: &AuditRecord) -> Result<(), AuditLogError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }

    /// Read every parseable record. Missing file reads as empty.
    pub fn read_all(&self) -> Result<Vec<AuditRecord>, AuditLogError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut records = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(&line) {
                Ok(rec) => records.push(rec),
                Err(_) => continue,
            }
        }
        Ok(records)
    }

    /// Linear scan filtered by session. Fine at audit-log sizes.
    pub fn read_session(&self, session_id: &str) -> Result<Vec<AuditRecord>, AuditLogError> {
        Ok(self
            .read_all()?
            .into_iter()
            .filter(|r| r.session_id == session_id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(session: &str, id: &str) -> AuditRecord {
        AuditRecord {
            session_id: session.into(),
            id: id.into(),
            cmd_id: "uptime".into(),
            cmd: "uptime".into(),
            started_at: "2026-08-01T10:00:00Z".into(),
            elapsed_ms: 12,
            output_hash: "deadbeef".into(),
            redacted_fields: vec!["IP".into()],
            redacted_count: 1,
        }
    }

    #[test]
    fn append_creates_parent_and_roundtrips() {
        let td = TempDir::new().unwrap();
        let log = AuditLog::new(td.path().join("nested/dir/audit.jsonl"));
        log.append(&record("s1", "uptime-1")).unwrap();
        log.append(&record("s2", "uptime-2")).unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "uptime-1");
    }

    #[test]
    fn read_session_filters() {
        let td = TempDir::new().unwrap();
        let log = AuditLog::new(td.path().join("audit.jsonl"));
        log.append(&record("s1", "a")).unwrap();
        log.append(&record("s2", "b")).unwrap();
        log.append(&record("s1", "c")).unwrap();

        let s1 = log.read_session("s1").unwrap();
        assert_eq!(s1.len(), 2);
        assert!(s1.iter().all(|r| r.session_id == "s1"));
    }

    #[test]
    fn reader_skips_malformed_lines() {
        let td = TempDir::new().unwrap();
        let path = td.path().join("audit.jsonl");
        let log = AuditLog::new(&path);
        log.append(&record("s1", "a")).unwrap();
        std::fs::write(
            &path,
            format!(
                "{}not json at all\n\n{}",
                std::fs::read_to_string(&path).unwrap(),
                serde_json::to_string(&record("s1", "b")).unwrap() + "\n"
            ),
        )
        .unwrap();

        let all = log.read_all().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].id, "b");
    }

    #[test]
    fn missing_file_reads_empty() {
        let td = TempDir::new().unwrap();
        let log = AuditLog::new(td.path().join("absent.jsonl"));
        assert!(log.read_all().unwrap().is_empty());
    }

    #[test]
    fn records_serialize_on_one_line() {
        let line = serde_json::to_string(&record("s1", "a")).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains("\"output_hash\""));
    }
}
