//! sre_evidence
//!
//! Per-session evidence store with three layers plus an index:
//!
//!   <base_dir>/<session_id>/
//!     raw/<cmd_id>-<hex>.txt        original output (only when retained)
//!     redacted/<cmd_id>-<hex>.txt   post-redaction output (mandatory)
//!     parsed/<cmd_id>-<hex>.json    structured extraction
//!     index/<name>.json             evidence pack, round traces, report, ...
//!
//! Returned refs are base-relative so index files stay portable when the
//! base directory moves. Index JSON is pretty-printed with sorted keys.

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum EvidenceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] sre_common::JsonError),
}

/// The three layers of one command execution.
#[derive(Debug, Clone)]
pub struct EvidenceRefs {
    pub raw_ref: Option<String>,
    pub redacted_ref: String,
    pub parsed_ref: String,
}

pub struct EvidenceStore {
    base_dir: PathBuf,
    session_id: String,
    session_dir: PathBuf,
    retain_raw: bool,
}

impl EvidenceStore {
    pub fn new(
        base_dir: impl Into<PathBuf>,
        session_id: impl Into<String>,
        retain_raw: bool,
    ) -> Result<Self, EvidenceError> {
        let base_dir = base_dir.into();
        let session_id = session_id.into();
        let session_dir = base_dir.join(&session_id);
        let store = EvidenceStore {
            base_dir,
            session_id,
            session_dir,
            retain_raw,
        };
        store.ensure_dirs()?;
        Ok(store)
    }

    fn ensure_dirs(&self) -> Result<(), EvidenceError> {
        for sub in ["raw", "redacted", "parsed", "index"] {
            fs::create_dir_all(self.session_dir.join(sub))?;
        }
        Ok(())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    fn new_artifact_name(cmd_id: &str, ext: &str) -> String {
        format!("{cmd_id}-{}.{ext}", Uuid::new_v4().simple())
    }

    fn rel_ref(&self, sub: &str, filename: &str) -> String {
        format!("{}/{sub}/{filename}", self.session_id)
    }

    /// Store the raw layer. Returns None when raw retention is disabled.
    pub fn put_raw(&self, cmd_id: &str, data: &str) -> Result<Option<String>, EvidenceError> {
        if !self.retain_raw {
            return Ok(None);
        }
        let name = Self::new_artifact_name(cmd_id, "txt");
        fs::write(self.session_dir.join("raw").join(&name), data)?;
        Ok(Some(self.rel_ref("raw", &name)))
    }

    pub fn put_redacted(&self, cmd_id: &str, data: &str) -> Result<String, EvidenceError> {
        let name = Self::new_artifact_name(cmd_id, "txt");
        fs::write(self.session_dir.join("redacted").join(&name), data)?;
        Ok(self.rel_ref("redacted", &name))
    }

    pub fn put_parsed(
        &self,
        cmd_id: &str,
        data: &serde_json::Value,
    ) -> Result<String, EvidenceError> {
        let name = Self::new_artifact_name(cmd_id, "json");
        let bytes = sre_common::sorted_pretty_json_bytes(data)?;
        fs::write(self.session_dir.join("parsed").join(&name), bytes)?;
        Ok(self.rel_ref("parsed", &name))
    }

    /// Write `index/<name>.json` (pretty, sorted keys) and return its ref.
    pub fn write_index<T: Serialize>(
        &self,
        name: &str,
        payload: &T,
    ) -> Result<String, EvidenceError> {
        let filename = format!("{name}.json");
        let bytes = sre_common::sorted_pretty_json_bytes(payload)?;
        fs::write(self.session_dir.join("index").join(&filename), bytes)?;
        Ok(self.rel_ref("index", &filename))
    }

    /// Resolve a base-relative ref back to an absolute path.
    pub fn resolve(&self, reference: &str) -> PathBuf {
        self.base_dir.join(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(retain_raw: bool) -> (TempDir, EvidenceStore) {
        let td = TempDir::new().unwrap();
        let store = EvidenceStore::new(td.path(), "20260801_100000", retain_raw).unwrap();
        (td, store)
    }

    #[test]
    fn creates_session_layout() {
        let (_td, store) = store(true);
        for sub in ["raw", "redacted", "parsed", "index"] {
            assert!(store.session_dir().join(sub).is_dir());
        }
    }

    #[test]
    fn refs_are_base_relative_and_resolve() {
        let (_td, store) = store(true);
        let r = store.put_redacted("uptime", "load average: 1.0").unwrap();
        assert!(r.starts_with("20260801_100000/redacted/uptime-"));
        assert!(r.ends_with(".txt"));
        let content = std::fs::read_to_string(store.resolve(&r)).unwrap();
        assert_eq!(content, "load average: 1.0");
    }

    #[test]
    fn raw_layer_honors_retention_flag() {
        let (_td, with_raw) = store(true);
        assert!(with_raw.put_raw("uptime", "x").unwrap().is_some());

        let (_td2, without_raw) = store(false);
        assert!(without_raw.put_raw("uptime", "x").unwrap().is_none());
    }

    #[test]
    fn redacted_file_hashes_to_recorded_digest() {
        let (_td, store) = store(true);
        let text = "peer <IP> timed out";
        let r = store.put_redacted("ss", text).unwrap();
        let on_disk = std::fs::read_to_string(store.resolve(&r)).unwrap();
        assert_eq!(sre_common::sha256_hex(&on_disk), sre_common::sha256_hex(text));
    }

    #[test]
    fn index_is_pretty_and_key_sorted() {
        let (_td, store) = store(true);
        let r = store
            .write_index("evidence_pack", &json!({"zeta": 1, "alpha": {"b": 2, "a": 1}}))
            .unwrap();
        assert_eq!(r, "20260801_100000/index/evidence_pack.json");
        let s = std::fs::read_to_string(store.resolve(&r)).unwrap();
        assert!(s.find("\"alpha\"").unwrap() < s.find("\"zeta\"").unwrap());
        assert!(s.contains('\n'));
    }

    #[test]
    fn parsed_layer_writes_json() {
        let (_td, store) = store(true);
        let r = store
            .put_parsed("uptime", &json!({"cmd_id": "uptime", "loadavg": [1.0, 2.0, 3.0]}))
            .unwrap();
        let v: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.resolve(&r)).unwrap()).unwrap();
        assert_eq!(v["cmd_id"], json!("uptime"));
    }
}
