//! sre_orchestrator
//!
//! The only component that mutates an EvidencePack. Deterministic-first:
//! baseline -> classify -> targeted -> reclassify, then an optional
//! multi-round planning loop in which an LLM picks follow-up commands from
//! a routing-derived allowlist under hard budgets.
//!
//! All command execution goes through `Orchestrator::exec_cmd`, the single
//! mediated path that applies policy, platform filtering, redaction,
//! hashing, audit, and evidence persistence.

pub mod context;
pub mod graph;
pub mod multi_stage;
pub mod pack;
pub mod planner_prompt;

pub use context::{ExecMode, OrchestratorContext};
pub use graph::{CmdOutcome, ExecRecord, Orchestrator, SkipReason};
pub use multi_stage::{multi_round_diagnose, DiagnoseBudget, DiagnoseOutcome};
pub use pack::{EvidencePack, NextCheck, PackMeta, PackMetrics, Snapshot};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Registry(#[from] sre_registry::RegistryError),
    #[error(transparent)]
    Evidence(#[from] sre_evidence::EvidenceError),
    #[error(transparent)]
    Audit(#[from] sre_audit_log::AuditLogError),
    #[error(transparent)]
    Report(#[from] sre_report::ReportError),
    #[error("llm error: {0}")]
    Llm(#[from] sre_llm::LlmError),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
