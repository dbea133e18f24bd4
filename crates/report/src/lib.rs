//! sre_report
//!
//! Final-stage reporting:
//! - `schema`: JSON Schema validation with dotted failure paths
//! - `schemas`: builtin plan / report / evidence pack schemas
//! - `builder`: planner-driven report generation with action-risk filtering

pub mod builder;
pub mod prompt;
pub mod schema;
pub mod schemas;

pub use builder::{build_report, ReportError};
pub use schema::{validate_schema, SchemaError};
