//! sre_registry
//!
//! The whitelisted command surface:
//! - `commands`: cmd_id -> CommandMeta (template, risk, platform) + rendering
//! - `parsers`: per-command best-effort structured extraction
//! - `signals`: normalized signal map derived from parsed output
//!
//! Everything here is deterministic and side-effect free. Execution and
//! policy decisions live elsewhere.

pub mod commands;
pub mod parsers;
pub mod signals;

pub use commands::{
    default_commands, get_command_meta, render_command, CommandMeta, RegistryError, RiskClass,
};
pub use parsers::parse_output;
pub use signals::{extract_signals, SignalMap};
