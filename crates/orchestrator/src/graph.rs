//! Deterministic orchestrator.
//!
//! Flow: validate -> baseline -> classify -> targeted -> reclassify ->
//! persist. `exec_cmd` is the single mediated execution path; nothing else
//! in the workspace runs a command.

use crate::context::OrchestratorContext;
use crate::pack::{EvidencePack, NextCheck, PackMeta, PackMetrics, Snapshot};
use crate::OrchestratorError;
use serde_json::json;
use sre_audit_log::{AuditLog, AuditRecord};
use sre_config::AgentConfig;
use sre_evidence::EvidenceStore;
use sre_exec::Executor;
use sre_policy::{is_command_allowed, validators};
use sre_registry::{
    extract_signals, get_command_meta, parse_output, render_command, CommandMeta, SignalMap,
};
use sre_rules::RuleEngine;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Why a command was not executed. None of these abort the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    BlockedByPolicy,
    PlatformMismatch { cmd_platform: String },
    InvalidService,
    InvalidPid,
}

impl SkipReason {
    /// The `purpose` string recorded in next_checks.
    pub fn purpose(&self) -> &'static str {
        match self {
            SkipReason::PlatformMismatch { .. } => "platform_mismatch",
            _ => "blocked_or_failed",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::BlockedByPolicy => "blocked_by_policy",
            SkipReason::PlatformMismatch { .. } => "platform_mismatch",
            SkipReason::InvalidService => "invalid_service",
            SkipReason::InvalidPid => "invalid_pid",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecRecord {
    pub redacted: String,
    pub audit_ref: String,
    pub signals: SignalMap,
    pub timed_out: bool,
}

#[derive(Debug, Clone)]
pub enum CmdOutcome {
    Executed(ExecRecord),
    Skipped(SkipReason),
}

pub struct Orchestrator {
    config: AgentConfig,
    executor: Arc<dyn Executor>,
    rule_engine: RuleEngine,
    commands: BTreeMap<String, CommandMeta>,
}

pub(crate) fn first_line_summary(output: &str) -> String {
    output
        .trim()
        .lines()
        .next()
        .unwrap_or("")
        .chars()
        .take(200)
        .collect()
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl Orchestrator {
    pub fn new(config: AgentConfig, executor: Arc<dyn Executor>) -> Self {
        let rule_engine = RuleEngine::new(&config.rules);
        let commands = config.effective_commands();
        Orchestrator {
            config,
            executor,
            rule_engine,
            commands,
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn commands(&self) -> &BTreeMap<String, CommandMeta> {
        &self.commands
    }

    pub fn classify(&self, signals: &SignalMap) -> Vec<sre_rules::Hypothesis> {
        self.rule_engine.classify(signals)
    }

    /// Execute one registered command and persist its evidence.
    ///
    /// Applies, in order: registry lookup, policy guard, platform filter,
    /// input validation, rendering, execution, redaction, hashing, audit
    /// append, and the three-layer evidence write. An unknown cmd_id is a
    /// config error and fails the operation; every other obstacle comes
    /// back as `CmdOutcome::Skipped`.
    pub async fn exec_cmd(
        &self,
        ctx: &OrchestratorContext,
        cmd_id: &str,
        platform: &str,
        store: &EvidenceStore,
        audit: Option<&AuditLog>,
        timeout_sec: u64,
    ) -> Result<CmdOutcome, OrchestratorError> {
        let meta = get_command_meta(&self.commands, cmd_id)?;
        let policy = &self.config.action_policy;

        if !is_command_allowed(meta, &policy.allowed_risks, &policy.deny_keywords) {
            warn!(cmd_id, "blocked by policy");
            return Ok(CmdOutcome::Skipped(SkipReason::BlockedByPolicy));
        }
        if !meta.platform_matches(platform) {
            return Ok(CmdOutcome::Skipped(SkipReason::PlatformMismatch {
                cmd_platform: meta.platform.clone(),
            }));
        }
        if meta.requires_service() && !validators::validate_service(&ctx.service) {
            return Ok(CmdOutcome::Skipped(SkipReason::InvalidService));
        }
        let pid = ctx.pid.as_deref().unwrap_or("");
        if meta.requires_pid() && !validators::validate_pid(pid) {
            return Ok(CmdOutcome::Skipped(SkipReason::InvalidPid));
        }

        let command = render_command(&meta.cmd, Some(ctx.service.as_str()), ctx.pid.as_deref())?;

        let started_at = sre_common::now_iso();
        let start = Instant::now();
        let output = self
            .executor
            .run(&ctx.host, &command, timeout_sec)
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let timed_out = output.starts_with("command timeout after");

        let (redacted, redaction_rules, redacted_count) = sre_redaction::redact(&output);
        let output_hash = sre_redaction::hash_text(&redacted);

        let audit_id = format!("{cmd_id}-{}", epoch_secs());
        if let Some(audit) = audit {
            audit.append(&AuditRecord {
                session_id: ctx.session_id.clone(),
                id: audit_id.clone(),
                cmd_id: cmd_id.to_string(),
                cmd: command.clone(),
                started_at,
                elapsed_ms,
                output_hash: output_hash.clone(),
                redacted_fields: redaction_rules.clone(),
                redacted_count: redacted_count as u64,
            })?;
        }

        let raw_ref = store.put_raw(cmd_id, &output)?;
        let redacted_ref = store.put_redacted(cmd_id, &redacted)?;
        let parsed = parse_output(cmd_id, &redacted);
        let parsed_ref = store.put_parsed(cmd_id, &parsed)?;
        let signals = extract_signals(&parsed);

        store.write_index(
            &format!("event-{cmd_id}-{audit_id}"),
            &json!({
                "cmd_id": cmd_id,
                "raw_ref": raw_ref,
                "redacted_ref": redacted_ref,
                "parsed_ref": parsed_ref,
                "signals": signals,
                "timing": {"elapsed_ms": elapsed_ms, "timeout": timed_out},
                "audit_ref": audit_id,
                "redaction": {"rules": redaction_rules, "replaced_count": redacted_count},
            }),
        )?;

        Ok(CmdOutcome::Executed(ExecRecord {
            redacted,
            audit_ref: audit_id,
            signals,
            timed_out,
        }))
    }

    /// Run the deterministic collection flow and return the evidence pack.
    pub async fn run(&self, ctx: &OrchestratorContext) -> Result<EvidencePack, OrchestratorError> {
        info!(
            session_id = %ctx.session_id,
            host = %ctx.host,
            service = %ctx.service,
            exec_mode = %ctx.exec_mode,
            "orchestrator start"
        );

        if ctx.session_id.is_empty() {
            return Err(OrchestratorError::InvalidInput("session_id is required".into()));
        }
        if !validators::validate_service(&ctx.service) {
            return Err(OrchestratorError::InvalidInput("invalid service".into()));
        }
        if let Some(pid) = ctx.pid.as_deref() {
            if !pid.is_empty() && !validators::validate_pid(pid) {
                return Err(OrchestratorError::InvalidInput("invalid pid".into()));
            }
        }

        let store = EvidenceStore::new(
            &self.config.evidence.base_dir,
            &ctx.session_id,
            self.config.evidence.retain_raw,
        )?;
        let audit = (!self.config.audit_log.is_empty())
            .then(|| AuditLog::new(&self.config.audit_log));

        let platform = ctx.resolve_platform();
        let baseline_cmds = self.config.baseline.for_platform(&platform);

        let mut snapshots: Vec<Snapshot> = Vec::new();
        let mut next_checks: Vec<NextCheck> = Vec::new();
        let mut audit_refs: Vec<String> = Vec::new();
        let mut all_signals = SignalMap::new();
        let mut metrics = PackMetrics::default();

        for cmd_id in &baseline_cmds {
            info!(%cmd_id, "baseline exec");
            match self
                .exec_cmd(ctx, cmd_id, &platform, &store, audit.as_ref(), 30)
                .await?
            {
                CmdOutcome::Executed(rec) => {
                    self.record_snapshot(
                        cmd_id,
                        "collected",
                        &rec,
                        &mut snapshots,
                        &mut audit_refs,
                        &mut all_signals,
                        &mut metrics,
                    );
                }
                CmdOutcome::Skipped(reason) => {
                    warn!(%cmd_id, reason = reason.as_str(), "baseline skipped");
                    metrics.skipped += 1;
                    next_checks.push(NextCheck {
                        cmd_id: cmd_id.clone(),
                        purpose: reason.purpose().to_string(),
                    });
                }
            }
        }

        let primary = self
            .rule_engine
            .classify(&all_signals)
            .first()
            .map(|h| h.category.clone())
            .unwrap_or_else(|| "UNKNOWN".to_string());
        info!(%primary, "classify");

        let targeted_cmds = self
            .config
            .routes
            .routes
            .get(&primary)
            .cloned()
            .unwrap_or_default();

        for cmd_id in &targeted_cmds {
            if baseline_cmds.contains(cmd_id) {
                continue;
            }
            info!(%cmd_id, "targeted exec");
            match self
                .exec_cmd(ctx, cmd_id, &platform, &store, audit.as_ref(), 30)
                .await?
            {
                CmdOutcome::Executed(rec) => {
                    self.record_snapshot(
                        cmd_id,
                        "targeted",
                        &rec,
                        &mut snapshots,
                        &mut audit_refs,
                        &mut all_signals,
                        &mut metrics,
                    );
                }
                CmdOutcome::Skipped(reason) => {
                    warn!(%cmd_id, reason = reason.as_str(), "targeted skipped");
                    metrics.skipped += 1;
                    next_checks.push(NextCheck {
                        cmd_id: cmd_id.clone(),
                        purpose: reason.purpose().to_string(),
                    });
                }
            }
        }

        let mut hypotheses = self.rule_engine.classify(&all_signals);
        for h in &mut hypotheses {
            h.evidence_refs = audit_refs.iter().take(8).cloned().collect();
        }
        info!(primary = %hypotheses.first().map(|h| h.category.as_str()).unwrap_or("UNKNOWN"), "reclassify");

        next_checks.truncate(8);
        let pack = EvidencePack {
            meta: PackMeta {
                host: ctx.host.clone(),
                service: ctx.service.clone(),
                env: ctx.env.clone(),
                session_id: ctx.session_id.clone(),
                platform,
                timestamp: sre_common::now_iso(),
                collection_window_minutes: None,
                agent_version: None,
            },
            snapshots,
            hypothesis: hypotheses,
            next_checks,
            signals: all_signals,
            policy: self.config.action_policy.clone(),
            metrics,
        };

        store.write_index("evidence_pack", &pack)?;

        // Audit summary for offline replay.
        if let Some(audit) = &audit {
            let entries = audit.read_session(&ctx.session_id)?;
            store.write_index(
                "audit_summary",
                &json!({"session_id": ctx.session_id, "commands": entries}),
            )?;
        }

        info!(
            session_id = %ctx.session_id,
            primary = %pack.primary_category(),
            baseline = baseline_cmds.len(),
            targeted = targeted_cmds.len(),
            "orchestrator finished"
        );
        Ok(pack)
    }

    #[allow(clippy::too_many_arguments)]
    fn record_snapshot(
        &self,
        cmd_id: &str,
        summary: &str,
        rec: &ExecRecord,
        snapshots: &mut Vec<Snapshot>,
        audit_refs: &mut Vec<String>,
        all_signals: &mut SignalMap,
        metrics: &mut PackMetrics,
    ) {
        audit_refs.push(rec.audit_ref.clone());
        for (k, v) in &rec.signals {
            if !v.is_null() {
                all_signals.insert(k.clone(), v.clone());
            }
        }
        if rec.redacted.trim().is_empty() {
            metrics.empty_outputs += 1;
        }
        if rec.timed_out {
            metrics.timeouts += 1;
        }
        snapshots.push(Snapshot {
            cmd_id: cmd_id.to_string(),
            signal: first_line_summary(&rec.redacted),
            summary: summary.to_string(),
            audit_ref: rec.audit_ref.clone(),
        });
    }
}
