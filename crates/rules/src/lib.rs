//! sre_rules
//!
//! Config-driven classifier: `{category, signal, op, threshold}` rules over
//! the normalized signal map, ranked by confidence. Ships a builtin default
//! set so an empty config still classifies the common cases.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sre_registry::SignalMap;

/// Comparison operator of a rule, parsed from its config spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Op {
    Gt,
    Ge,
    Lt,
    Le,
}

impl TryFrom<String> for Op {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim() {
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Ge),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Le),
            other => Err(format!("unknown rule op: {other}")),
        }
    }
}

impl From<Op> for String {
    fn from(op: Op) -> String {
        match op {
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
        }
        .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    pub category: String,
    pub signal: String,
    pub op: Op,
    pub threshold: f64,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default = "default_why")]
    pub why: String,
}

fn default_confidence() -> f64 {
    0.5
}

fn default_why() -> String {
    "rule matched".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RulesConfig {
    #[serde(default)]
    pub rules: Vec<RuleSpec>,
}

/// Ranked classification result. Position 0 of a classify() result is the
/// session's primary hypothesis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hypothesis {
    pub category: String,
    pub confidence: f64,
    pub why: String,
    pub evidence_refs: Vec<String>,
    pub counter_evidence: Vec<String>,
}

fn signal_f64(signals: &SignalMap, name: &str) -> Option<f64> {
    match signals.get(name)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn signal_display(signals: &SignalMap, name: &str) -> String {
    match signals.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
        None => "null".to_string(),
    }
}

pub struct RuleEngine {
    rules: Vec<RuleSpec>,
}

impl RuleEngine {
    pub fn new(config: &RulesConfig) -> Self {
        let rules = if config.rules.is_empty() {
            Self::builtin_rules()
        } else {
            config.rules.clone()
        };
        RuleEngine { rules }
    }

    fn builtin_rules() -> Vec<RuleSpec> {
        vec![
            RuleSpec {
                category: "IO_WAIT".into(),
                signal: "iowait_pct".into(),
                op: Op::Ge,
                threshold: 20.0,
                confidence: 0.8,
                why: "high iowait".into(),
            },
            RuleSpec {
                category: "MEMORY".into(),
                signal: "mem_available_mb".into(),
                op: Op::Le,
                threshold: 200.0,
                confidence: 0.7,
                why: "low available memory".into(),
            },
            RuleSpec {
                category: "CPU".into(),
                signal: "loadavg_1m".into(),
                op: Op::Ge,
                threshold: 5.0,
                confidence: 0.6,
                why: "high load average".into(),
            },
        ]
    }

    fn rule_matches(rule: &RuleSpec, signals: &SignalMap) -> bool {
        let Some(v) = signal_f64(signals, &rule.signal) else {
            return false;
        };
        match rule.op {
            Op::Gt => v > rule.threshold,
            Op::Ge => v >= rule.threshold,
            Op::Lt => v < rule.threshold,
            Op::Le => v <= rule.threshold,
        }
    }

    /// Up to 3 hypotheses ordered by confidence desc; a single UNKNOWN
    /// hypothesis (confidence 0.2) when nothing matched.
    pub fn classify(&self, signals: &SignalMap) -> Vec<Hypothesis> {
        let mut matched: Vec<&RuleSpec> = self
            .rules
            .iter()
            .filter(|r| Self::rule_matches(r, signals))
            .collect();
        matched.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut out: Vec<Hypothesis> = matched
            .iter()
            .take(3)
            .map(|r| Hypothesis {
                category: r.category.clone(),
                confidence: r.confidence,
                why: format!(
                    "{} (signal={} value={})",
                    r.why,
                    r.signal,
                    signal_display(signals, &r.signal)
                ),
                evidence_refs: Vec::new(),
                counter_evidence: self.counter_evidence(&r.category, signals),
            })
            .collect();

        if out.is_empty() {
            out.push(Hypothesis {
                category: "UNKNOWN".into(),
                confidence: 0.2,
                why: "no rules matched".into(),
                evidence_refs: Vec::new(),
                counter_evidence: Vec::new(),
            });
        }
        out
    }

    fn counter_evidence(&self, category: &str, signals: &SignalMap) -> Vec<String> {
        let mut ce: Vec<String> = Vec::new();
        match category.to_ascii_uppercase().as_str() {
            "IO_WAIT" => {
                if let Some(v) = signal_f64(signals, "iowait_pct") {
                    if v < 5.0 {
                        ce.push(format!("iowait_pct low ({v})"));
                    }
                }
            }
            "CPU" => {
                if let Some(v) = signal_f64(signals, "loadavg_1m") {
                    if v < 1.0 {
                        ce.push(format!("loadavg_1m low ({v})"));
                    }
                }
                if let Some(iw) = signal_f64(signals, "iowait_pct") {
                    if iw >= 20.0 {
                        ce.push(format!("iowait_pct high ({iw}) suggests IO_WAIT"));
                    }
                }
            }
            "MEMORY" => {
                if let Some(v) = signal_f64(signals, "mem_available_mb") {
                    if v > 500.0 {
                        ce.push(format!("mem_available_mb high ({v})"));
                    }
                }
            }
            _ => {}
        }
        ce
    }
}
