//! sre_llm
//!
//! Planner transport + normalization ONLY.
//! No policy. No allowlist filtering. No schema enforcement — callers
//! always validate the returned object against their schema.
//!
//! The planner contract is a single JSON object per call; a best-effort
//! recovery step strips prose/fences when a model ignores that.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("missing API key (set SRE_LLM_API_KEY or llm.api_key)")]
    MissingApiKey,
    #[error("unsupported llm vendor: {0}")]
    UnsupportedVendor(String),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Capabilities {
    pub json_schema: bool,
    pub tool_calling: bool,
    pub streaming: bool,
}

/// JSON-producing planner interface. Implementations return one top-level
/// JSON object; schema conformance is the caller's check.
#[async_trait]
pub trait PlannerClient: Send + Sync + std::fmt::Debug {
    async fn generate_json(
        &self,
        prompt: &str,
        schema: &Value,
        temperature: f64,
    ) -> Result<Value, LlmError>;

    fn capabilities(&self) -> Capabilities;
}

/// Best-effort extraction of a JSON object from model output: direct parse
/// first, then the outermost `{...}` span (covers fenced blocks and prose).
pub fn extract_json_object(text: &str) -> Result<Value, LlmError> {
    let raw = text.trim();
    if raw.is_empty() {
        return Err(LlmError::InvalidResponse("empty model output".into()));
    }

    if let Ok(v) = serde_json::from_str::<Value>(raw) {
        if v.is_object() {
            return Ok(v);
        }
    }

    if let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) {
        if start < end {
            if let Ok(v) = serde_json::from_str::<Value>(&raw[start..=end]) {
                if v.is_object() {
                    return Ok(v);
                }
            }
        }
    }

    Err(LlmError::InvalidResponse(
        "could not parse JSON object from model output".into(),
    ))
}

// ---------------------------------------------------------------------------
// Vendor config + factory
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub vendor: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
}

/// Vendor selection. DashScope exposes an OpenAI-compatible endpoint, so
/// `qwen`/`dashscope` reuse the same client with a different default base.
pub fn create_planner(config: &LlmConfig) -> Result<Box<dyn PlannerClient>, LlmError> {
    let vendor = if config.vendor.trim().is_empty() {
        "qwen".to_string()
    } else {
        config.vendor.trim().to_ascii_lowercase()
    };

    let (default_base, default_model) = match vendor.as_str() {
        "openai" | "gpt" => ("https://api.openai.com", "gpt-4o-mini"),
        "qwen" | "dashscope" => (
            "https://dashscope.aliyuncs.com/compatible-mode/v1",
            "qwen-plus",
        ),
        other => return Err(LlmError::UnsupportedVendor(other.to_string())),
    };

    let base_url = if config.base_url.is_empty() {
        default_base.to_string()
    } else {
        config.base_url.clone()
    };
    let model = if config.model.is_empty() {
        default_model.to_string()
    } else {
        config.model.clone()
    };

    Ok(Box::new(OpenAiCompatClient::new(
        base_url,
        config.api_key.clone(),
        model,
    )))
}

// ---------------------------------------------------------------------------
// OpenAI-compatible chat-completions client
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct OpenAiCompatClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatMsg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMsg<'a>>,
    temperature: f64,
}

const SYSTEM_PROMPT: &str = "You are an SRE diagnosis assistant. \
Return ONLY a single JSON object that conforms to the provided schema. \
No markdown, no explanation, no code fences.";

impl OpenAiCompatClient {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            model,
        }
    }

    /// `/v1` bases (DashScope compatible-mode) get `/chat/completions`
    /// appended directly; plain bases get the full `/v1/...` path.
    fn endpoint_url(base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/chat/completions")
        } else {
            format!("{base}/v1/chat/completions")
        }
    }
}

#[async_trait]
impl PlannerClient for OpenAiCompatClient {
    async fn generate_json(
        &self,
        prompt: &str,
        _schema: &Value,
        temperature: f64,
    ) -> Result<Value, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let url = Self::endpoint_url(&self.base_url);
        debug!(model = %self.model, %url, "planner request");

        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMsg {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMsg {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature,
        };

        let resp = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let raw: Value = resp.json().await?;

        let content = raw
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c0| c0.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                LlmError::InvalidResponse("missing choices[0].message.content".into())
            })?;

        extract_json_object(content)
    }

    fn capabilities(&self) -> Capabilities {
        // JSON output is prompt-enforced; strict server-side json_schema
        // support is endpoint dependent.
        Capabilities {
            json_schema: false,
            tool_calling: false,
            streaming: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_plain_object() {
        let v = extract_json_object(r#"{"decision": "STOP"}"#).unwrap();
        assert_eq!(v["decision"], json!("STOP"));
    }

    #[test]
    fn extracts_from_fenced_block() {
        let text = "```json\n{\"decision\": \"CONTINUE\", \"next_cmds\": []}\n```";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["decision"], json!("CONTINUE"));
    }

    #[test]
    fn extracts_from_surrounding_prose() {
        let text = "Here is my plan: {\"decision\": \"STOP\"} hope that helps";
        let v = extract_json_object(text).unwrap();
        assert_eq!(v["decision"], json!("STOP"));
    }

    #[test]
    fn rejects_non_objects_and_garbage() {
        assert!(extract_json_object("[1, 2, 3]").is_err());
        assert!(extract_json_object("no json here").is_err());
        assert!(extract_json_object("").is_err());
    }

    #[test]
    fn endpoint_url_handles_compatible_mode_bases() {
        assert_eq!(
            OpenAiCompatClient::endpoint_url("https://api.openai.com"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(
            OpenAiCompatClient::endpoint_url(
                "https://dashscope.aliyuncs.com/compatible-mode/v1/"
            ),
            "https://dashscope.aliyuncs.com/compatible-mode/v1/chat/completions"
        );
    }

    #[test]
    fn factory_rejects_unknown_vendor() {
        let err = create_planner(&LlmConfig {
            vendor: "frontier-x".into(),
            ..LlmConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, LlmError::UnsupportedVendor(_)));
    }

    #[test]
    fn factory_defaults_to_qwen() {
        let client = create_planner(&LlmConfig::default()).unwrap();
        assert!(!client.capabilities().json_schema);
    }
}
