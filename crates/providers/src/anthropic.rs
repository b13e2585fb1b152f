//! Anthropic native provider implementation.
//!
//! Uses Anthropic's Messages API directly.
//!
//! Features:
//! - `x-api-key` header authentication (not Bearer)
//! - `anthropic-version` header
//! - Context blocks as top-level `system` text blocks, each cacheable block
//!   carrying an ephemeral `cache_control` breakpoint with its TTL
//! - Native `tool_use` / `tool_result` content blocks
//! - Extended thinking, with signatures passed back verbatim
//! - Prompt-cache usage accounting

use appforge_core::cache::CacheBlock;
use appforge_core::error::ProviderError;
use appforge_core::message::{ContentBlock, Role, Turn};
use appforge_core::provider::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const ONE_HOUR: Duration = Duration::from_secs(3600);

/// Anthropic native Messages API provider.
pub struct AnthropicProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider.
    pub fn new(api_key: impl Into<String>) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(600)) // thinking turns can be slow
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            name: "anthropic".into(),
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        })
    }

    /// Create with a custom base URL (e.g., for testing or proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Build the Messages API request body for one turn.
    fn build_body(request: &TurnRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "max_tokens": request.max_tokens,
            "messages": Self::to_api_messages(&request.history),
        });

        if !request.context.is_empty() {
            body["system"] = serde_json::json!(Self::to_system_blocks(&request.context));
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        if let Some(thinking) = request.thinking {
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": thinking.budget_tokens,
            });
        }

        body
    }

    /// Context blocks become system text blocks, in order. Cacheable blocks
    /// end with a breakpoint so each tier is its own cache prefix.
    fn to_system_blocks(context: &[CacheBlock]) -> Vec<SystemBlock> {
        context
            .iter()
            .map(|block| SystemBlock {
                kind: "text",
                text: block.text.clone(),
                cache_control: block.cache_ttl.map(|ttl| CacheControl {
                    kind: "ephemeral",
                    ttl: if ttl >= ONE_HOUR { "1h" } else { "5m" },
                }),
            })
            .collect()
    }

    /// Convert turns to Anthropic messages, block for block.
    fn to_api_messages(turns: &[Turn]) -> Vec<AnthropicMessage> {
        turns
            .iter()
            .map(|turn| AnthropicMessage {
                role: match turn.role {
                    Role::User => "user".into(),
                    Role::Assistant => "assistant".into(),
                },
                content: turn.blocks.iter().map(ApiBlock::from).collect(),
            })
            .collect()
    }

    /// Convert tool definitions to Anthropic format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<AnthropicTool> {
        tools
            .iter()
            .map(|t| AnthropicTool {
                name: t.name.clone(),
                description: t.description.clone(),
                input_schema: t.parameters.clone(),
            })
            .collect()
    }

    /// Map a non-success HTTP status to a provider error.
    fn status_error(status: u16, retry_after: Option<u64>, body: String) -> ProviderError {
        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after.unwrap_or(5),
            },
            401 | 403 => ProviderError::AuthenticationFailed("Invalid Anthropic API key".into()),
            400 | 404 | 413 | 422 => ProviderError::InvalidRequest(body),
            _ => ProviderError::ApiError {
                status_code: status,
                message: body,
            },
        }
    }

    /// Convert an Anthropic API response to an assistant turn.
    fn to_assistant_turn(resp: AnthropicResponse) -> AssistantTurn {
        let blocks = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                ApiBlock::Text { text } => Some(ContentBlock::Text { text }),
                ApiBlock::Thinking { thinking, signature } => {
                    Some(ContentBlock::Thinking { thinking, signature })
                }
                ApiBlock::ToolUse { id, name, input } => Some(ContentBlock::ToolUse { id, name, input }),
                ApiBlock::ToolResult { .. } | ApiBlock::Unknown => {
                    warn!(id = %resp.id, "Dropping unsupported block in Anthropic response");
                    None
                }
            })
            .collect();

        AssistantTurn {
            blocks,
            stop_reason: StopReason::parse(resp.stop_reason.as_deref().unwrap_or("end_turn")),
            usage: Usage {
                input_tokens: resp.usage.input_tokens,
                output_tokens: resp.usage.output_tokens,
                cache_creation_input_tokens: resp.usage.cache_creation_input_tokens.unwrap_or(0),
                cache_read_input_tokens: resp.usage.cache_read_input_tokens.unwrap_or(0),
            },
            model: resp.model,
        }
    }
}

#[async_trait]
impl appforge_core::Provider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send_turn(&self, request: TurnRequest) -> std::result::Result<AssistantTurn, ProviderError> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = Self::build_body(&request);

        debug!(
            provider = "anthropic",
            model = %request.model,
            context_blocks = request.context.len(),
            turns = request.history.len(),
            "Sending turn"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if status != 200 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Anthropic API error");
            return Err(Self::status_error(status, retry_after, error_body));
        }

        let api_resp: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(format!("Anthropic response: {e}")))?;

        Ok(Self::to_assistant_turn(api_resp))
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        // Try a minimal request to verify the API key
        let url = format!("{}/v1/messages", self.base_url);
        let body = serde_json::json!({
            "model": "claude-3-5-haiku-latest",
            "messages": [{"role": "user", "content": "hi"}],
            "max_tokens": 1,
        });

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        // 200 = works, 401 = bad key, anything else = reachable but error
        Ok(response.status().is_success() || response.status().as_u16() != 401)
    }
}

// --- Anthropic API types ---

#[derive(Debug, Serialize)]
struct SystemBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    cache_control: Option<CacheControl>,
}

#[derive(Debug, Serialize)]
struct CacheControl {
    #[serde(rename = "type")]
    kind: &'static str,
    ttl: &'static str,
}

#[derive(Debug, Serialize, Deserialize)]
struct AnthropicMessage {
    role: String,
    content: Vec<ApiBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
enum ApiBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String, signature: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Unknown,
}

impl From<&ContentBlock> for ApiBlock {
    fn from(block: &ContentBlock) -> Self {
        match block {
            ContentBlock::Text { text } => Self::Text { text: text.clone() },
            ContentBlock::Thinking { thinking, signature } => Self::Thinking {
                thinking: thinking.clone(),
                signature: signature.clone(),
            },
            ContentBlock::ToolUse { id, name, input } => Self::ToolUse {
                id: id.clone(),
                name: name.clone(),
                input: input.clone(),
            },
            ContentBlock::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Self::ToolResult {
                tool_use_id: tool_use_id.clone(),
                content: content.clone(),
                is_error: *is_error,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ApiBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
    #[serde(default)]
    cache_creation_input_tokens: Option<u32>,
    #[serde(default)]
    cache_read_input_tokens: Option<u32>,
}
