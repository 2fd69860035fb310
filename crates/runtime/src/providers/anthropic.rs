//! Anthropic Messages API backend.

use crate::model::{
    Backend, ContentBlock, Message, ModelError, ModelRequest, ModelResponse, ResponseBlock, Role,
    ToolSpec, ToolUse, Usage,
};
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_MAX_TOKENS: u32 = 2024;

// Claude Code OAuth constants
const CLAUDE_CODE_VERSION: &str = "2.1.2";
const OAUTH_BETA_HEADER: &str = "claude-code-20250219,oauth-2025-04-20,fine-grained-tool-streaming-2025-05-14,interleaved-thinking-2025-05-14";
const OAUTH_SYSTEM_PREFIX: &str = "You are Claude Code, Anthropic's official CLI for Claude.";

/// Authentication mode for Anthropic API.
#[derive(Debug, Clone)]
pub enum AnthropicAuth {
    /// Standard API key authentication.
    ApiKey(String),
    /// Claude Code OAuth token authentication.
    ClaudeCodeOauth(String),
}

impl std::fmt::Display for AnthropicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => write!(f, "api_key"),
            Self::ClaudeCodeOauth(_) => write!(f, "claude_code_oauth"),
        }
    }
}

impl AnthropicAuth {
    fn apply_headers(&self, req: RequestBuilder) -> RequestBuilder {
        match self {
            Self::ApiKey(key) => req.header("x-api-key", key),
            Self::ClaudeCodeOauth(token) => req
                .header("anthropic-dangerous-direct-browser-access", "true")
                .header("Authorization", format!("Bearer {token}"))
                .header("anthropic-beta", OAUTH_BETA_HEADER)
                .header(
                    "user-agent",
                    format!("claude-cli/{CLAUDE_CODE_VERSION} (external, cli)"),
                )
                .header("x-app", "cli"),
        }
    }

    fn build_system(&self, system: Option<&str>) -> Option<ApiSystemPrompt> {
        match self {
            Self::ApiKey(_) => system.map(|s| ApiSystemPrompt::Simple(s.to_string())),
            Self::ClaudeCodeOauth(_) => {
                let mut blocks = vec![ApiSystemBlock::ephemeral(OAUTH_SYSTEM_PREFIX)];
                if let Some(s) = system {
                    blocks.push(ApiSystemBlock::ephemeral(s));
                }
                Some(ApiSystemPrompt::Blocks(blocks))
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<ApiSystemPrompt>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiSystemPrompt {
    Simple(String),
    Blocks(Vec<ApiSystemBlock>),
}

#[derive(Debug, Serialize)]
struct ApiSystemBlock {
    #[serde(rename = "type")]
    block_type: &'static str,
    text: String,
    cache_control: ApiCacheControl,
}

impl ApiSystemBlock {
    fn ephemeral(text: &str) -> Self {
        Self {
            block_type: "text",
            text: text.to_string(),
            cache_control: ApiCacheControl {
                control_type: "ephemeral",
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiCacheControl {
    #[serde(rename = "type")]
    control_type: &'static str,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: &'static str,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Blocks(Vec<ApiContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiResponseBlock>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    input_tokens: u32,
    output_tokens: u32,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an Anthropic backend.
#[derive(Debug, Clone)]
pub struct AnthropicBackendBuilder {
    auth: AnthropicAuth,
    model: String,
    max_tokens: u32,
    system: Option<String>,
    base_url: String,
}

impl AnthropicBackendBuilder {
    pub fn new(auth: AnthropicAuth, model: impl Into<String>) -> Self {
        Self {
            auth,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system: None,
            base_url: ANTHROPIC_API_URL.to_string(),
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Override the messages endpoint (proxies, gateways).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn build(self) -> AnthropicBackend {
        AnthropicBackend {
            client: reqwest::Client::new(),
            auth: self.auth,
            model: self.model,
            max_tokens: self.max_tokens,
            system: self.system,
            base_url: self.base_url,
        }
    }
}

/// Anthropic API backend.
pub struct AnthropicBackend {
    client: reqwest::Client,
    auth: AnthropicAuth,
    model: String,
    max_tokens: u32,
    system: Option<String>,
    base_url: String,
}

impl AnthropicBackend {
    pub fn builder(auth: AnthropicAuth, model: impl Into<String>) -> AnthropicBackendBuilder {
        AnthropicBackendBuilder::new(auth, model)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn role_to_api(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn message_to_api(msg: &Message) -> ApiMessage {
        let role = Self::role_to_api(msg.role);

        // Simple case: single text block
        if let [ContentBlock::Text { text }] = msg.content.as_slice() {
            return ApiMessage {
                role,
                content: ApiContent::Text(text.clone()),
            };
        }

        let blocks = msg
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => ApiContentBlock::Text { text: text.clone() },
                ContentBlock::ToolUse(call) => ApiContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: Value::Object(call.arguments.clone()),
                },
                ContentBlock::ToolResult(result) => ApiContentBlock::ToolResult {
                    tool_use_id: result.tool_use_id.clone(),
                    content: result.content.clone(),
                    is_error: result.is_error,
                },
            })
            .collect();

        ApiMessage {
            role,
            content: ApiContent::Blocks(blocks),
        }
    }

    fn tool_to_api(spec: &ToolSpec) -> ApiTool<'_> {
        ApiTool {
            name: &spec.name,
            description: &spec.description,
            input_schema: &spec.input_schema,
        }
    }

    fn response_to_blocks(
        blocks: Vec<ApiResponseBlock>,
    ) -> Result<Vec<ResponseBlock>, ModelError> {
        let mut out = Vec::with_capacity(blocks.len());
        for block in blocks {
            match block {
                ApiResponseBlock::Text { text } => out.push(ResponseBlock::Text(text)),
                ApiResponseBlock::ToolUse { id, name, input } => {
                    let arguments = match input {
                        Value::Object(map) => map,
                        Value::Null => serde_json::Map::new(),
                        other => {
                            return Err(ModelError::InvalidResponse(format!(
                                "tool_use {id} input is not an object: {other}"
                            )));
                        }
                    };
                    out.push(ResponseBlock::ToolUse(ToolUse {
                        id,
                        name,
                        arguments,
                    }));
                }
                ApiResponseBlock::Unknown => {}
            }
        }
        Ok(out)
    }
}

impl std::fmt::Display for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "anthropic({}, auth={})", self.model, self.auth)
    }
}

impl Backend for AnthropicBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let api_request = ApiRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: request.messages.iter().map(Self::message_to_api).collect(),
            system: self.auth.build_system(self.system.as_deref()),
            tools: request.tools.iter().map(Self::tool_to_api).collect(),
        };

        let req = self
            .client
            .post(self.base_url.as_str())
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .header("accept", "application/json");

        let req = self.auth.apply_headers(req);

        let response = req
            .json(&api_request)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let blocks = Self::response_to_blocks(api_response.content)?;
        let usage = api_response
            .usage
            .map(|u| Usage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            })
            .unwrap_or_default();

        tracing::debug!(
            model = %self.model,
            blocks = blocks.len(),
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "model response"
        );

        Ok(ModelResponse { blocks, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ToolResult;
    use serde_json::json;

    #[test]
    fn auth_display() {
        let api = AnthropicAuth::ApiKey("test".into());
        let oauth = AnthropicAuth::ClaudeCodeOauth("test".into());
        assert_eq!(api.to_string(), "api_key");
        assert_eq!(oauth.to_string(), "claude_code_oauth");
    }

    #[test]
    fn plain_text_message_uses_string_content() {
        let api = AnthropicBackend::message_to_api(&Message::user("what is 2+2"));
        assert_eq!(
            serde_json::to_value(api).unwrap(),
            json!({"role": "user", "content": "what is 2+2"})
        );
    }

    #[test]
    fn tool_messages_use_blocks() {
        let mut arguments = serde_json::Map::new();
        arguments.insert("topic".into(), "llm".into());
        let assistant = Message::assistant(vec![
            ContentBlock::text("Searching."),
            ContentBlock::ToolUse(ToolUse {
                id: "t1".into(),
                name: "search_papers".into(),
                arguments,
            }),
        ]);
        assert_eq!(
            serde_json::to_value(AnthropicBackend::message_to_api(&assistant)).unwrap(),
            json!({"role": "assistant", "content": [
                {"type": "text", "text": "Searching."},
                {"type": "tool_use", "id": "t1", "name": "search_papers", "input": {"topic": "llm"}}
            ]})
        );

        let ok = Message::tool_result(ToolResult::success("t1", "2401.00001"));
        assert_eq!(
            serde_json::to_value(AnthropicBackend::message_to_api(&ok)).unwrap(),
            json!({"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "t1", "content": "2401.00001"}
            ]})
        );

        let failed = Message::tool_result(ToolResult::error("t2", "tool not found: nope"));
        let value = serde_json::to_value(AnthropicBackend::message_to_api(&failed)).unwrap();
        assert_eq!(value["content"][0]["is_error"], json!(true));
    }

    #[test]
    fn request_includes_catalog() {
        let specs = vec![ToolSpec {
            name: "search_papers".into(),
            description: "Search arXiv".into(),
            input_schema: json!({"type": "object"}),
        }];
        let request = ApiRequest {
            model: "m",
            max_tokens: 10,
            messages: vec![],
            system: None,
            tools: specs.iter().map(AnthropicBackend::tool_to_api).collect(),
        };
        let value = serde_json::to_value(request).unwrap();
        assert_eq!(value["tools"][0]["name"], "search_papers");
        assert_eq!(value["tools"][0]["input_schema"], json!({"type": "object"}));
        assert!(value.get("system").is_none());
    }

    #[test]
    fn oauth_system_prompt_is_prefixed() {
        let auth = AnthropicAuth::ClaudeCodeOauth("t".into());
        let value = serde_json::to_value(auth.build_system(Some("be brief"))).unwrap();
        assert_eq!(value[0]["text"], OAUTH_SYSTEM_PREFIX);
        assert_eq!(value[1]["text"], "be brief");
    }

    #[test]
    fn response_blocks_are_parsed_in_order() {
        let response: ApiResponse = serde_json::from_value(json!({
            "content": [
                {"type": "thinking", "thinking": "hmm", "signature": "x"},
                {"type": "text", "text": "Let me look."},
                {"type": "tool_use", "id": "t1", "name": "search_papers", "input": {"topic": "llm"}}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }))
        .unwrap();
        let blocks = AnthropicBackend::response_to_blocks(response.content).unwrap();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0], ResponseBlock::Text("Let me look.".into()));
        match &blocks[1] {
            ResponseBlock::ToolUse(call) => {
                assert_eq!(call.id, "t1");
                assert_eq!(call.arguments["topic"], "llm");
            }
            other => panic!("expected tool use, got {other:?}"),
        }
    }

    #[test]
    fn non_object_tool_input_is_rejected() {
        let blocks = vec![ApiResponseBlock::ToolUse {
            id: "t1".into(),
            name: "x".into(),
            input: json!([1, 2]),
        }];
        let err = AnthropicBackend::response_to_blocks(blocks).unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }
}
