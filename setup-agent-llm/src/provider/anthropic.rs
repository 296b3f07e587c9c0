//! Anthropic Messages API provider

use super::*;
use reqwest::Client;
use serde::{Deserialize, Serialize};

const DEFAULT_MAX_TOKENS: usize = 4096;

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = config.http_client()?;
        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config
            .base_url
            .as_deref()
            .unwrap_or("https://api.anthropic.com/v1")
    }

    fn build_request(&self, request: CompletionRequest) -> AnthropicRequest {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model().to_string());
        let (system, messages) = convert_messages(request.messages);

        AnthropicRequest {
            model,
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            temperature: request.temperature,
            tools: request.tools.map(|tools| {
                tools
                    .into_iter()
                    .map(|t| AnthropicTool {
                        name: t.name,
                        description: t.description,
                        input_schema: t.parameters,
                    })
                    .collect()
            }),
            stop_sequences: request.stop,
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "claude-sonnet-4-5".into(),
            "claude-3-opus".into(),
            "claude-3-5-haiku-latest".into(),
        ]
    }

    fn default_model(&self) -> &str {
        self.config
            .default_model
            .as_deref()
            .unwrap_or("claude-sonnet-4-5")
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        let api_request = self.build_request(request);
        tracing::debug!(
            model = %api_request.model,
            messages = api_request.messages.len(),
            "anthropic completion request"
        );

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or(ProviderError::AuthenticationFailed)?;

        let mut req = self
            .client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .json(&api_request);

        if !self.config.headers.contains_key("anthropic-version") {
            req = req.header("anthropic-version", "2023-06-01");
        }
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text));
        }

        let api_response: AnthropicResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(into_completion(api_response))
    }
}

/// Split out the system prompt and reshape the conversation into
/// Anthropic's block format.
///
/// Assistant tool requests become `tool_use` blocks. Consecutive tool
/// results are merged into a single user turn, since the API requires
/// strictly alternating roles.
fn convert_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system: Option<String> = None;
    let mut out: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                let text = msg.content.unwrap_or_default();
                system = Some(match system {
                    Some(prev) => format!("{}\n\n{}", prev, text),
                    None => text,
                });
            }
            Role::User => out.push(AnthropicMessage {
                role: "user".into(),
                content: AnthropicContent::Text(msg.content.unwrap_or_default()),
            }),
            Role::Assistant => match msg.tool_calls {
                Some(calls) if !calls.is_empty() => {
                    let mut blocks = Vec::new();
                    if let Some(text) = msg.content.filter(|t| !t.is_empty()) {
                        blocks.push(AnthropicContentBlock::Text { text });
                    }
                    for call in calls {
                        let input = serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| serde_json::json!({}));
                        blocks.push(AnthropicContentBlock::ToolUse {
                            id: call.id,
                            name: call.name,
                            input,
                        });
                    }
                    out.push(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    });
                }
                _ => out.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Text(msg.content.unwrap_or_default()),
                }),
            },
            Role::Tool => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.unwrap_or_default(),
                    content: msg.content.unwrap_or_default(),
                };
                match out.last_mut() {
                    Some(AnthropicMessage {
                        role,
                        content: AnthropicContent::Blocks(blocks),
                    }) if role.as_str() == "user" => blocks.push(block),
                    _ => out.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![block]),
                    }),
                }
            }
        }
    }

    (system, out)
}

fn into_completion(api_response: AnthropicResponse) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in api_response.content {
        match block {
            ContentBlock::Text { text } => content.push_str(&text),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id,
                name,
                arguments: input.to_string(),
            }),
            ContentBlock::Other => {}
        }
    }

    let finish_reason = match api_response.stop_reason.as_deref() {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Unknown,
    };

    let usage = Usage {
        prompt_tokens: api_response.usage.input_tokens,
        completion_tokens: api_response.usage.output_tokens,
        total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
    };

    CompletionResponse {
        id: api_response.id,
        model: api_response.model,
        content: if content.is_empty() { None } else { Some(content) },
        tool_calls,
        finish_reason,
        usage,
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult { tool_use_id: String, content: String },
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
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    // thinking and other block types carry nothing we use
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(id: &str) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: "run_command_tool".into(),
            arguments: r#"{"command":"ls"}"#.into(),
        }
    }

    #[test]
    fn test_system_is_split_out() {
        let (system, messages) = convert_messages(vec![
            ChatMessage::system("You are an installer"),
            ChatMessage::user("Install deps"),
        ]);
        assert_eq!(system.as_deref(), Some("You are an installer"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn test_tool_results_are_merged() {
        let (_, messages) = convert_messages(vec![
            ChatMessage::user("go"),
            ChatMessage::assistant_tool_calls(Some("Checking".into()), vec![call("a"), call("b")]),
            ChatMessage::tool_result("a", "out a"),
            ChatMessage::tool_result("b", "out b"),
        ]);
        assert_eq!(messages.len(), 3);

        let body = serde_json::to_value(&messages).unwrap();
        assert_eq!(body[1]["role"], "assistant");
        assert_eq!(body[1]["content"][0]["type"], "text");
        assert_eq!(body[1]["content"][1]["type"], "tool_use");
        assert_eq!(body[1]["content"][1]["input"]["command"], "ls");
        assert_eq!(body[2]["role"], "user");
        assert_eq!(body[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(body[2]["content"][1]["tool_use_id"], "b");
    }

    #[test]
    fn test_default_max_tokens() {
        let provider = AnthropicProvider::new(ProviderConfig::anthropic("sk-ant")).unwrap();
        let body = provider.build_request(CompletionRequest::new(vec![ChatMessage::user("hi")]));
        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(body.model, "claude-sonnet-4-5");
    }

    #[test]
    fn test_response_parsing() {
        let raw = serde_json::json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-5",
            "content": [
                {"type": "thinking", "thinking": "..."},
                {"type": "text", "text": "Running it"},
                {"type": "tool_use", "id": "tu_1", "name": "run_command_tool", "input": {"command": "make"}}
            ],
            "stop_reason": "tool_use",
            "usage": {"input_tokens": 12, "output_tokens": 8}
        });
        let api_response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let response = into_completion(api_response);

        assert_eq!(response.content.as_deref(), Some("Running it"));
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.tool_calls[0].arguments, r#"{"command":"make"}"#);
        assert_eq!(response.usage.total_tokens, 20);
    }
}
