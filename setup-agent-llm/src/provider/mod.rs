//! # LLM Provider Interface
//!
//! A trait-based abstraction over the chat-completion backends the agent
//! talks to. Providers speak plain HTTP through `reqwest`; tool calling is
//! supported because the step-executing agents drive a shell through tools.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicProvider;
pub use openai::OpenAIProvider;

use crate::model::{LlmSettings, ModelSpec, ProviderKind};
use serde::{Deserialize, Serialize};
use setup_agent_error::{Error, ErrorKind, Result};
use std::collections::HashMap;

// ============================================================================
// Core Types
// ============================================================================

/// A chat message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn with_role(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, content)
    }

    /// Assistant turn that requested tool calls (content may be empty)
    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool/function that the model can call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": []
            }),
        }
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCall {
    pub fn parse_arguments<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let raw = if self.arguments.trim().is_empty() {
            "{}"
        } else {
            self.arguments.as_str()
        };
        serde_json::from_str(raw).map_err(|e| {
            Error::new(ErrorKind::ResponseInvalid, "tool arguments are not valid JSON")
                .with_operation("tool_call::parse_arguments")
                .with_context("tool", self.name.clone())
                .set_source(e)
        })
    }
}

/// Request parameters for a completion
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<usize>,
    pub tools: Option<Vec<ToolDefinition>>,
    pub stop: Option<Vec<String>>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = Some(temp);
        self
    }

    pub fn with_max_tokens(mut self, max: usize) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        if !tools.is_empty() {
            self.tools = Some(tools);
        }
        self
    }

    /// Apply model and sampling settings, leaving unset values untouched
    pub fn with_settings(mut self, settings: &LlmSettings) -> Self {
        if let Ok(spec) = ModelSpec::parse(&settings.model) {
            self.model = Some(spec.model);
        }
        if let Some(t) = settings.temperature {
            self.temperature = Some(t);
        }
        if let Some(max) = settings.max_output_tokens {
            self.max_tokens = Some(max);
        }
        self
    }
}

/// Response from a completion request
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub id: String,
    pub model: String,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Unknown,
}

/// Token usage information
#[derive(Debug, Clone, Default)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

// ============================================================================
// Provider errors
// ============================================================================

/// Transport-level failure reported by a provider
#[derive(Debug)]
pub enum ProviderError {
    /// Network/connection error
    Network(String),
    /// API returned an error
    Api { status: u16, message: String },
    /// Failed to parse response
    Parse(String),
    RateLimited { retry_after: Option<u64> },
    InvalidRequest(String),
    ModelNotFound(String),
    AuthenticationFailed,
    Other(String),
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Api { status, message } => write!(f, "API error ({}): {}", status, message),
            Self::Parse(e) => write!(f, "Parse error: {}", e),
            Self::RateLimited { retry_after } => {
                write!(f, "Rate limited")?;
                if let Some(secs) = retry_after {
                    write!(f, " (retry after {}s)", secs)?;
                }
                Ok(())
            }
            Self::InvalidRequest(e) => write!(f, "Invalid request: {}", e),
            Self::ModelNotFound(m) => write!(f, "Model not found: {}", m),
            Self::AuthenticationFailed => write!(f, "Authentication failed"),
            Self::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for Error {
    fn from(err: ProviderError) -> Self {
        let message = err.to_string();
        let base = match &err {
            ProviderError::Network(_) => Error::new(ErrorKind::NetworkFailed, message),
            ProviderError::RateLimited { retry_after } => {
                let e = Error::new(ErrorKind::RateLimited, message);
                match retry_after {
                    Some(secs) => e.with_context("retry_after", secs.to_string()),
                    None => e,
                }
            }
            ProviderError::Api { status, .. } if *status >= 500 => {
                Error::new(ErrorKind::ProviderUnavailable, message)
                    .with_context("status", status.to_string())
            }
            ProviderError::Api { status, .. } => Error::new(ErrorKind::InferenceFailed, message)
                .with_context("status", status.to_string())
                .permanent(),
            ProviderError::Parse(_) => Error::new(ErrorKind::ResponseInvalid, message).temporary(),
            ProviderError::ModelNotFound(_) | ProviderError::AuthenticationFailed => {
                Error::new(ErrorKind::ConfigInvalid, message)
            }
            ProviderError::InvalidRequest(_) | ProviderError::Other(_) => {
                Error::new(ErrorKind::InferenceFailed, message).permanent()
            }
        };
        base.with_operation("provider::complete")
    }
}

/// Map a non-success HTTP status to a provider error
pub(crate) fn status_error(status: u16, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::AuthenticationFailed,
        404 => ProviderError::ModelNotFound(body),
        429 => ProviderError::RateLimited { retry_after: None },
        _ => ProviderError::Api {
            status,
            message: body,
        },
    }
}

// ============================================================================
// Provider Trait
// ============================================================================

/// The main LLM provider trait
#[allow(async_fn_in_trait)]
pub trait LlmProvider: Send + Sync {
    /// Provider name (e.g. "openai", "anthropic")
    fn name(&self) -> &str;

    fn models(&self) -> Vec<String>;

    fn default_model(&self) -> &str;

    /// Send a completion request and get a full response
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError>;

    /// Simple prompt -> response helper
    async fn prompt(&self, prompt: &str) -> std::result::Result<String, ProviderError> {
        let request = CompletionRequest::new(vec![ChatMessage::user(prompt)]);
        let response = self.complete(request).await?;
        response
            .content
            .ok_or_else(|| ProviderError::Other("No content in response".into()))
    }
}

/// Runtime choice between the supported backends
pub enum AnyProvider {
    OpenAI(OpenAIProvider),
    Anthropic(AnthropicProvider),
}

impl AnyProvider {
    /// Build the provider named by `settings.model`, reading its API key
    /// from the environment.
    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        let spec = ModelSpec::parse(&settings.model)?;
        let key_var = spec.provider.api_key_var();
        let api_key = std::env::var(key_var).map_err(|_| {
            Error::config_invalid(format!("environment variable {} is not set", key_var))
                .with_operation("provider::from_settings")
                .with_context("model", settings.model.clone())
        })?;

        let mut config = match spec.provider {
            ProviderKind::OpenAI => ProviderConfig::openai(api_key),
            ProviderKind::Anthropic => ProviderConfig::anthropic(api_key),
        }
        .with_model(spec.model);
        if let Some(secs) = settings.timeout_secs {
            config = config.with_timeout(secs);
        }

        Ok(match spec.provider {
            ProviderKind::OpenAI => AnyProvider::OpenAI(OpenAIProvider::new(config)?),
            ProviderKind::Anthropic => AnyProvider::Anthropic(AnthropicProvider::new(config)?),
        })
    }
}

impl LlmProvider for AnyProvider {
    fn name(&self) -> &str {
        match self {
            AnyProvider::OpenAI(p) => p.name(),
            AnyProvider::Anthropic(p) => p.name(),
        }
    }

    fn models(&self) -> Vec<String> {
        match self {
            AnyProvider::OpenAI(p) => p.models(),
            AnyProvider::Anthropic(p) => p.models(),
        }
    }

    fn default_model(&self) -> &str {
        match self {
            AnyProvider::OpenAI(p) => p.default_model(),
            AnyProvider::Anthropic(p) => p.default_model(),
        }
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> std::result::Result<CompletionResponse, ProviderError> {
        match self {
            AnyProvider::OpenAI(p) => p.complete(request).await,
            AnyProvider::Anthropic(p) => p.complete(request).await,
        }
    }
}

// ============================================================================
// Provider Configuration
// ============================================================================

/// Configuration for creating providers
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub headers: HashMap<String, String>,
    pub timeout_secs: Option<u64>,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            base_url: Some("https://api.openai.com/v1".into()),
            default_model: Some("gpt-4o".into()),
            headers: HashMap::new(),
            timeout_secs: Some(120),
        }
    }

    pub fn anthropic(api_key: impl Into<String>) -> Self {
        let mut headers = HashMap::new();
        headers.insert("anthropic-version".into(), "2023-06-01".into());

        Self {
            api_key: Some(api_key.into()),
            base_url: Some("https://api.anthropic.com/v1".into()),
            default_model: Some("claude-sonnet-4-5".into()),
            headers,
            timeout_secs: Some(120),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub(crate) fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(self.timeout_secs.unwrap_or(120)))
            .build()
            .map_err(|e| {
                Error::new(ErrorKind::ProviderUnavailable, "failed to create HTTP client")
                    .with_operation("provider::http_client")
                    .set_source(e)
                    .permanent()
            })
    }
}

// ============================================================================
// Usage Tracking
// ============================================================================

/// Tracks token usage across multiple calls
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    pub total_calls: usize,
    pub total_prompt_tokens: usize,
    pub total_completion_tokens: usize,
    pub by_model: HashMap<String, Usage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, model: &str, usage: &Usage) {
        self.total_calls += 1;
        self.total_prompt_tokens += usage.prompt_tokens;
        self.total_completion_tokens += usage.completion_tokens;

        let entry = self.by_model.entry(model.to_string()).or_default();
        entry.prompt_tokens += usage.prompt_tokens;
        entry.completion_tokens += usage.completion_tokens;
        entry.total_tokens += usage.total_tokens;
    }

    pub fn total_tokens(&self) -> usize {
        self.total_prompt_tokens + self.total_completion_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_message_constructors() {
        let sys = ChatMessage::system("You are a planner");
        assert_eq!(sys.role, Role::System);
        assert_eq!(sys.text(), "You are a planner");

        let call = ToolCall {
            id: "call_1".into(),
            name: "run_command_tool".into(),
            arguments: r#"{"command":"ls"}"#.into(),
        };
        let asst = ChatMessage::assistant_tool_calls(None, vec![call]);
        assert_eq!(asst.role, Role::Assistant);
        assert_eq!(asst.text(), "");
        assert_eq!(asst.tool_calls.as_ref().map(|c| c.len()), Some(1));

        let tool = ChatMessage::tool_result("call_1", "file.txt");
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_tool_call_arguments() {
        #[derive(Deserialize)]
        struct Args {
            command: String,
        }

        let call = ToolCall {
            id: "1".into(),
            name: "run_command_tool".into(),
            arguments: r#"{"command":"brew --version"}"#.into(),
        };
        let args: Args = call.parse_arguments().unwrap();
        assert_eq!(args.command, "brew --version");

        let empty = ToolCall {
            id: "2".into(),
            name: "authenticate_tool".into(),
            arguments: String::new(),
        };
        let value: serde_json::Value = empty.parse_arguments().unwrap();
        assert!(value.as_object().unwrap().is_empty());

        let broken = ToolCall {
            id: "3".into(),
            name: "run_command_tool".into(),
            arguments: "{not json".into(),
        };
        let err = broken.parse_arguments::<Args>().err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ResponseInvalid);
    }

    #[test]
    fn test_completion_request_settings() {
        let settings = LlmSettings {
            model: "openai:gpt-4o".into(),
            temperature: Some(0.2),
            max_output_tokens: Some(2048),
            timeout_secs: None,
            max_retries: 2,
        };
        let request =
            CompletionRequest::new(vec![ChatMessage::user("Hello")]).with_settings(&settings);

        assert_eq!(request.model.as_deref(), Some("gpt-4o"));
        assert_eq!(request.temperature, Some(0.2));
        assert_eq!(request.max_tokens, Some(2048));
        assert!(request.tools.is_none());
    }

    #[test]
    fn test_empty_tool_list_is_omitted() {
        let request = CompletionRequest::new(vec![]).with_tools(vec![]);
        assert!(request.tools.is_none());
    }

    #[test]
    fn test_provider_error_mapping() {
        let err: Error = ProviderError::Network("reset".into()).into();
        assert_eq!(err.kind(), ErrorKind::NetworkFailed);
        assert!(err.is_retryable());

        let err: Error = status_error(503, "overloaded".into()).into();
        assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
        assert!(err.is_retryable());

        let err: Error = status_error(400, "bad".into()).into();
        assert_eq!(err.kind(), ErrorKind::InferenceFailed);
        assert!(!err.is_retryable());

        let err: Error = status_error(401, String::new()).into();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }

    #[test]
    fn test_provider_config() {
        let config = ProviderConfig::openai("sk-test");
        assert_eq!(config.default_model, Some("gpt-4o".into()));

        let config = ProviderConfig::anthropic("sk-ant-test").with_timeout(30);
        assert!(config.headers.contains_key("anthropic-version"));
        assert_eq!(config.timeout_secs, Some(30));
    }

    #[test]
    fn test_usage_tracker() {
        let mut tracker = UsageTracker::new();
        let usage = Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        };
        tracker.track("gpt-4o", &usage);
        tracker.track("gpt-4o", &usage);

        assert_eq!(tracker.total_calls, 2);
        assert_eq!(tracker.total_tokens(), 300);
        assert_eq!(tracker.by_model["gpt-4o"].total_tokens, 300);
    }
}
