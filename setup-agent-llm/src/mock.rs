//! Scripted provider for tests.
//!
//! Replies are served in order; every request is recorded so tests can
//! inspect the prompts an agent produced.

use crate::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, ProviderError, ToolCall,
    Usage,
};
use std::collections::VecDeque;
use std::sync::Mutex;

/// One scripted reply
#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    ToolCalls(Vec<ToolCall>),
    NetworkError(String),
}

impl MockReply {
    pub fn text(text: impl Into<String>) -> Self {
        MockReply::Text(text.into())
    }

    /// A JSON value serialized as the reply text
    pub fn json(value: serde_json::Value) -> Self {
        MockReply::Text(value.to_string())
    }

    /// A single tool call with JSON arguments
    pub fn tool_call(name: &str, arguments: serde_json::Value) -> Self {
        MockReply::ToolCalls(vec![ToolCall {
            id: format!("call_{}", name),
            name: name.to_string(),
            arguments: arguments.to_string(),
        }])
    }

    pub fn network_error(message: impl Into<String>) -> Self {
        MockReply::NetworkError(message.into())
    }
}

#[derive(Default)]
pub struct MockProvider {
    replies: Mutex<VecDeque<MockReply>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: MockReply) -> Self {
        self.push(reply);
        self
    }

    pub fn push(&self, reply: MockReply) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.replies.lock().map(|r| r.len()).unwrap_or_default()
    }
}

impl LlmProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn models(&self) -> Vec<String> {
        vec!["mock-model".into()]
    }

    fn default_model(&self) -> &str {
        "mock-model"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let reply = self
            .replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .ok_or_else(|| ProviderError::Other("mock provider has no scripted replies".into()))?;

        let usage = Usage {
            prompt_tokens: 10,
            completion_tokens: 5,
            total_tokens: 15,
        };

        match reply {
            MockReply::Text(text) => Ok(CompletionResponse {
                id: "mock".into(),
                model: "mock-model".into(),
                content: Some(text),
                tool_calls: Vec::new(),
                finish_reason: FinishReason::Stop,
                usage,
            }),
            MockReply::ToolCalls(tool_calls) => Ok(CompletionResponse {
                id: "mock".into(),
                model: "mock-model".into(),
                content: None,
                tool_calls,
                finish_reason: FinishReason::ToolCalls,
                usage,
            }),
            MockReply::NetworkError(message) => Err(ProviderError::Network(message)),
        }
    }
}
