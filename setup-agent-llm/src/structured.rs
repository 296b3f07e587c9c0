//! Structured inference: ask a model for JSON matching a Rust type.
//!
//! Every agent decision (plans, verdicts, reviews) is a typed struct. The
//! struct's JSON schema is appended to the system prompt, the reply is
//! stripped of markdown fences and deserialized. Transient failures,
//! including replies that do not parse, are retried with exponential
//! backoff.

use crate::model::LlmSettings;
use crate::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, Role, UsageTracker,
};
use schemars::{gen::SchemaSettings, JsonSchema};
use serde::de::DeserializeOwned;
use setup_agent_error::{Error, ErrorKind, Result};
use std::sync::Mutex;
use std::time::Duration;

const JSON_REMINDER: &str = "IMPORTANT: Always return valid JSON that conforms to the schema.";

/// JSON schema for `T`, with subschemas inlined
pub fn schema_for<T: JsonSchema>() -> serde_json::Value {
    let settings = SchemaSettings::draft07().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let generator = schemars::gen::SchemaGenerator::new(settings);
    let schema = generator.into_root_schema_for::<T>();
    serde_json::to_value(schema.schema).unwrap_or_default()
}

/// Append the output schema for `T` to a system prompt
pub fn with_schema<T: JsonSchema>(system: &str) -> String {
    let schema = serde_json::to_string_pretty(&schema_for::<T>()).unwrap_or_default();
    format!(
        "{}\n\nRespond with a JSON object matching this schema:\n{}\n\n{}",
        system, schema, JSON_REMINDER
    )
}

/// Pull the JSON payload out of a reply that may wrap it in markdown fences
pub fn extract_json(content: &str) -> &str {
    let body = if content.contains("```json") {
        content
            .split("```json")
            .nth(1)
            .and_then(|s| s.split("```").next())
            .unwrap_or(content)
    } else if content.contains("```") {
        content.split("```").nth(1).unwrap_or(content)
    } else {
        content
    };
    let body = body.trim();

    // Tolerate chatter around a bare object
    match (body.find('{'), body.rfind('}')) {
        (Some(start), Some(end)) if start > 0 || end + 1 < body.len() => {
            if start < end {
                &body[start..=end]
            } else {
                body
            }
        }
        _ => body,
    }
}

/// Parse a model reply into `T`
pub fn parse_reply<T: DeserializeOwned>(content: &str) -> Result<T> {
    let json = extract_json(content);
    serde_json::from_str(json).map_err(|e| {
        Error::response_invalid(format!("reply does not match the schema: {}", e))
            .with_operation("structured::parse_reply")
            .with_context("reply", truncate(json, 200))
            .temporary()
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// A provider bound to inference settings, with retries and usage tracking
pub struct StructuredLlm<P> {
    provider: P,
    settings: LlmSettings,
    backoff: Duration,
    max_delay: Duration,
    usage: Mutex<UsageTracker>,
}

/// Upper bound for a single retry delay
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Double `current`, clamped to `max_delay`
fn next_retry_delay(current: Duration, max_delay: Duration) -> Duration {
    current.saturating_mul(2).min(max_delay)
}

impl<P: LlmProvider> StructuredLlm<P> {
    pub fn new(provider: P, settings: LlmSettings) -> Self {
        Self {
            provider,
            settings,
            backoff: Duration::from_secs(1),
            max_delay: MAX_RETRY_DELAY,
            usage: Mutex::new(UsageTracker::new()),
        }
    }

    /// Base delay between retries, doubled on every attempt
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn settings(&self) -> &LlmSettings {
        &self.settings
    }

    pub fn usage(&self) -> UsageTracker {
        self.usage
            .lock()
            .map(|u| u.clone())
            .unwrap_or_default()
    }

    /// Run `system` + `input` and parse the reply as `T`
    pub async fn invoke<T>(&self, system: &str, input: &str) -> Result<T>
    where
        T: JsonSchema + DeserializeOwned,
    {
        self.invoke_messages(vec![ChatMessage::system(system), ChatMessage::user(input)])
            .await
    }

    /// Like [`invoke`](Self::invoke) over a full conversation. The schema
    /// is appended to the first system message, or added as one.
    pub async fn invoke_messages<T>(&self, mut messages: Vec<ChatMessage>) -> Result<T>
    where
        T: JsonSchema + DeserializeOwned,
    {
        match messages.iter_mut().find(|m| m.role == Role::System) {
            Some(system) => {
                let prompt = with_schema::<T>(system.text());
                system.content = Some(prompt);
            }
            None => messages.insert(0, ChatMessage::system(with_schema::<T>(""))),
        }

        let request = CompletionRequest::new(messages).with_settings(&self.settings);
        self.with_retries(request, |response| {
            let content = response.content.unwrap_or_default();
            parse_reply::<T>(&content)
        })
        .await
    }

    /// Plain-text completion
    pub async fn complete_text(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let request = CompletionRequest::new(messages).with_settings(&self.settings);
        self.with_retries(request, |response| match response.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => Err(Error::response_invalid("model returned an empty reply")
                .with_operation("structured::complete_text")
                .temporary()),
        })
        .await
    }

    /// Raw completion, used by tool-calling loops
    pub async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        let request = request.with_settings(&self.settings);
        self.with_retries(request, Ok).await
    }

    async fn with_retries<T, F>(&self, request: CompletionRequest, parse: F) -> Result<T>
    where
        F: Fn(CompletionResponse) -> Result<T>,
    {
        let max_attempts = self.settings.max_retries.saturating_add(1);
        let mut attempt = 0u32;
        let mut delay = self.backoff.min(self.max_delay);

        loop {
            attempt += 1;
            let outcome = match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    if let Ok(mut usage) = self.usage.lock() {
                        usage.track(&response.model, &response.usage);
                    }
                    parse(response)
                }
                Err(e) => Err(Error::from(e)),
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        kind = %err.kind(),
                        "inference failed, retrying in {:?}",
                        delay
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    delay = next_retry_delay(delay, self.max_delay);
                }
                Err(err) => {
                    let err = err
                        .with_operation("structured_llm::invoke")
                        .with_context("provider", self.provider.name().to_string())
                        .with_context("attempts", attempt.to_string());
                    return Err(if err.kind() == ErrorKind::ConfigInvalid {
                        err
                    } else {
                        err.persist()
                    });
                }
            }
        }
    }
}
