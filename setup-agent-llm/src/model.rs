//! Model selection and inference settings

use serde::{Deserialize, Serialize};
use setup_agent_error::{Error, Result};
use std::fmt;

/// Model used when nothing else is configured
pub const DEFAULT_MODEL: &str = "anthropic:claude-sonnet-4-5";

/// Backends a model identifier can name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Anthropic,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `provider:model` identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model: String,
}

impl ModelSpec {
    /// Parse `provider:model`. A bare model name is taken as Anthropic.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let (provider, model) = match raw.split_once(':') {
            Some((p, m)) => (p.trim().to_ascii_lowercase(), m.trim()),
            None => ("anthropic".to_string(), raw),
        };

        if model.is_empty() {
            return Err(Error::config_invalid("model name is empty")
                .with_operation("model_spec::parse")
                .with_context("model", raw));
        }

        let provider = match provider.as_str() {
            "openai" => ProviderKind::OpenAI,
            "anthropic" => ProviderKind::Anthropic,
            other => {
                return Err(Error::config_invalid(format!("unknown provider '{}'", other))
                    .with_operation("model_spec::parse")
                    .with_context("model", raw))
            }
        };

        Ok(Self {
            provider,
            model: model.to_string(),
        })
    }
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}

/// An entry in the interactive model picker
#[derive(Debug, Clone, Copy)]
pub struct SuggestedModel {
    pub id: &'static str,
    pub label: &'static str,
}

pub const SUGGESTED_MODELS: &[SuggestedModel] = &[
    SuggestedModel {
        id: "anthropic:claude-sonnet-4-5",
        label: "Claude Sonnet 4.5 (recommended)",
    },
    SuggestedModel {
        id: "anthropic:claude-3-opus",
        label: "Claude 3 Opus",
    },
    SuggestedModel {
        id: "openai:gpt-4o",
        label: "GPT-4o",
    },
];

/// Inference parameters shared by every agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmSettings {
    pub model: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub max_retries: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_output_tokens: None,
            timeout_secs: None,
            max_retries: 2,
        }
    }
}

/// Highest accepted `max_retries`
pub const MAX_RETRIES: u32 = 10;

impl LlmSettings {
    pub fn validate(&self) -> Result<()> {
        ModelSpec::parse(&self.model).map_err(|e| e.with_operation("llm_settings::validate"))?;

        if let Some(t) = self.temperature {
            if !(0.0..=1.0).contains(&t) {
                return Err(
                    Error::config_invalid("temperature must be between 0.0 and 1.0")
                        .with_operation("llm_settings::validate")
                        .with_context("temperature", t.to_string()),
                );
            }
        }
        if self.max_output_tokens == Some(0) {
            return Err(Error::config_invalid("max output tokens must be positive")
                .with_operation("llm_settings::validate"));
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::config_invalid("timeout must be positive")
                .with_operation("llm_settings::validate"));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(Error::config_invalid(format!(
                "max retries must be at most {}",
                MAX_RETRIES
            ))
            .with_operation("llm_settings::validate")
            .with_context("max_retries", self.max_retries.to_string()));
        }
        Ok(())
    }
}
