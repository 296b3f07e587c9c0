//! # setup-agent LLM layer
//!
//! Chat-completion providers and typed inference on top of them.
//!
//! ## Core Concepts
//! - **Provider**: Trait-based LLM communication (OpenAI, Anthropic)
//! - **ModelSpec**: `provider:model` identifiers and inference settings
//! - **StructuredLlm**: JSON replies deserialized into schema-described types

pub mod model;
pub mod provider;
pub mod structured;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use model::{
    LlmSettings, ModelSpec, ProviderKind, SuggestedModel, DEFAULT_MODEL, MAX_RETRIES,
    SUGGESTED_MODELS,
};
pub use provider::{
    AnthropicProvider, AnyProvider, ChatMessage, CompletionRequest, CompletionResponse,
    FinishReason, LlmProvider, OpenAIProvider, ProviderConfig, ProviderError, Role, ToolCall,
    ToolDefinition, Usage, UsageTracker,
};
pub use setup_agent_error::{Error, ErrorKind, ErrorStatus, Result};
pub use structured::{extract_json, parse_reply, schema_for, with_schema, StructuredLlm};

// Re-exported so callers deriving schemas need no direct dependency
pub use schemars::JsonSchema;
