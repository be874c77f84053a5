//! The inference runtime seam.
//!
//! Tensor math, tokenization and weight transfer live behind this trait.
//! The lifecycle store and generation session only ever talk to it.

use super::error::RuntimeError;
use super::model_registry::ModelConfiguration;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

pub type TokenId = u32;

/// Progress sink for model fetches; receives a completion fraction in 0.0..=1.0.
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Returned from the per-token callback to steer the streaming loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateControl {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
}

/// Final result of one streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub token_count: usize,
    pub tokens_per_second: f64,
}

/// Capabilities the chat core needs from an on-device ML runtime.
///
/// Everything except `fetch_and_initialize` is blocking and is called from
/// `tokio::task::spawn_blocking`.
pub trait InferenceRuntime: Send + Sync + 'static {
    /// Opaque loaded model (weights plus tokenizer).
    type Model: Send + Sync + 'static;

    /// Download (if needed) and initialize a model, reporting progress.
    fn fetch_and_initialize(
        &self,
        config: &'static ModelConfiguration,
        on_progress: ProgressFn,
    ) -> impl Future<Output = Result<Self::Model, RuntimeError>> + Send;

    fn apply_chat_template(
        &self,
        model: &Self::Model,
        messages: &[ChatMessage],
    ) -> Result<Vec<TokenId>, RuntimeError>;

    /// Run the sampling loop. `on_tokens` receives every generated token so
    /// far, possibly several at a time, and may stop the loop.
    fn stream_generate(
        &self,
        model: &Self::Model,
        prompt_tokens: &[TokenId],
        params: &SamplingParams,
        extra_eos_tokens: &[&str],
        on_tokens: &mut dyn FnMut(&[TokenId]) -> GenerateControl,
    ) -> Result<GenerationResult, RuntimeError>;

    fn decode(&self, model: &Self::Model, tokens: &[TokenId]) -> Result<String, RuntimeError>;

    fn seed_random(&self, seed: u64);

    /// Coarse memory cap hint for the runtime's allocator.
    fn set_cache_limit(&self, bytes: u64);
}
