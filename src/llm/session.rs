//! Generation session. Drives one streaming generation at a time against a
//! loaded model handle and publishes partial output as it arrives.
//!
//! The whole pipeline (chat template, seeding, sampling loop, final publish)
//! runs inside `spawn_blocking` because runtimes decode synchronously. The
//! single-flight flag is owned by that blocking task, so it stays set until
//! the runtime has actually let go of the model.

use super::error::GenerationError;
use super::model_registry::ModelConfiguration;
use super::runtime::{ChatMessage, GenerateControl, InferenceRuntime, SamplingParams, TokenId};
use super::streaming::{StopReason, TokenDecision, TokenPolicy};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

const UPDATE_CAPACITY: usize = 256;

pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_MAX_TOKENS: usize = 420;
pub const DEFAULT_PUBLISH_EVERY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateParameters {
    pub temperature: f32,
    pub max_tokens: usize,
    /// Publish partial output every this many generated tokens.
    pub publish_every: usize,
}

impl Default for GenerateParameters {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            publish_every: DEFAULT_PUBLISH_EVERY,
        }
    }
}

/// Where the per-call sampling seed comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeedSource {
    /// Milliseconds since the Unix epoch, read at every call.
    #[default]
    WallClock,
    /// The same seed every call, for reproducible output.
    Fixed(u64),
}

impl SeedSource {
    pub fn next_seed(&self) -> u64 {
        match self {
            SeedSource::Fixed(seed) => *seed,
            SeedSource::WallClock => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0),
        }
    }
}

/// One publish of the session's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputUpdate {
    pub text: String,
    pub token_count: usize,
    pub is_final: bool,
}

/// A completed generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOutput {
    pub text: String,
    pub token_count: usize,
    pub tokens_per_second: f64,
    pub stop_reason: StopReason,
}

pub type GenerationOutcome = Result<GenerationOutput, GenerationError>;

struct Inner<R: InferenceRuntime> {
    runtime: Arc<R>,
    generating: AtomicBool,
    output: watch::Sender<String>,
    updates: broadcast::Sender<OutputUpdate>,
    last_outcome: Mutex<Option<GenerationOutcome>>,
    seed: SeedSource,
}

/// Clears the single-flight flag when dropped, on every exit path.
struct GeneratingFlag<R: InferenceRuntime>(Arc<Inner<R>>);

impl<R: InferenceRuntime> Drop for GeneratingFlag<R> {
    fn drop(&mut self) {
        self.0.generating.store(false, Ordering::Release);
    }
}

/// Streaming text generation for one chat surface.
pub struct GenerationSession<R: InferenceRuntime> {
    inner: Arc<Inner<R>>,
}

impl<R: InferenceRuntime> GenerationSession<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self::with_seed(runtime, SeedSource::default())
    }

    pub fn with_seed(runtime: Arc<R>, seed: SeedSource) -> Self {
        let (output, _) = watch::channel(String::new());
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                runtime,
                generating: AtomicBool::new(false),
                output,
                updates,
                last_outcome: Mutex::new(None),
                seed,
            }),
        }
    }

    pub fn is_generating(&self) -> bool {
        self.inner.generating.load(Ordering::Acquire)
    }

    /// Latest published text.
    pub fn output(&self) -> String {
        self.inner.output.borrow().clone()
    }

    pub fn watch_output(&self) -> watch::Receiver<String> {
        self.inner.output.subscribe()
    }

    /// Every publish, partial and final, in token order.
    pub fn subscribe(&self) -> broadcast::Receiver<OutputUpdate> {
        self.inner.updates.subscribe()
    }

    /// Outcome of the most recent generation that actually ran.
    pub fn last_outcome(&self) -> Option<GenerationOutcome> {
        self.inner
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Generate a reply to `prompt` as a single user turn.
    ///
    /// Returns `GenerationError::Busy` without side effects if another
    /// generation is running on this session.
    pub async fn generate(
        &self,
        prompt: &str,
        model: Arc<R::Model>,
        config: &'static ModelConfiguration,
        params: GenerateParameters,
        cancel: CancellationToken,
    ) -> GenerationOutcome {
        if self
            .inner
            .generating
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("[GENERATE] Ignored: a generation is already running");
            return Err(GenerationError::Busy);
        }
        let flag = GeneratingFlag(Arc::clone(&self.inner));
        self.inner.output.send_replace(String::new());

        log::info!(
            "[GENERATE] {}: prompt {} chars, max_tokens={}, temperature={}",
            config.id,
            prompt.len(),
            params.max_tokens,
            params.temperature
        );

        let prompt = prompt.to_string();
        let task = tokio::task::spawn_blocking(move || {
            let flag = flag;
            let outcome = flag.0.run(&prompt, &model, config, params, &cancel);
            flag.0.store_outcome(outcome.clone());
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("[GENERATE] Generation task failed: {}", e);
                let err = GenerationError::Aborted(e.to_string());
                self.inner.store_outcome(Err(err.clone()));
                Err(err)
            }
        }
    }
}

impl<R: InferenceRuntime> Inner<R> {
    fn run(
        &self,
        prompt: &str,
        model: &R::Model,
        config: &'static ModelConfiguration,
        params: GenerateParameters,
        cancel: &CancellationToken,
    ) -> GenerationOutcome {
        let start = std::time::Instant::now();

        let prompt_tokens = self
            .runtime
            .apply_chat_template(model, &[ChatMessage::user(prompt)])
            .map_err(GenerationError::Template)?;

        let seed = self.seed.next_seed();
        self.runtime.seed_random(seed);
        log::debug!(
            "[GENERATE] Prompt: {} tokens, seed {}",
            prompt_tokens.len(),
            seed
        );

        let sampling = SamplingParams {
            temperature: params.temperature,
        };
        let mut policy = TokenPolicy::new(params.max_tokens, params.publish_every);
        let mut on_tokens = |tokens: &[TokenId]| {
            match policy.observe(tokens.len(), cancel.is_cancelled()) {
                TokenDecision::Continue => GenerateControl::Continue,
                TokenDecision::Publish => {
                    match self.runtime.decode(model, tokens) {
                        Ok(text) => self.publish_partial(text, tokens.len()),
                        Err(e) => log::warn!("[GENERATE] Partial decode failed: {}", e),
                    }
                    GenerateControl::Continue
                }
                TokenDecision::Stop(_) => GenerateControl::Stop,
            }
        };

        let result = self
            .runtime
            .stream_generate(
                model,
                &prompt_tokens,
                &sampling,
                config.extra_eos_tokens,
                &mut on_tokens,
            )
            .map_err(|e| {
                log::error!("[GENERATE] {} failed: {}", config.id, e);
                GenerationError::Runtime(e)
            })?;
        let stop_reason = policy.stop_reason();

        self.publish_final(&result.text, result.token_count);

        log::info!(
            "[GENERATE] {} tokens in {}ms ({:.1} tok/s, {:?})",
            result.token_count,
            start.elapsed().as_millis(),
            result.tokens_per_second,
            stop_reason
        );

        Ok(GenerationOutput {
            text: result.text,
            token_count: result.token_count,
            tokens_per_second: result.tokens_per_second,
            stop_reason,
        })
    }

    fn publish_partial(&self, text: String, token_count: usize) {
        self.output.send_replace(text.clone());
        let _ = self.updates.send(OutputUpdate {
            text,
            token_count,
            is_final: false,
        });
    }

    /// Publish the final text unless the last partial already showed it.
    fn publish_final(&self, text: &str, token_count: usize) {
        let changed = self.output.send_if_modified(|current| {
            if current.as_str() != text {
                *current = text.to_string();
                true
            } else {
                false
            }
        });
        if changed {
            let _ = self.updates.send(OutputUpdate {
                text: text.to_string(),
                token_count,
                is_final: true,
            });
        }
    }

    fn store_outcome(&self, outcome: GenerationOutcome) {
        *self
            .last_outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_seed_is_stable() {
        let seed = SeedSource::Fixed(42);
        assert_eq!(seed.next_seed(), 42);
        assert_eq!(seed.next_seed(), 42);
    }

    #[test]
    fn wall_clock_seed_is_nonzero() {
        assert!(SeedSource::WallClock.next_seed() > 0);
    }

    #[test]
    fn default_parameters() {
        let params = GenerateParameters::default();
        assert_eq!(params.max_tokens, 420);
        assert_eq!(params.publish_every, 4);
        assert!((params.temperature - 0.6).abs() < f32::EPSILON);
    }
}
