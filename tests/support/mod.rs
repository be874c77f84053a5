//! Scripted inference runtime shared by the integration tests.
//!
//! Tokens are numbered from 0 and decode to `"t0 t1 ..."`, so expected text
//! is easy to write down.

#![allow(dead_code)]

use local_llm_chat::llm::error::RuntimeError;
use local_llm_chat::llm::model_registry::{ModelConfiguration, ModelId};
use local_llm_chat::llm::runtime::{
    ChatMessage, GenerateControl, GenerationResult, InferenceRuntime, ProgressFn, SamplingParams,
    TokenId,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

pub struct ScriptedModel {
    pub id: ModelId,
}

#[derive(Default)]
pub struct ScriptedRuntime {
    progress: Vec<f64>,
    batches: Vec<usize>,
    load_failures: AtomicUsize,
    load_error: Option<RuntimeError>,
    template_error: Option<RuntimeError>,
    stream_error: Option<RuntimeError>,
    load_gate: Option<Arc<Semaphore>>,
    generate_gate: Mutex<Option<mpsc::Receiver<()>>>,

    pub fetch_calls: AtomicUsize,
    pub generate_calls: AtomicUsize,
    pub seeds: Mutex<Vec<u64>>,
    pub cache_limits: Mutex<Vec<u64>>,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    pub stopped_at: Mutex<Option<usize>>,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        local_llm_chat::init_logging();
        Self {
            progress: vec![0.0, 0.3, 1.0],
            batches: vec![4, 4],
            ..Self::default()
        }
    }

    pub fn with_progress(mut self, progress: Vec<f64>) -> Self {
        self.progress = progress;
        self
    }

    /// Sizes of the token batches handed to the generation callback.
    pub fn with_batches(mut self, batches: Vec<usize>) -> Self {
        self.batches = batches;
        self
    }

    /// Fail the next `times` loads with `error`.
    pub fn failing_load(mut self, times: usize, error: RuntimeError) -> Self {
        self.load_failures = AtomicUsize::new(times);
        self.load_error = Some(error);
        self
    }

    pub fn failing_template(mut self, error: RuntimeError) -> Self {
        self.template_error = Some(error);
        self
    }

    pub fn failing_stream(mut self, error: RuntimeError) -> Self {
        self.stream_error = Some(error);
        self
    }

    /// Loads report their progress, then wait for a permit on `gate`.
    pub fn with_load_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.load_gate = Some(gate);
        self
    }

    /// Every generation blocks until `gate` receives a message. Once the
    /// sender is dropped, generations run straight through.
    pub fn with_generate_gate(self, gate: mpsc::Receiver<()>) -> Self {
        *self.generate_gate.lock().unwrap() = Some(gate);
        self
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn generations(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn render(tokens: &[TokenId]) -> String {
        tokens
            .iter()
            .map(|t| format!("t{}", t))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl InferenceRuntime for ScriptedRuntime {
    type Model = ScriptedModel;

    async fn fetch_and_initialize(
        &self,
        config: &'static ModelConfiguration,
        on_progress: ProgressFn,
    ) -> Result<ScriptedModel, RuntimeError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        for &fraction in &self.progress {
            on_progress(fraction);
            tokio::task::yield_now().await;
        }
        if let Some(gate) = &self.load_gate {
            gate.acquire().await.expect("load gate closed").forget();
        }
        let remaining = self.load_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.load_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(self
                .load_error
                .clone()
                .unwrap_or_else(|| RuntimeError::Network("scripted".to_string())));
        }
        Ok(ScriptedModel { id: config.id })
    }

    fn apply_chat_template(
        &self,
        _model: &ScriptedModel,
        messages: &[ChatMessage],
    ) -> Result<Vec<TokenId>, RuntimeError> {
        self.prompts.lock().unwrap().push(messages.to_vec());
        match &self.template_error {
            Some(e) => Err(e.clone()),
            None => Ok(vec![1000, 1001, 1002]),
        }
    }

    fn stream_generate(
        &self,
        _model: &ScriptedModel,
        _prompt_tokens: &[TokenId],
        _params: &SamplingParams,
        _extra_eos_tokens: &[&str],
        on_tokens: &mut dyn FnMut(&[TokenId]) -> GenerateControl,
    ) -> Result<GenerationResult, RuntimeError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = self.generate_gate.lock().unwrap().as_ref() {
            let _ = gate.recv();
        }
        if let Some(e) = &self.stream_error {
            return Err(e.clone());
        }

        let mut tokens: Vec<TokenId> = Vec::new();
        for &size in &self.batches {
            for _ in 0..size {
                tokens.push(tokens.len() as TokenId);
            }
            if on_tokens(&tokens) == GenerateControl::Stop {
                *self.stopped_at.lock().unwrap() = Some(tokens.len());
                break;
            }
        }

        Ok(GenerationResult {
            text: Self::render(&tokens),
            token_count: tokens.len(),
            tokens_per_second: 42.0,
        })
    }

    fn decode(&self, _model: &ScriptedModel, tokens: &[TokenId]) -> Result<String, RuntimeError> {
        Ok(Self::render(tokens))
    }

    fn seed_random(&self, seed: u64) {
        self.seeds.lock().unwrap().push(seed);
    }

    fn set_cache_limit(&self, bytes: u64) {
        self.cache_limits.lock().unwrap().push(bytes);
    }
}

/// Expected decode of the first `n` tokens.
pub fn text_of(n: usize) -> String {
    (0..n).map(|t| format!("t{}", t)).collect::<Vec<_>>().join(" ")
}

/// Poll `cond` until it holds, failing the test after ~2s.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    panic!("condition not reached in time");
}
