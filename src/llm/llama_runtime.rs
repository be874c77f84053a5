//! llama.cpp runtime backed by llama-cpp-2.
//!
//! Published weights are downloaded once into the models directory; models
//! without a published GGUF load only from a local conversion. Weights that
//! fail verification are deleted. Loaded weights become an `LlamaModel`.
//! Each generation creates a fresh context; `LlamaContext` is !Send, so it
//! lives entirely inside the blocking call that owns it.

use super::error::RuntimeError;
use super::model_manager::{self, WeightsLocation};
use super::model_registry::ModelConfiguration;
use super::prompts;
use super::runtime::{
    ChatMessage, GenerateControl, GenerationResult, InferenceRuntime, ProgressFn, SamplingParams,
    TokenId,
};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaModel};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::token::LlamaToken;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const BATCH_SIZE: usize = 512;

/// A loaded GGUF model plus the catalog entry it came from.
pub struct LlamaHandle {
    model: LlamaModel,
    config: &'static ModelConfiguration,
}

/// `InferenceRuntime` backed by llama.cpp.
pub struct LlamaRuntime {
    backend: Arc<LlamaBackend>,
    models_dir: PathBuf,
    seed: AtomicU64,
    cache_limit_bytes: AtomicU64,
}

impl LlamaRuntime {
    pub fn new(models_dir: PathBuf) -> Result<Self, RuntimeError> {
        let backend = LlamaBackend::init()
            .map_err(|e| RuntimeError::Inference(format!("llama.cpp backend init failed: {:?}", e)))?;
        Ok(Self {
            backend: Arc::new(backend),
            models_dir,
            seed: AtomicU64::new(0),
            cache_limit_bytes: AtomicU64::new(0),
        })
    }
}

impl InferenceRuntime for LlamaRuntime {
    type Model = LlamaHandle;

    async fn fetch_and_initialize(
        &self,
        config: &'static ModelConfiguration,
        on_progress: ProgressFn,
    ) -> Result<LlamaHandle, RuntimeError> {
        match model_manager::resolve_weights(&self.models_dir, config)? {
            WeightsLocation::OnDisk(_) => on_progress(1.0),
            WeightsLocation::Download(_) => {
                model_manager::download_model(&self.models_dir, config, &on_progress).await?;
            }
        }

        let backend = Arc::clone(&self.backend);
        let models_dir = self.models_dir.clone();
        let model = tokio::task::spawn_blocking(move || {
            let path = model_manager::verify_or_discard(&models_dir, config)?;
            let params = LlamaModelParams::default();
            LlamaModel::load_from_file(&backend, &path, &params)
                .map_err(|e| RuntimeError::Format(format!("Failed to load model: {:?}", e)))
        })
        .await
        .map_err(|e| RuntimeError::Inference(format!("Task join error: {}", e)))??;

        log::info!("[LOCAL_LLM] Model loaded: {}", config.id);
        Ok(LlamaHandle { model, config })
    }

    fn apply_chat_template(
        &self,
        handle: &LlamaHandle,
        messages: &[ChatMessage],
    ) -> Result<Vec<TokenId>, RuntimeError> {
        let prompt = prompts::render(handle.config.chat_template, messages);
        let tokens = handle
            .model
            .str_to_token(&prompt, AddBos::Always)
            .map_err(|e| RuntimeError::Tokenizer(format!("Tokenization failed: {:?}", e)))?;
        Ok(tokens.into_iter().map(|t| t.0 as TokenId).collect())
    }

    fn stream_generate(
        &self,
        handle: &LlamaHandle,
        prompt_tokens: &[TokenId],
        params: &SamplingParams,
        extra_eos_tokens: &[&str],
        on_tokens: &mut dyn FnMut(&[TokenId]) -> GenerateControl,
    ) -> Result<GenerationResult, RuntimeError> {
        let model = &handle.model;
        let start = std::time::Instant::now();
        let n_ctx = handle.config.context_length;

        if prompt_tokens.is_empty() {
            return Err(RuntimeError::Tokenizer("empty prompt".to_string()));
        }
        if prompt_tokens.len() >= n_ctx as usize {
            return Err(RuntimeError::Inference(format!(
                "prompt of {} tokens does not fit a {} token context",
                prompt_tokens.len(),
                n_ctx
            )));
        }

        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(n_ctx))
            .with_n_batch(BATCH_SIZE as u32);
        let mut ctx = model
            .new_context(&self.backend, ctx_params)
            .map_err(|e| RuntimeError::Inference(format!("Context creation failed: {:?}", e)))?;

        // Prefill in BATCH_SIZE chunks; logits only for the final prompt token.
        let mut batch = LlamaBatch::new(BATCH_SIZE, 1);
        for (chunk_index, chunk) in prompt_tokens.chunks(BATCH_SIZE).enumerate() {
            batch.clear();
            for (i, &token) in chunk.iter().enumerate() {
                let pos = chunk_index * BATCH_SIZE + i;
                let is_last = pos == prompt_tokens.len() - 1;
                batch
                    .add(LlamaToken::new(token as i32), pos as i32, &[0], is_last)
                    .map_err(|e| RuntimeError::Inference(format!("Batch add failed: {:?}", e)))?;
            }
            ctx.decode(&mut batch)
                .map_err(|e| RuntimeError::Inference(format!("Prompt decode failed: {:?}", e)))?;
        }

        let prefill_ms = start.elapsed().as_millis();
        log::info!(
            "[LOCAL_LLM] Prefill: {} tokens in {}ms",
            prompt_tokens.len(),
            prefill_ms
        );

        let stop_tokens = resolve_stop_tokens(model, extra_eos_tokens);
        let seed = self.seed.load(Ordering::Relaxed) as u32;
        let mut sampler = LlamaSampler::chain_simple([
            LlamaSampler::temp(params.temperature),
            LlamaSampler::dist(seed),
        ]);

        let eos = model.token_eos();
        let mut generated: Vec<TokenId> = Vec::new();
        let mut pos = prompt_tokens.len();

        while pos < n_ctx as usize {
            let token = sampler.sample(&ctx, -1);
            sampler.accept(token);

            if token == eos || stop_tokens.contains(&token) {
                break;
            }

            generated.push(token.0 as TokenId);
            if on_tokens(&generated) == GenerateControl::Stop {
                break;
            }

            batch.clear();
            batch
                .add(token, pos as i32, &[0], true)
                .map_err(|e| RuntimeError::Inference(format!("Batch add failed: {:?}", e)))?;
            ctx.decode(&mut batch)
                .map_err(|e| RuntimeError::Inference(format!("Decode failed: {:?}", e)))?;
            pos += 1;
        }

        let text = self.decode(handle, &generated)?;
        let total_ms = start.elapsed().as_millis();
        let gen_ms = total_ms.saturating_sub(prefill_ms);
        let tokens_per_second = if gen_ms > 0 {
            (generated.len() as f64 / gen_ms as f64) * 1000.0
        } else {
            0.0
        };

        log::info!(
            "[LOCAL_LLM] Generated {} tokens in {}ms ({:.1} tok/s, prefill={}ms)",
            generated.len(),
            total_ms,
            tokens_per_second,
            prefill_ms
        );

        Ok(GenerationResult {
            text,
            token_count: generated.len(),
            tokens_per_second,
        })
    }

    fn decode(&self, handle: &LlamaHandle, tokens: &[TokenId]) -> Result<String, RuntimeError> {
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut text = String::new();
        for &token in tokens {
            let piece = handle
                .model
                .token_to_piece(LlamaToken::new(token as i32), &mut decoder, false, None)
                .map_err(|e| RuntimeError::Tokenizer(format!("Detokenize failed: {:?}", e)))?;
            text.push_str(&piece);
        }
        Ok(text)
    }

    fn seed_random(&self, seed: u64) {
        self.seed.store(seed, Ordering::Relaxed);
    }

    fn set_cache_limit(&self, bytes: u64) {
        // llama.cpp has no allocator cap; keep the hint for diagnostics.
        self.cache_limit_bytes.store(bytes, Ordering::Relaxed);
        log::debug!("[LOCAL_LLM] Cache limit hint: {} bytes", bytes);
    }
}

/// Map extra end-of-sequence markers to single tokens where the vocabulary
/// has one. Markers that split into several tokens are skipped.
fn resolve_stop_tokens(model: &LlamaModel, markers: &[&str]) -> Vec<LlamaToken> {
    markers
        .iter()
        .filter_map(|marker| match model.str_to_token(marker, AddBos::Never) {
            Ok(tokens) if tokens.len() == 1 => Some(tokens[0]),
            Ok(_) => {
                log::debug!("[LOCAL_LLM] Stop marker {:?} is not a single token", marker);
                None
            }
            Err(e) => {
                log::warn!("[LOCAL_LLM] Could not tokenize stop marker {:?}: {:?}", marker, e);
                None
            }
        })
        .collect()
}

