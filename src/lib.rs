//! local-llm-chat: on-device chat core.
//!
//! This crate wires together:
//! - Model catalog and per-model download/load lifecycle (llm/)
//! - Single-flight streaming generation with throttled partial output (llm/session.rs)
//! - A headless chat surface for a UI layer to render (chat.rs)
//! - Settings from the environment (config.rs)

pub mod chat;
pub mod config;
pub mod llm;

pub use chat::{ChatSurface, SendOutcome};
pub use config::{ConfigError, Settings};
pub use llm::error::{GenerationError, LoadError, RuntimeError};
pub use llm::lifecycle::{LoadOutcome, ModelLifecycleStore, ModelState, ModelStatus};
pub use llm::model_registry::{ModelConfiguration, ModelId};
pub use llm::runtime::InferenceRuntime;
pub use llm::session::{GenerateParameters, GenerationOutput, GenerationSession, SeedSource};

use std::sync::Arc;

/// Initialise `env_logger` (default level `info`, `RUST_LOG` overrides).
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}

/// Build a chat surface and its collaborators around `runtime`.
pub fn build_chat<R: InferenceRuntime>(runtime: R, settings: Settings) -> ChatSurface<R> {
    let runtime = Arc::new(runtime);
    let store = ModelLifecycleStore::with_cache_limit(Arc::clone(&runtime), settings.cache_limit_bytes);
    let session = GenerationSession::with_seed(runtime, settings.seed);
    log::info!("[CHAT] Ready, default model {}", settings.default_model);
    ChatSurface::new(Arc::new(store), Arc::new(session), settings)
}
