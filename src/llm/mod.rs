//! Local LLM domain: model catalog, lifecycle, and streaming generation.
//!
//! The inference library itself sits behind `runtime::InferenceRuntime`;
//! `llama_runtime` is the llama.cpp implementation (feature `local-llm`).

pub mod error;
pub mod lifecycle;
#[cfg(feature = "local-llm")]
pub mod llama_runtime;
pub mod model_manager;
pub mod model_registry;
pub mod prompts;
pub mod runtime;
pub mod session;
pub mod streaming;
