//! Integration tests for the model catalog and prompt formatting.

use local_llm_chat::llm::error::RuntimeError;
use local_llm_chat::llm::model_manager;
use local_llm_chat::llm::model_registry::{self, ChatTemplate, ModelId, Quantization, WeightsSource};
use local_llm_chat::llm::prompts;
use local_llm_chat::llm::runtime::ChatMessage;
use std::path::Path;

// ── Model Registry ──────────────────────────────────────────────────

#[test]
fn registry_lists_every_model_in_picker_order() {
    let ids: Vec<ModelId> = model_registry::available_models().iter().map(|m| m.id).collect();
    assert_eq!(ids, ModelId::ALL.to_vec());
}

#[test]
fn default_model_is_the_small_quantized_one() {
    let m = model_registry::default_model();
    assert_eq!(m.id, ModelId::SmolLm135M4Bit);
    assert_eq!(m.quantization, Some(Quantization::Q4KM));
    assert_eq!(m.chat_template, ChatTemplate::ChatMl);
    assert!(m.size_bytes < 200_000_000, "4-bit 135M model should be small");
}

#[test]
fn find_model_returns_correct_info() {
    let m = model_registry::find_model("mobilellm-600m").expect("600M model should exist");
    assert_eq!(m.id, ModelId::MobileLlm600M);
    assert_eq!(m.repo_id, "facebook/MobileLLM-600M");
    assert_eq!(m.chat_template, ChatTemplate::Plain);
}

#[test]
fn find_model_returns_none_for_unknown() {
    assert!(model_registry::find_model("nonexistent").is_none());
    assert!("nonexistent".parse::<ModelId>().is_err());
}

#[test]
fn ids_parse_back_from_their_names() {
    for id in ModelId::ALL {
        assert_eq!(id.to_string().parse::<ModelId>(), Ok(id));
        assert_eq!(id.configuration().id, id);
    }
}

#[test]
fn published_urls_are_huggingface_gguf() {
    let mut published = 0;
    for m in model_registry::available_models() {
        match (m.weights_source, m.download_url()) {
            (WeightsSource::Published, Some(url)) => {
                published += 1;
                assert!(url.starts_with("https://huggingface.co/"), "URL should be HuggingFace: {}", url);
                assert!(url.contains(m.repo_id), "URL should name the repo: {}", url);
                assert!(url.ends_with(".gguf"), "URL should end with .gguf: {}", url);
            }
            (WeightsSource::LocalConversion, None) => {}
            (source, url) => panic!("{}: {:?} with url {:?}", m.id, source, url),
        }
    }
    assert_eq!(published, 1);
}

#[test]
fn checkpoint_only_models_fail_as_format_errors() {
    let dir = std::env::temp_dir().join(format!("local-llm-chat-convert-{}", std::process::id()));
    let m = ModelId::MobileLlm1B.configuration();
    let err: RuntimeError = model_manager::resolve_weights(&dir, m).unwrap_err().into();
    match err {
        RuntimeError::Format(msg) => assert!(msg.contains(m.weights_file), "{}", msg),
        other => panic!("expected a format error, got {:?}", other),
    }
}

#[test]
fn every_model_declares_a_stop_marker() {
    for m in model_registry::available_models() {
        assert!(!m.extra_eos_tokens.is_empty(), "{} has no stop marker", m.id);
        assert!(m.context_length > 0);
    }
}

// ── Model Files ─────────────────────────────────────────────────────

#[test]
fn weights_paths_are_distinct_per_model() {
    let dir = Path::new("/models");
    let mut paths: Vec<_> = model_registry::available_models()
        .iter()
        .map(|m| model_manager::model_path(dir, m))
        .collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), ModelId::ALL.len());
}

#[test]
fn nothing_is_downloaded_in_an_empty_dir() {
    let dir = std::env::temp_dir().join(format!("local-llm-chat-none-{}", std::process::id()));
    assert!(model_manager::downloaded_model_ids(&dir).is_empty());
}

// ── Prompt Formatting ───────────────────────────────────────────────

#[test]
fn instruct_prompt_uses_chatml_format() {
    let m = model_registry::default_model();
    let prompt = prompts::render(m.chat_template, &[ChatMessage::user("What is Rust?")]);
    assert!(prompt.starts_with("<|im_start|>user\n"));
    assert!(prompt.contains("What is Rust?<|im_end|>"));
    assert!(prompt.ends_with("<|im_start|>assistant\n"));
    assert!(m.extra_eos_tokens.contains(&"<|im_end|>"));
}

#[test]
fn base_model_prompt_is_bare_text() {
    let m = ModelId::MobileLlm125M.configuration();
    let prompt = prompts::render(m.chat_template, &[ChatMessage::user("Once upon a time")]);
    assert_eq!(prompt, "Once upon a time");
}
