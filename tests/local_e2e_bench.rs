//! E2E benchmark: load the default model with llama.cpp and stream a reply.
//!
//! Only runs when `--features local-llm` is enabled AND the weights exist.
//! Run with: cargo test --features local-llm --test local_e2e_bench -- --nocapture

#![cfg(feature = "local-llm")]

use local_llm_chat::llm::llama_runtime::LlamaRuntime;
use local_llm_chat::llm::model_manager;
use local_llm_chat::llm::model_registry;
use local_llm_chat::{build_chat, SendOutcome, Settings};
use tokio_util::sync::CancellationToken;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn e2e_load_and_generate() {
    local_llm_chat::init_logging();
    let settings = Settings::from_env().expect("invalid LOCAL_CHAT_* settings");
    let model = model_registry::default_model();
    if !model_manager::is_model_downloaded(&settings.models_dir, model) {
        eprintln!("SKIP: {} not downloaded to {}", model.id, settings.models_dir.display());
        return;
    }

    let runtime = LlamaRuntime::new(settings.models_dir.clone()).expect("backend init failed");
    let mut chat = build_chat(runtime, settings);
    chat.select_model(model.id);

    // Stage 1: load weights
    let load_start = std::time::Instant::now();
    chat.download_selected().await.expect("Model load failed");
    let load_ms = load_start.elapsed().as_millis();
    eprintln!("[BENCH] Model load: {}ms", load_ms);
    assert!(chat.is_model_ready(), "Model should be ready");

    // Stage 2: stream a reply and count partial publishes
    let mut updates = chat.session().subscribe();
    let gen_start = std::time::Instant::now();
    let outcome = chat
        .send_message("What is 2+2? Answer in one sentence.", CancellationToken::new())
        .await;
    let gen_ms = gen_start.elapsed().as_millis();

    let out = match outcome {
        SendOutcome::Generated(Ok(out)) => out,
        other => panic!("generation failed: {:?}", other),
    };
    let mut partials = 0;
    while let Ok(update) = updates.try_recv() {
        if !update.is_final {
            partials += 1;
        }
    }

    eprintln!("[BENCH] Reply ({} chars): {}", out.text.len(), &out.text[..out.text.len().min(300)]);
    assert!(out.token_count > 0, "Model should produce at least one token");
    assert!(out.token_count <= 420);
    assert_eq!(chat.session().output(), out.text);

    eprintln!("\n=== BENCHMARK SUMMARY ===");
    eprintln!("Model:     {} ({})", model.name, model.id);
    eprintln!("Load:      {}ms", load_ms);
    eprintln!("Generate:  {}ms, {} tokens ({:.1} tok/s, {:?})", gen_ms, out.token_count, out.tokens_per_second, out.stop_reason);
    eprintln!("Partials:  {}", partials);
    eprintln!("========================\n");
}
