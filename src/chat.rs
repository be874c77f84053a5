//! Headless chat surface: the state behind a chat screen, minus rendering.
//!
//! Holds the model picker selection, the message history and the live reply
//! bubble, and forwards downloads and prompts to the lifecycle store and the
//! generation session.

use crate::config::Settings;
use crate::llm::error::{GenerationError, LoadError};
use crate::llm::lifecycle::{LoadOutcome, ModelLifecycleStore, ModelStatus};
use crate::llm::model_manager;
use crate::llm::model_registry::{available_models, ModelId, WeightsSource};
use crate::llm::runtime::InferenceRuntime;
use crate::llm::session::{GenerationOutput, GenerationSession};
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Catalog entry as shown in the model picker.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalModelInfo {
    pub id: ModelId,
    pub name: String,
    pub repo_id: String,
    pub size_bytes: u64,
    pub weights_source: WeightsSource,
    pub description: String,
    pub downloaded: bool,
    pub status: ModelStatus,
}

/// What happened to a `send_message` call.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Empty input; nothing changed.
    Ignored,
    /// The selected model is not ready; a notice was appended.
    ModelNotReady,
    Generated(Result<GenerationOutput, GenerationError>),
}

pub struct ChatSurface<R: InferenceRuntime> {
    store: Arc<ModelLifecycleStore<R>>,
    session: Arc<GenerationSession<R>>,
    settings: Settings,
    selected: ModelId,
    messages: Vec<String>,
    draft: String,
    /// The live bubble was moved into `messages` and is hidden until the
    /// next generation starts.
    live_archived: bool,
}

impl<R: InferenceRuntime> ChatSurface<R> {
    pub fn new(
        store: Arc<ModelLifecycleStore<R>>,
        session: Arc<GenerationSession<R>>,
        settings: Settings,
    ) -> Self {
        Self {
            store,
            session,
            selected: settings.default_model,
            settings,
            messages: Vec::new(),
            draft: String::new(),
            live_archived: false,
        }
    }

    pub fn store(&self) -> &Arc<ModelLifecycleStore<R>> {
        &self.store
    }

    pub fn session(&self) -> &Arc<GenerationSession<R>> {
        &self.session
    }

    pub fn select_model(&mut self, model: ModelId) {
        if model != self.selected {
            log::info!("[CHAT] Selected {}", model);
            self.selected = model;
        }
    }

    pub fn selected_model(&self) -> ModelId {
        self.selected
    }

    pub fn selected_status(&self) -> ModelStatus {
        self.store.status(self.selected)
    }

    /// Start (or join) the download of the selected model.
    pub async fn download_selected(&self) -> Result<LoadOutcome, LoadError> {
        self.store.request_load(self.selected).await
    }

    pub fn is_model_ready(&self) -> bool {
        matches!(self.selected_status(), ModelStatus::Ready)
    }

    /// Input is disabled until the model is ready and while a reply streams.
    pub fn is_interface_disabled(&self) -> bool {
        !self.is_model_ready() || self.session.is_generating()
    }

    /// Progress text for the selected model while it downloads.
    pub fn progress_label(&self) -> Option<String> {
        match self.selected_status() {
            ModelStatus::Loading { percent } => Some(format!("Downloading... {}%", percent as u32)),
            _ => None,
        }
    }

    /// The reply bubble currently on screen: streamed text, or the failure
    /// of the latest generation.
    pub fn live_bubble(&self) -> String {
        if self.live_archived {
            return String::new();
        }
        match self.session.last_outcome() {
            Some(Err(e)) if !self.session.is_generating() => format!("Failed: {}", e),
            _ => self.session.output(),
        }
    }

    /// Finished messages followed by the live bubble, if any.
    pub fn transcript(&self) -> Vec<String> {
        let mut all = self.messages.clone();
        let live = self.live_bubble();
        if !live.is_empty() {
            all.push(live);
        }
        all
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    /// Send the draft input. The draft is cleared once a generation was
    /// attempted and kept when the model is not ready.
    pub async fn send_draft(&mut self, cancel: CancellationToken) -> SendOutcome {
        let input = self.draft.clone();
        let outcome = self.send_message(&input, cancel).await;
        if matches!(outcome, SendOutcome::Generated(_)) {
            self.draft.clear();
        }
        outcome
    }

    /// Send `input` to the selected model and stream the reply.
    pub async fn send_message(&mut self, input: &str, cancel: CancellationToken) -> SendOutcome {
        if input.is_empty() {
            return SendOutcome::Ignored;
        }

        let previous = self.live_bubble();
        if !previous.is_empty() {
            self.messages.push(previous);
            self.live_archived = true;
        }
        self.messages.push(format!("You: {}", input));

        let Some(handle) = self.store.handle(self.selected) else {
            log::warn!("[CHAT] {} is not ready", self.selected);
            self.messages
                .push(format!("{}: [Model not ready]", self.selected));
            return SendOutcome::ModelNotReady;
        };

        self.live_archived = false;
        let result = self
            .session
            .generate(
                input,
                handle,
                self.selected.configuration(),
                self.settings.generation,
                cancel,
            )
            .await;
        SendOutcome::Generated(result)
    }

    /// Every catalog model with its lifecycle status and download state.
    pub fn catalog_json(&self) -> serde_json::Value {
        let models: Vec<LocalModelInfo> = available_models()
            .iter()
            .map(|m| LocalModelInfo {
                id: m.id,
                name: m.name.to_string(),
                repo_id: m.repo_id.to_string(),
                size_bytes: m.size_bytes,
                weights_source: m.weights_source,
                description: m.description.to_string(),
                downloaded: model_manager::is_model_downloaded(&self.settings.models_dir, m),
                status: self.store.status(m.id),
            })
            .collect();

        serde_json::json!({
            "selected": self.selected,
            "models": models,
        })
    }
}
