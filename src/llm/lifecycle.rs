//! Model lifecycle store. One state per catalog model, advanced by
//! `request_load` and observed by the chat surface.
//!
//! States move `NotLoaded → Loading → Ready`, or `Loading → Failed` when the
//! runtime errors or the loading caller goes away. `retry` is the only way back (`Failed → NotLoaded`).
//! Loaded handles are held as `Arc<Model>` and lent to generation sessions.

use super::error::LoadError;
use super::model_registry::ModelId;
use super::runtime::{InferenceRuntime, ProgressFn};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Error recorded for a load whose caller went away mid-fetch.
pub const ABANDONED: &str = "load abandoned";

/// Default allocator cap handed to the runtime before each load.
pub const DEFAULT_CACHE_LIMIT_BYTES: u64 = 20 * 1024 * 1024;

/// Lifecycle state of one model, including its loaded handle.
pub enum ModelState<M> {
    NotLoaded,
    Loading { percent: f64 },
    Ready(Arc<M>),
    Failed { error: String },
}

impl<M> Clone for ModelState<M> {
    fn clone(&self) -> Self {
        match self {
            Self::NotLoaded => Self::NotLoaded,
            Self::Loading { percent } => Self::Loading { percent: *percent },
            Self::Ready(handle) => Self::Ready(Arc::clone(handle)),
            Self::Failed { error } => Self::Failed {
                error: error.clone(),
            },
        }
    }
}

impl<M> ModelState<M> {
    pub fn status(&self) -> ModelStatus {
        match self {
            Self::NotLoaded => ModelStatus::NotLoaded,
            Self::Loading { percent } => ModelStatus::Loading { percent: *percent },
            Self::Ready(_) => ModelStatus::Ready,
            Self::Failed { error } => ModelStatus::Failed {
                error: error.clone(),
            },
        }
    }
}

/// Handle-free view of a model's state, for observers and the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ModelStatus {
    NotLoaded,
    Loading { percent: f64 },
    Ready,
    Failed { error: String },
}

/// Broadcast on every state mutation, in mutation order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelStateChange {
    pub model: ModelId,
    pub status: ModelStatus,
}

/// What a `request_load` call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// This call drove the model from `NotLoaded` to `Ready`.
    Loaded,
    AlreadyLoading,
    AlreadyReady,
}

/// State shared with progress callbacks running on runtime threads.
struct Shared<M> {
    states: Mutex<HashMap<ModelId, ModelState<M>>>,
    events: broadcast::Sender<ModelStateChange>,
}

impl<M> Shared<M> {
    fn lock(&self) -> MutexGuard<'_, HashMap<ModelId, ModelState<M>>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `state` and announce it while still holding the lock.
    fn publish(
        &self,
        states: &mut HashMap<ModelId, ModelState<M>>,
        model: ModelId,
        state: ModelState<M>,
    ) {
        let status = state.status();
        states.insert(model, state);
        // No subscribers is fine; observers can always poll `status`.
        let _ = self.events.send(ModelStateChange { model, status });
    }

    fn apply_progress(&self, model: ModelId, fraction: f64) {
        let percent = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0) * 100.0
        } else {
            return;
        };
        let mut states = self.lock();
        // Stale, repeated or late progress is dropped.
        let advances = matches!(
            states.get(&model),
            Some(ModelState::Loading { percent: current }) if percent > *current
        );
        if advances {
            self.publish(&mut states, model, ModelState::Loading { percent });
        }
    }
}

/// Fails a model that is still `Loading` when its `request_load` future is
/// dropped before the fetch finished, or unwinds out of it.
struct LoadGuard<M> {
    shared: Arc<Shared<M>>,
    model: ModelId,
    armed: bool,
}

impl<M> LoadGuard<M> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl<M> Drop for LoadGuard<M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut states = self.shared.lock();
        if matches!(states.get(&self.model), Some(ModelState::Loading { .. })) {
            log::warn!("[LIFECYCLE] Loading {} was abandoned", self.model);
            self.shared.publish(
                &mut states,
                self.model,
                ModelState::Failed {
                    error: ABANDONED.to_string(),
                },
            );
        }
    }
}

/// Owns the per-model state map and the runtime used to load models.
pub struct ModelLifecycleStore<R: InferenceRuntime> {
    runtime: Arc<R>,
    shared: Arc<Shared<R::Model>>,
    cache_limit_bytes: u64,
}

impl<R: InferenceRuntime> ModelLifecycleStore<R> {
    pub fn new(runtime: Arc<R>) -> Self {
        Self::with_cache_limit(runtime, DEFAULT_CACHE_LIMIT_BYTES)
    }

    pub fn with_cache_limit(runtime: Arc<R>, cache_limit_bytes: u64) -> Self {
        let states = ModelId::ALL
            .into_iter()
            .map(|id| (id, ModelState::NotLoaded))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            runtime,
            shared: Arc::new(Shared {
                states: Mutex::new(states),
                events,
            }),
            cache_limit_bytes,
        }
    }

    pub fn runtime(&self) -> &Arc<R> {
        &self.runtime
    }

    /// Load a model if nobody has yet.
    ///
    /// Only a `NotLoaded` model starts a fetch; `Loading` and `Ready` models
    /// return immediately. A `Failed` model must be `retry`'d first.
    ///
    /// Dropping the returned future mid-fetch fails the model with
    /// [`ABANDONED`], so it can be retried.
    pub async fn request_load(&self, model: ModelId) -> Result<LoadOutcome, LoadError> {
        {
            let mut states = self.shared.lock();
            match states.get(&model) {
                Some(ModelState::Loading { .. }) => return Ok(LoadOutcome::AlreadyLoading),
                Some(ModelState::Ready(_)) => return Ok(LoadOutcome::AlreadyReady),
                Some(ModelState::Failed { .. }) => return Err(LoadError::NeedsRetry(model)),
                Some(ModelState::NotLoaded) | None => {}
            }
            self.shared
                .publish(&mut states, model, ModelState::Loading { percent: 0.0 });
        }
        let mut guard = LoadGuard {
            shared: Arc::clone(&self.shared),
            model,
            armed: true,
        };

        let config = model.configuration();
        log::info!(
            "[LIFECYCLE] Loading {} from {} (cache limit {} bytes)",
            model,
            config.repo_id,
            self.cache_limit_bytes
        );
        self.runtime.set_cache_limit(self.cache_limit_bytes);

        let shared = Arc::clone(&self.shared);
        let on_progress: ProgressFn = Arc::new(move |fraction| shared.apply_progress(model, fraction));

        let start = std::time::Instant::now();
        let result = self.runtime.fetch_and_initialize(config, on_progress).await;

        guard.disarm();
        let mut states = self.shared.lock();
        match result {
            Ok(handle) => {
                self.shared
                    .publish(&mut states, model, ModelState::Ready(Arc::new(handle)));
                log::info!(
                    "[LIFECYCLE] {} ready in {}ms",
                    model,
                    start.elapsed().as_millis()
                );
                Ok(LoadOutcome::Loaded)
            }
            Err(source) => {
                log::error!("[LIFECYCLE] Loading {} failed: {}", model, source);
                self.shared.publish(
                    &mut states,
                    model,
                    ModelState::Failed {
                        error: source.to_string(),
                    },
                );
                Err(LoadError::Runtime { model, source })
            }
        }
    }

    /// Reset a failed model so it can be loaded again.
    ///
    /// Returns false (and changes nothing) unless the model is `Failed`.
    pub fn retry(&self, model: ModelId) -> bool {
        let mut states = self.shared.lock();
        if !matches!(states.get(&model), Some(ModelState::Failed { .. })) {
            return false;
        }
        self.shared.publish(&mut states, model, ModelState::NotLoaded);
        log::info!("[LIFECYCLE] {} reset for retry", model);
        true
    }

    pub fn state(&self, model: ModelId) -> ModelState<R::Model> {
        self.shared
            .lock()
            .get(&model)
            .cloned()
            .unwrap_or(ModelState::NotLoaded)
    }

    pub fn status(&self, model: ModelId) -> ModelStatus {
        self.state(model).status()
    }

    /// Status of every catalog model, in picker order.
    pub fn snapshot(&self) -> Vec<(ModelId, ModelStatus)> {
        let states = self.shared.lock();
        ModelId::ALL
            .into_iter()
            .map(|id| {
                let status = states
                    .get(&id)
                    .map(ModelState::status)
                    .unwrap_or(ModelStatus::NotLoaded);
                (id, status)
            })
            .collect()
    }

    /// The loaded handle, if the model is `Ready`.
    pub fn handle(&self, model: ModelId) -> Option<Arc<R::Model>> {
        match self.shared.lock().get(&model) {
            Some(ModelState::Ready(handle)) => Some(Arc::clone(handle)),
            _ => None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ModelStateChange> {
        self.shared.events.subscribe()
    }
}
