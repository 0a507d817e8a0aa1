//! DialogPresenter - at most one live prompt per query id on this peer

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use super::inputs::{normalize_answers, prepare_inputs};
use super::renderer::{Prompt, PromptReply, PromptRenderer};
use crate::protocol::{PromptConfig, QueryId, QueryRequest};

/// Result of asking the local user
#[derive(Debug, Clone, PartialEq)]
pub enum DialogOutcome {
    /// The prompt ran to completion; `None` means it was closed unanswered
    Prompted { answers: Option<Value> },
    /// The request could not be shown
    Errored { error: String },
    /// A prompt for this id was already live and has been raised instead
    Fronted,
}

/// Lifecycle of a prompt entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    Presenting,
    /// Dismissed; waiting for the renderer to report back
    Done,
}

type Completion = Shared<BoxFuture<'static, DialogOutcome>>;

/// Peer-local record of a shown prompt
pub struct DialogEntry {
    pub id: QueryId,
    pub prompt_state: PromptState,
    generation: u64,
    completion: Completion,
}

#[derive(Default)]
struct DialogStore {
    entries: HashMap<QueryId, DialogEntry>,
    next_generation: u64,
}

/// Shows prompts through a renderer and deduplicates them by query id
///
/// Cloneable; every clone shares the same entry store.
#[derive(Clone)]
pub struct DialogPresenter {
    renderer: Arc<dyn PromptRenderer>,
    store: Arc<Mutex<DialogStore>>,
}

impl DialogPresenter {
    pub fn new(renderer: Arc<dyn PromptRenderer>) -> Self {
        debug!("DialogPresenter::new: called");
        Self {
            renderer,
            store: Arc::new(Mutex::new(DialogStore::default())),
        }
    }

    /// Ask the local user to fill in `request`
    pub async fn ask(&self, mut request: QueryRequest, options: PromptConfig) -> DialogOutcome {
        let Some(id) = request.query_id().map(str::to_string) else {
            return DialogOutcome::Errored {
                error: "An ID must be provided".to_string(),
            };
        };
        debug!(%id, inputs = request.inputs.len(), "DialogPresenter::ask: called");

        if request.inputs.is_empty() {
            return DialogOutcome::Errored {
                error: "At least one input must be provided".to_string(),
            };
        }

        let mut store = self.store.lock().await;

        let in_flight = store
            .entries
            .get(&id)
            .filter(|entry| entry.prompt_state == PromptState::Presenting)
            .map(|entry| entry.completion.clone());

        if let Some(pending) = in_flight {
            debug!(%id, only_one_waiting = options.only_one_waiting, "DialogPresenter::ask: already presenting");
            self.renderer.bring_to_front(&id);
            if options.only_one_waiting {
                return DialogOutcome::Fronted;
            }
            drop(store);
            return pending.await;
        }

        prepare_inputs(&mut request.inputs);
        store.next_generation += 1;
        let generation = store.next_generation;

        let reply = self.renderer.present(Prompt {
            id: id.clone(),
            title: request.question.clone(),
            description: request.description.clone(),
            inputs: request.inputs,
        });

        let entries = Arc::clone(&self.store);
        let entry_id = id.clone();
        let always_use_answer_object = options.always_use_answer_object;
        let completion: Completion = async move {
            let reply = reply.await.unwrap_or(PromptReply::Closed);

            let mut store = entries.lock().await;
            if store.entries.get(&entry_id).is_some_and(|e| e.generation == generation) {
                store.entries.remove(&entry_id);
            }
            drop(store);

            match reply {
                PromptReply::Submitted(answers) => DialogOutcome::Prompted {
                    answers: Some(normalize_answers(answers, always_use_answer_object)),
                },
                PromptReply::Closed => DialogOutcome::Prompted { answers: None },
            }
        }
        .boxed()
        .shared();

        store.entries.insert(
            id.clone(),
            DialogEntry {
                id,
                prompt_state: PromptState::Presenting,
                generation,
                completion: completion.clone(),
            },
        );
        drop(store);

        completion.await
    }

    /// Dismiss the live prompt for `id`, if any
    pub async fn close(&self, id: &str) -> bool {
        debug!(%id, "DialogPresenter::close: called");
        let mut store = self.store.lock().await;
        match store.entries.get_mut(id) {
            Some(entry) if entry.prompt_state == PromptState::Presenting => {
                entry.prompt_state = PromptState::Done;
                drop(store);
                self.renderer.dismiss(id);
                true
            }
            _ => {
                debug!(%id, "DialogPresenter::close: nothing to close");
                false
            }
        }
    }

    /// Whether a prompt for `id` is currently shown
    pub async fn is_presenting(&self, id: &str) -> bool {
        self.store
            .lock()
            .await
            .entries
            .get(id)
            .is_some_and(|e| e.prompt_state == PromptState::Presenting)
    }

    /// Number of prompts currently shown
    pub async fn len(&self) -> usize {
        self.store
            .lock()
            .await
            .entries
            .values()
            .filter(|e| e.prompt_state == PromptState::Presenting)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
