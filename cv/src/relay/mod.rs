//! Relay - decode inbound frames and dispatch the ones addressed here
//!
//! Prompts and cancels go to the local `DialogPresenter`, submits are handed
//! back to the peer for its coordinator, notifies become whispered notices.
//! Bad frames are reported through the `NotificationSink` and dropped.

mod route;

use std::collections::VecDeque;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dialog::{DialogOutcome, DialogPresenter};
use crate::directory::{Directory, UserId};
use crate::error::CanvassError;
use crate::notice::{Notice, NotificationSink};
use crate::protocol::{CancelPayload, Message, NotifyPayload, PromptPayload, QueryId, SubmitPayload};
use crate::transport::{Frame, Transport};

pub use route::{Route, audience_includes, route};

/// Answered queries remembered for acknowledgement; the oldest is forgotten past this
pub const MAX_PENDING_ACKNOWLEDGEMENTS: usize = 256;

/// A local prompt finished; sent back to the peer loop
#[derive(Debug, Clone, PartialEq)]
pub struct DialogDone {
    pub id: QueryId,
    pub outcome: DialogOutcome,
}

/// What the relay did with a frame
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatch {
    Handled,
    /// A submission for the coordinator to consider
    Submit {
        id: QueryId,
        user_id: UserId,
        answers: Option<Value>,
    },
    /// Not addressed to this peer
    Ignored,
    /// Rejected as invalid
    Dropped,
}

pub struct Relay {
    user_id: UserId,
    presenter: DialogPresenter,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
    sink: Arc<dyn NotificationSink>,
    dialog_tx: mpsc::UnboundedSender<DialogDone>,
    /// Queries answered here that may still be acknowledged, once each, oldest first
    responded: VecDeque<QueryId>,
}

impl Relay {
    pub fn new(
        user_id: impl Into<String>,
        presenter: DialogPresenter,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        sink: Arc<dyn NotificationSink>,
        dialog_tx: mpsc::UnboundedSender<DialogDone>,
    ) -> Self {
        let user_id = user_id.into();
        debug!(%user_id, "Relay::new: called");
        Self {
            user_id,
            presenter,
            transport,
            directory,
            sink,
            dialog_tx,
            responded: VecDeque::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Decode, filter and dispatch one inbound frame
    pub async fn receive(&mut self, frame: Frame) -> Dispatch {
        let message = match Message::decode(&frame.body) {
            Ok(message) => message,
            Err(e) => {
                self.report(&frame.sender, &e);
                return Dispatch::Dropped;
            }
        };

        if route(&message, &frame.sender, &self.user_id) == Route::Skip {
            debug!(event = message.event(), id = message.id(), sender = %frame.sender, "Relay::receive: not addressed here");
            return Dispatch::Ignored;
        }
        debug!(event = message.event(), id = message.id(), sender = %frame.sender, "Relay::receive: dispatching");

        match message {
            Message::Prompt(payload) => {
                self.forget(&payload.id);
                self.on_prompt(payload)
            }
            Message::Cancel(payload) => {
                self.forget(&payload.id);
                self.on_cancel(payload).await
            }
            Message::Submit(SubmitPayload { id, answers }) => Dispatch::Submit {
                id,
                user_id: frame.sender,
                answers,
            },
            Message::Notify(payload) => self.on_notify(payload),
        }
    }

    /// Show the prompt in the background; the outcome comes back as `DialogDone`
    fn on_prompt(&self, payload: PromptPayload) -> Dispatch {
        let PromptPayload {
            id, request, config, ..
        } = payload;

        let mut request = request;
        request.id = Some(id.clone());

        let presenter = self.presenter.clone();
        let dialog_tx = self.dialog_tx.clone();
        tokio::spawn(async move {
            let outcome = presenter.ask(request, config).await;
            // The peer loop may already be gone
            let _ = dialog_tx.send(DialogDone { id, outcome });
        });
        Dispatch::Handled
    }

    async fn on_cancel(&self, payload: CancelPayload) -> Dispatch {
        if !self.presenter.close(&payload.id).await {
            let stale = CanvassError::StaleReference(payload.id);
            debug!(error = %stale, "Relay::on_cancel: nothing to dismiss");
        }
        Dispatch::Handled
    }

    fn on_notify(&mut self, payload: NotifyPayload) -> Dispatch {
        if !self.forget(&payload.id) {
            debug!(id = %payload.id, "Relay::on_notify: not answered here or already acknowledged");
            return Dispatch::Ignored;
        }

        let mut recipients = vec![self.user_id.clone()];
        if payload.include_privileged {
            for user in self.directory.privileged_users() {
                if !recipients.contains(&user) {
                    recipients.push(user);
                }
            }
        }

        self.sink.whisper(Notice::new(payload.id, payload.content, recipients));
        Dispatch::Handled
    }

    /// A local prompt finished; report errors or broadcast the answer
    pub fn dialog_finished(&mut self, done: DialogDone) {
        let DialogDone { id, outcome } = done;
        debug!(%id, ?outcome, "Relay::dialog_finished: called");

        match outcome {
            DialogOutcome::Fronted => {}
            DialogOutcome::Errored { error } => {
                warn!(%id, %error, "Prompt could not be shown");
                self.sink.error(&error);
            }
            DialogOutcome::Prompted { answers } => {
                if answers.is_some() {
                    self.remember(&id);
                }
                let message = Message::Submit(SubmitPayload { id: id.clone(), answers });
                let sent = message
                    .encode()
                    .and_then(|body| self.transport.broadcast(body).map_err(CanvassError::from));
                if let Err(e) = sent {
                    warn!(%id, error = %e, "Failed to broadcast submit");
                }
            }
        }
    }

    /// Whether an acknowledgement for `id` would still be accepted
    pub fn awaiting_acknowledgement(&self, id: &str) -> bool {
        self.responded.iter().any(|answered| answered == id)
    }

    /// Number of answered queries still open to acknowledgement
    pub fn pending_acknowledgements(&self) -> usize {
        self.responded.len()
    }

    fn remember(&mut self, id: &str) {
        if self.awaiting_acknowledgement(id) {
            return;
        }
        self.responded.push_back(id.to_string());
        if self.responded.len() > MAX_PENDING_ACKNOWLEDGEMENTS
            && let Some(oldest) = self.responded.pop_front()
        {
            debug!(id = %oldest, "Relay: no acknowledgement arrived, forgetting answered query");
        }
    }

    /// Drop `id` from the answered set; true if it was there
    fn forget(&mut self, id: &str) -> bool {
        match self.responded.iter().position(|answered| answered == id) {
            Some(index) => {
                self.responded.remove(index);
                true
            }
            None => false,
        }
    }

    fn report(&self, sender: &str, error: &CanvassError) {
        if error.is_silent() {
            debug!(%sender, %error, "Relay: stale frame ignored");
        } else if error.is_user_visible() {
            warn!(%sender, %error, "Relay: dropping invalid frame");
            self.sink.error(&error.to_string());
        } else {
            warn!(%sender, %error, "Relay: dropping frame");
        }
    }
}
