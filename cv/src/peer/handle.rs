//! PeerHandle - client interface to a running Peer

use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use super::messages::{PeerMetrics, PeerRequest};
use crate::dialog::{DialogOutcome, DialogPresenter};
use crate::directory::UserId;
use crate::error::CanvassError;
use crate::protocol::{PromptConfig, QueryRequest};
use crate::query::{QueryOptions, QuerySnapshot, QueryStart};

/// Handle for the local application to drive its peer
///
/// Cloneable; every operation is a message to the peer task.
#[derive(Clone)]
pub struct PeerHandle {
    tx: mpsc::Sender<PeerRequest>,
    presenter: DialogPresenter,
    user_id: UserId,
}

impl PeerHandle {
    pub(crate) fn new(tx: mpsc::Sender<PeerRequest>, presenter: DialogPresenter, user_id: UserId) -> Self {
        debug!(%user_id, "PeerHandle::new: called");
        Self { tx, presenter, user_id }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> PeerRequest) -> Result<T, CanvassError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(build(reply_tx))
            .await
            .map_err(|_| CanvassError::ChannelClosed)?;
        reply_rx.await.map_err(|_| CanvassError::ChannelClosed)
    }

    /// Ask other participants for input
    pub async fn query(&self, request: QueryRequest, options: QueryOptions) -> Result<QueryStart, CanvassError> {
        debug!(user_id = %self.user_id, id = ?request.id, "PeerHandle::query: called");
        self.request(|reply_tx| PeerRequest::Query {
            request,
            options,
            reply_tx,
        })
        .await?
    }

    /// Prompt some targets again; false if the query is gone
    pub async fn requery(&self, id: &str, users: &[&str]) -> Result<bool, CanvassError> {
        debug!(user_id = %self.user_id, %id, ?users, "PeerHandle::requery: called");
        let users = users.iter().map(|u| u.to_string()).collect();
        self.request(|reply_tx| PeerRequest::Requery {
            id: id.to_string(),
            users,
            reply_tx,
        })
        .await
    }

    pub async fn cancel(&self, id: &str) -> Result<bool, CanvassError> {
        debug!(user_id = %self.user_id, %id, "PeerHandle::cancel: called");
        self.request(|reply_tx| PeerRequest::Cancel {
            id: id.to_string(),
            reply_tx,
        })
        .await
    }

    pub async fn finish(&self, id: &str) -> Result<bool, CanvassError> {
        debug!(user_id = %self.user_id, %id, "PeerHandle::finish: called");
        self.request(|reply_tx| PeerRequest::Finish {
            id: id.to_string(),
            reply_tx,
        })
        .await
    }

    /// Send an acknowledgement to a responder of query `id`
    pub async fn notify(
        &self,
        id: &str,
        user_id: &str,
        content: &str,
        include_privileged: bool,
    ) -> Result<(), CanvassError> {
        debug!(from = %self.user_id, %id, %user_id, "PeerHandle::notify: called");
        self.request(|reply_tx| PeerRequest::Notify {
            id: id.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            include_privileged,
            reply_tx,
        })
        .await?
    }

    pub async fn snapshot(&self, id: &str) -> Result<Option<QuerySnapshot>, CanvassError> {
        self.request(|reply_tx| PeerRequest::Snapshot {
            id: id.to_string(),
            reply_tx,
        })
        .await
    }

    /// Prompt the local user directly, without any broadcast
    pub async fn ask(&self, request: QueryRequest, config: PromptConfig) -> DialogOutcome {
        debug!(user_id = %self.user_id, id = ?request.id, "PeerHandle::ask: called");
        self.presenter.ask(request, config).await
    }

    pub async fn metrics(&self) -> Result<PeerMetrics, CanvassError> {
        self.request(|reply_tx| PeerRequest::GetMetrics { reply_tx }).await
    }

    pub async fn shutdown(&self) -> Result<(), CanvassError> {
        debug!(user_id = %self.user_id, "PeerHandle::shutdown: called");
        self.tx
            .send(PeerRequest::Shutdown)
            .await
            .map_err(|_| CanvassError::ChannelClosed)
    }
}
