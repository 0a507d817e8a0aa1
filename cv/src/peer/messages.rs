//! Message types for the Peer task

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::directory::UserId;
use crate::error::CanvassError;
use crate::protocol::{QueryId, QueryRequest};
use crate::query::{QueryOptions, QuerySnapshot, QueryStart};

/// Internal requests to the Peer task
#[derive(Debug)]
pub enum PeerRequest {
    /// Start a query owned by this peer
    Query {
        request: QueryRequest,
        options: QueryOptions,
        reply_tx: oneshot::Sender<Result<QueryStart, CanvassError>>,
    },

    /// Prompt some targets of a live query again
    Requery {
        id: QueryId,
        users: Vec<UserId>,
        reply_tx: oneshot::Sender<bool>,
    },

    /// Abandon a query
    Cancel { id: QueryId, reply_tx: oneshot::Sender<bool> },

    /// End a query with the answers collected so far
    Finish { id: QueryId, reply_tx: oneshot::Sender<bool> },

    /// Acknowledge a responder
    Notify {
        id: QueryId,
        user_id: UserId,
        content: String,
        include_privileged: bool,
        reply_tx: oneshot::Sender<Result<(), CanvassError>>,
    },

    /// Copy of a live query
    Snapshot {
        id: QueryId,
        reply_tx: oneshot::Sender<Option<QuerySnapshot>>,
    },

    /// Query time limit reached (internal); `generation` names the query the timer was armed for
    QueryExpired { id: QueryId, generation: u64 },

    /// Get current metrics
    GetMetrics { reply_tx: oneshot::Sender<PeerMetrics> },

    /// Stop the peer
    Shutdown,
}

/// Peer metrics for observability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerMetrics {
    pub live_queries: usize,
    pub open_dialogs: usize,
    pub messages_received: u64,
    /// Frames that reached at least one receiver
    pub messages_sent: u64,
    pub dropped_messages: u64,
    pub queries_resolved: u64,
    pub queries_cancelled: u64,
    pub queries_expired: u64,
}
