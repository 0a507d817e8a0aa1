//! Requestor-side progress view for a single query
//!
//! The coordinator owns a `StatusObserver` and publishes a fresh snapshot on
//! every status change. Whoever displays progress holds the matching
//! `StatusWatch`; it can read snapshots, re-prompt one participant, or
//! dismiss the view. The watch never touches query state directly, its
//! requests go back through the peer.

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::directory::UserId;
use crate::error::CanvassError;
use crate::protocol::QueryId;
use crate::query::UserStatus;

/// Requests a status view sends back to its coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum ObserverRequest {
    Requery { id: QueryId, user_id: UserId },
    Dismissed { id: QueryId },
}

/// One row of the status view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProgress {
    pub user_id: UserId,
    pub name: String,
    pub active: bool,
    pub status: UserStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answers: Option<Value>,
}

/// Read-only projection of a query's progress
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub query_id: QueryId,
    pub users: Vec<UserProgress>,
    /// Set once the query is gone or the observer was detached
    pub closed: bool,
}

impl StatusSnapshot {
    pub fn status_of(&self, user_id: &str) -> Option<UserStatus> {
        self.users.iter().find(|u| u.user_id == user_id).map(|u| u.status)
    }

    /// Number of participants in the given status
    pub fn count(&self, status: UserStatus) -> usize {
        self.users.iter().filter(|u| u.status == status).count()
    }
}

/// Coordinator-owned publishing half
#[derive(Debug)]
pub struct StatusObserver {
    query_id: QueryId,
    tx: watch::Sender<StatusSnapshot>,
}

impl StatusObserver {
    /// Create an observer and the watch handed to the display side
    pub fn new(
        initial: StatusSnapshot,
        requests: mpsc::UnboundedSender<ObserverRequest>,
    ) -> (Self, StatusWatch) {
        debug!(query_id = %initial.query_id, "StatusObserver::new: called");
        let query_id = initial.query_id.clone();
        let (tx, rx) = watch::channel(initial);
        let observer = Self {
            query_id: query_id.clone(),
            tx,
        };
        let watch = StatusWatch { query_id, rx, requests };
        (observer, watch)
    }

    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Publish a new snapshot; stored even when nobody is watching
    pub fn refresh(&self, snapshot: StatusSnapshot) {
        debug!(query_id = %self.query_id, "StatusObserver::refresh: called");
        self.tx.send_replace(snapshot);
    }

    /// Publish the final snapshot and stop
    pub fn close(self, mut snapshot: StatusSnapshot) {
        debug!(query_id = %self.query_id, "StatusObserver::close: called");
        snapshot.closed = true;
        self.tx.send_replace(snapshot);
    }
}

/// Display-side half of a status view
#[derive(Debug)]
pub struct StatusWatch {
    query_id: QueryId,
    rx: watch::Receiver<StatusSnapshot>,
    requests: mpsc::UnboundedSender<ObserverRequest>,
}

impl StatusWatch {
    pub fn query_id(&self) -> &str {
        &self.query_id
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> StatusSnapshot {
        self.rx.borrow().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.rx.borrow().closed
    }

    /// Wait for the next snapshot; false once the observer is gone
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Wait until a snapshot satisfies `predicate`
    ///
    /// Returns None if the observer goes away first.
    pub async fn wait_for<F>(&mut self, predicate: F) -> Option<StatusSnapshot>
    where
        F: FnMut(&StatusSnapshot) -> bool,
    {
        self.rx.wait_for(predicate).await.ok().map(|snapshot| snapshot.clone())
    }

    /// Ask the coordinator to prompt one participant again
    pub fn requery(&self, user_id: &str) -> Result<(), CanvassError> {
        debug!(query_id = %self.query_id, %user_id, "StatusWatch::requery: called");
        self.requests
            .send(ObserverRequest::Requery {
                id: self.query_id.clone(),
                user_id: user_id.to_string(),
            })
            .map_err(|_| CanvassError::ChannelClosed)
    }

    /// Close the view; the query may resolve by absence afterwards
    pub fn dismiss(self) -> Result<(), CanvassError> {
        debug!(query_id = %self.query_id, "StatusWatch::dismiss: called");
        self.requests
            .send(ObserverRequest::Dismissed { id: self.query_id })
            .map_err(|_| CanvassError::ChannelClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(status: UserStatus) -> StatusSnapshot {
        StatusSnapshot {
            query_id: "q-1".to_string(),
            users: vec![UserProgress {
                user_id: "alice".to_string(),
                name: "Alice".to_string(),
                active: true,
                status,
                answers: None,
            }],
            closed: false,
        }
    }

    #[tokio::test]
    async fn test_refresh_reaches_watch() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (observer, mut watch) = StatusObserver::new(snapshot(UserStatus::Waiting), tx);
        assert_eq!(watch.snapshot().status_of("alice"), Some(UserStatus::Waiting));

        observer.refresh(snapshot(UserStatus::Finished));
        assert!(watch.changed().await);
        assert_eq!(watch.snapshot().count(UserStatus::Finished), 1);
        assert!(!watch.is_closed());
    }

    #[tokio::test]
    async fn test_close_marks_snapshot_closed() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (observer, mut watch) = StatusObserver::new(snapshot(UserStatus::Waiting), tx);

        observer.close(snapshot(UserStatus::Finished));
        let last = watch.wait_for(|s| s.closed).await.unwrap();
        assert_eq!(last.status_of("alice"), Some(UserStatus::Finished));
        assert!(!watch.changed().await);
    }

    #[tokio::test]
    async fn test_requests_go_back_to_coordinator() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_observer, watch) = StatusObserver::new(snapshot(UserStatus::Disconnected), tx);

        watch.requery("alice").unwrap();
        watch.dismiss().unwrap();

        assert_eq!(
            rx.recv().await,
            Some(ObserverRequest::Requery {
                id: "q-1".to_string(),
                user_id: "alice".to_string()
            })
        );
        assert_eq!(rx.recv().await, Some(ObserverRequest::Dismissed { id: "q-1".to_string() }));
    }

    #[test]
    fn test_requery_after_coordinator_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (_observer, watch) = StatusObserver::new(snapshot(UserStatus::Waiting), tx);
        drop(rx);
        assert!(matches!(watch.requery("alice"), Err(CanvassError::ChannelClosed)));
    }
}
