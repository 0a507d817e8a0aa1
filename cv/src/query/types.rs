//! Query-side value types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::oneshot;

use crate::directory::UserId;
use crate::error::CanvassError;
use crate::protocol::{PromptConfig, QueryId};
use crate::status::StatusWatch;

/// Collected answers keyed by participant
pub type Responses = BTreeMap<UserId, Value>;

/// Per-participant progress within a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Dismissed the prompt without answering
    Unprompted,
    Waiting,
    Finished,
    Disconnected,
}

impl UserStatus {
    /// Whether this participant no longer holds up resolution
    ///
    /// Absent and dismissed participants only count while nobody is
    /// watching the query's progress.
    pub fn counts_as_finished(self, observed: bool) -> bool {
        match self {
            UserStatus::Finished => true,
            UserStatus::Waiting => false,
            UserStatus::Unprompted | UserStatus::Disconnected => !observed,
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UserStatus::Unprompted => write!(f, "unprompted"),
            UserStatus::Waiting => write!(f, "waiting"),
            UserStatus::Finished => write!(f, "finished"),
            UserStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

/// Content sent back to a responder after their answer is recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub content: String,
    /// Also show it to privileged participants
    pub include_privileged: bool,
}

impl Acknowledgement {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            include_privileged: false,
        }
    }

    pub fn with_privileged(mut self) -> Self {
        self.include_privileged = true;
        self
    }
}

/// Hook run with `(query id, user id, answers)` for every recorded answer
pub type SubmitHook = Box<dyn FnMut(&str, &str, &Value) -> Option<Acknowledgement> + Send>;

/// Caller options for starting a query
#[derive(Default)]
pub struct QueryOptions {
    /// Explicit targets; everyone but the requestor when None
    pub users: Option<Vec<UserId>>,
    /// Attach a status view; the coordinator default applies when None
    pub show_status: Option<bool>,
    /// Options passed through to every prompt
    pub config: Option<PromptConfig>,
    pub on_submit: Option<SubmitHook>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.users = Some(users.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_status(mut self, show_status: bool) -> Self {
        self.show_status = Some(show_status);
        self
    }

    pub fn with_config(mut self, config: PromptConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn on_submit<F>(mut self, hook: F) -> Self
    where
        F: FnMut(&str, &str, &Value) -> Option<Acknowledgement> + Send + 'static,
    {
        self.on_submit = Some(Box::new(hook));
        self
    }
}

impl fmt::Debug for QueryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryOptions")
            .field("users", &self.users)
            .field("show_status", &self.show_status)
            .field("config", &self.config)
            .field("on_submit", &self.on_submit.is_some())
            .finish()
    }
}

/// Point-in-time copy of a live query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySnapshot {
    pub id: QueryId,
    pub target_users: Vec<UserId>,
    pub status: BTreeMap<UserId, UserStatus>,
    pub responses: Responses,
    pub config: PromptConfig,
    pub observed: bool,
}

/// What `query()` did
#[derive(Debug)]
pub enum QueryStart {
    /// A new query was registered
    Pending(PendingQuery),
    /// A query with this id was already live; its prompt was sent again
    Reprompted,
}

impl QueryStart {
    pub fn into_pending(self) -> Option<PendingQuery> {
        match self {
            QueryStart::Pending(pending) => Some(pending),
            QueryStart::Reprompted => None,
        }
    }
}

/// Completion side of a newly registered query
#[derive(Debug)]
pub struct PendingQuery {
    pub id: QueryId,
    /// Present when a status view was requested
    pub status: Option<StatusWatch>,
    completion: oneshot::Receiver<Option<Responses>>,
}

impl PendingQuery {
    pub(crate) fn new(
        id: QueryId,
        status: Option<StatusWatch>,
        completion: oneshot::Receiver<Option<Responses>>,
    ) -> Self {
        Self { id, status, completion }
    }

    /// Take the status view out, leaving the completion in place
    pub fn take_status(&mut self) -> Option<StatusWatch> {
        self.status.take()
    }

    /// Wait for the query to end
    ///
    /// Yields the collected responses, or None if the query was cancelled.
    pub async fn wait(self) -> Result<Option<Responses>, CanvassError> {
        self.completion.await.map_err(|_| CanvassError::ChannelClosed)
    }
}
