//! Live query records

use std::collections::HashMap;

use tokio::sync::oneshot;
use tracing::debug;

use super::types::{QuerySnapshot, Responses, SubmitHook, UserStatus};
use crate::directory::{Directory, UserId};
use crate::protocol::{PromptConfig, QueryId, QueryRequest};
use crate::status::{StatusObserver, StatusSnapshot, UserProgress};

/// A query owned by the requestor
///
/// `status` always has exactly one entry per target; every mutation goes
/// through `set_status`, which refuses non-targets.
pub struct Query {
    pub id: QueryId,
    pub target_users: Vec<UserId>,
    /// Audience the caller named; None means everyone but the requestor
    pub addressed: Option<Vec<UserId>>,
    pub request: QueryRequest,
    pub config: PromptConfig,
    /// Distinguishes this query from earlier ones that used the same id
    pub generation: u64,
    status: HashMap<UserId, UserStatus>,
    pub responses: Responses,
    observer: Option<StatusObserver>,
    on_submit: Option<SubmitHook>,
    resolve: oneshot::Sender<Option<Responses>>,
}

impl Query {
    pub fn new(
        id: QueryId,
        target_users: Vec<UserId>,
        addressed: Option<Vec<UserId>>,
        request: QueryRequest,
        config: PromptConfig,
        directory: &dyn Directory,
        resolve: oneshot::Sender<Option<Responses>>,
    ) -> Self {
        let status = target_users
            .iter()
            .map(|user| {
                let status = if directory.is_active(user) {
                    UserStatus::Waiting
                } else {
                    UserStatus::Disconnected
                };
                (user.clone(), status)
            })
            .collect();

        Self {
            id,
            target_users,
            addressed,
            request,
            config,
            generation: 0,
            status,
            responses: Responses::new(),
            observer: None,
            on_submit: None,
            resolve,
        }
    }

    pub fn is_target(&self, user_id: &str) -> bool {
        self.status.contains_key(user_id)
    }

    pub fn status_of(&self, user_id: &str) -> Option<UserStatus> {
        self.status.get(user_id).copied()
    }

    /// Update a target's status; false for non-targets
    pub fn set_status(&mut self, user_id: &str, status: UserStatus) -> bool {
        match self.status.get_mut(user_id) {
            Some(current) => {
                debug!(query_id = %self.id, %user_id, from = %current, to = %status, "Query::set_status");
                *current = status;
                true
            }
            None => false,
        }
    }

    pub fn is_observed(&self) -> bool {
        self.observer.is_some()
    }

    pub fn attach_observer(&mut self, observer: StatusObserver) {
        self.observer = Some(observer);
    }

    /// Close and drop the observer, if any
    pub fn detach_observer(&mut self, directory: &dyn Directory) -> bool {
        match self.observer.take() {
            Some(observer) => {
                observer.close(self.progress(directory));
                true
            }
            None => false,
        }
    }

    pub fn refresh_observer(&self, directory: &dyn Directory) {
        if let Some(observer) = &self.observer {
            observer.refresh(self.progress(directory));
        }
    }

    pub fn set_hook(&mut self, hook: Option<SubmitHook>) {
        self.on_submit = hook;
    }

    pub fn hook_mut(&mut self) -> Option<&mut SubmitHook> {
        self.on_submit.as_mut()
    }

    /// Whether every target counts as finished under the current observer state
    pub fn is_settled(&self) -> bool {
        let observed = self.is_observed();
        self.target_users
            .iter()
            .filter(|user| self.status.get(*user).is_some_and(|s| s.counts_as_finished(observed)))
            .count()
            == self.target_users.len()
    }

    /// Status keys and targets are the same set
    pub fn invariant_holds(&self) -> bool {
        self.status.len() == self.target_users.len() && self.target_users.iter().all(|u| self.status.contains_key(u))
    }

    /// Build the status view rows in target order
    pub fn progress(&self, directory: &dyn Directory) -> StatusSnapshot {
        let users = self
            .target_users
            .iter()
            .filter_map(|user| {
                let status = self.status_of(user)?;
                Some(UserProgress {
                    user_id: user.clone(),
                    name: directory.display_name(user).unwrap_or_else(|| user.clone()),
                    active: directory.is_active(user),
                    status,
                    answers: self.responses.get(user).cloned(),
                })
            })
            .collect();

        StatusSnapshot {
            query_id: self.id.clone(),
            users,
            closed: false,
        }
    }

    pub fn snapshot(&self) -> QuerySnapshot {
        QuerySnapshot {
            id: self.id.clone(),
            target_users: self.target_users.clone(),
            status: self.status.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            responses: self.responses.clone(),
            config: self.config.clone(),
            observed: self.is_observed(),
        }
    }

    /// End the query, closing its observer and firing the completion
    ///
    /// Consumes the record, so a query can only ever complete once.
    pub fn complete(mut self, directory: &dyn Directory, outcome: Option<Responses>) {
        debug!(query_id = %self.id, resolved = outcome.is_some(), "Query::complete: called");
        self.detach_observer(directory);
        if self.resolve.send(outcome).is_err() {
            debug!(query_id = %self.id, "Query::complete: caller stopped waiting");
        }
    }
}

/// Live queries keyed by id
#[derive(Default)]
pub struct QueryStore {
    queries: HashMap<QueryId, Query>,
}

impl QueryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, query: Query) {
        self.queries.insert(query.id.clone(), query);
    }

    pub fn get(&self, id: &str) -> Option<&Query> {
        self.queries.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Query> {
        self.queries.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Query> {
        self.queries.remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.queries.contains_key(id)
    }

    /// Ids of live queries that target `user_id`
    pub fn targeting(&self, user_id: &str) -> Vec<QueryId> {
        self.queries
            .values()
            .filter(|q| q.is_target(user_id))
            .map(|q| q.id.clone())
            .collect()
    }

    pub fn ids(&self) -> Vec<QueryId> {
        self.queries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}
