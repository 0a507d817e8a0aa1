//! QueryCoordinator - requestor-side authority over the queries it created
//!
//! The coordinator is a plain state machine. It never awaits; the owning
//! `Peer` actor feeds it local calls, submissions and presence changes one
//! at a time.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::store::{Query, QueryStore};
use super::types::{Acknowledgement, PendingQuery, QueryOptions, QuerySnapshot, QueryStart, UserStatus};
use crate::directory::{Directory, UserId};
use crate::error::CanvassError;
use crate::protocol::{CancelPayload, Message, NotifyPayload, PromptConfig, PromptPayload, QueryId, QueryRequest};
use crate::status::{ObserverRequest, StatusObserver};
use crate::transport::Transport;

/// Lifetime counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoordinatorStats {
    pub resolved: u64,
    pub cancelled: u64,
    pub expired: u64,
}

/// How a query is being closed from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Closing {
    Cancel,
    Finish,
    Expire,
}

pub struct QueryCoordinator {
    user_id: UserId,
    transport: Arc<dyn Transport>,
    directory: Arc<dyn Directory>,
    observer_tx: mpsc::UnboundedSender<ObserverRequest>,
    default_show_status: bool,
    default_config: PromptConfig,
    queries: QueryStore,
    next_generation: u64,
    stats: CoordinatorStats,
}

impl QueryCoordinator {
    pub fn new(
        user_id: impl Into<String>,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn Directory>,
        observer_tx: mpsc::UnboundedSender<ObserverRequest>,
    ) -> Self {
        let user_id = user_id.into();
        debug!(%user_id, "QueryCoordinator::new: called");
        Self {
            user_id,
            transport,
            directory,
            observer_tx,
            default_show_status: false,
            default_config: PromptConfig::default(),
            queries: QueryStore::new(),
            next_generation: 0,
            stats: CoordinatorStats::default(),
        }
    }

    /// Defaults used when a caller leaves `show_status` or `config` unset
    pub fn with_defaults(mut self, show_status: bool, config: PromptConfig) -> Self {
        self.default_show_status = show_status;
        self.default_config = config;
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Start a query, or re-send the prompt of a live one with the same id
    pub fn query(&mut self, request: QueryRequest, options: QueryOptions) -> Result<QueryStart, CanvassError> {
        let id = request
            .query_id()
            .map(str::to_string)
            .ok_or_else(|| CanvassError::Validation("A request ID must be provided".to_string()))?;
        debug!(%id, users = ?options.users, "QueryCoordinator::query: called");

        if let Some(query) = self.queries.get(&id) {
            info!(%id, "Query already live, re-sending prompt");
            let message = Message::Prompt(PromptPayload {
                id: id.clone(),
                users: query.addressed.clone(),
                request: query.request.clone(),
                config: query.config.clone(),
            });
            query.refresh_observer(self.directory.as_ref());
            self.send(&message);
            return Ok(QueryStart::Reprompted);
        }

        let addressed = options.users.map(|users| self.clean_targets(users));
        let target_users = match &addressed {
            Some(users) => users.clone(),
            None => self
                .directory
                .users()
                .into_iter()
                .filter(|user| *user != self.user_id)
                .collect(),
        };
        let config = options.config.unwrap_or_else(|| self.default_config.clone());
        let show_status = options.show_status.unwrap_or(self.default_show_status);

        let mut request = request;
        request.id = Some(id.clone());

        let (resolve, completion) = oneshot::channel();
        let mut query = Query::new(
            id.clone(),
            target_users,
            addressed.clone(),
            request.clone(),
            config.clone(),
            self.directory.as_ref(),
            resolve,
        );
        query.set_hook(options.on_submit);
        self.next_generation += 1;
        query.generation = self.next_generation;

        let status = if show_status {
            let (observer, watch) = StatusObserver::new(query.progress(self.directory.as_ref()), self.observer_tx.clone());
            query.attach_observer(observer);
            Some(watch)
        } else {
            None
        };

        info!(%id, targets = ?query.target_users, observed = show_status, "Query started");
        self.queries.insert(query);

        self.send(&Message::Prompt(PromptPayload {
            id: id.clone(),
            users: addressed,
            request,
            config,
        }));

        // Nobody left to wait for: an empty or fully absent audience
        self.maybe_resolve(&id);

        Ok(QueryStart::Pending(PendingQuery::new(id, status, completion)))
    }

    /// Dedupe an explicit target list and drop the requestor from it
    fn clean_targets(&self, users: Vec<UserId>) -> Vec<UserId> {
        let mut seen = HashSet::new();
        users
            .into_iter()
            .filter(|user| {
                if *user == self.user_id {
                    warn!(user_id = %user, "Requestor cannot target itself, skipping");
                    return false;
                }
                seen.insert(user.clone())
            })
            .collect()
    }

    /// Prompt some targets again, resetting them to waiting
    ///
    /// Returns false when the query is gone or none of `users` are targets.
    pub fn requery(&mut self, id: &str, users: &[UserId]) -> bool {
        debug!(%id, ?users, "QueryCoordinator::requery: called");
        let Some(query) = self.queries.get_mut(id) else {
            debug!(%id, "QueryCoordinator::requery: no live query");
            return false;
        };

        let mut subset: Vec<UserId> = Vec::new();
        for user in users {
            if !query.is_target(user) {
                debug!(%id, user_id = %user, "QueryCoordinator::requery: not a target, skipping");
                continue;
            }
            if !subset.contains(user) {
                subset.push(user.clone());
            }
        }
        if subset.is_empty() {
            return false;
        }

        for user in &subset {
            query.set_status(user, UserStatus::Waiting);
        }
        query.refresh_observer(self.directory.as_ref());

        let message = Message::Prompt(PromptPayload {
            id: id.to_string(),
            users: Some(subset),
            request: query.request.clone(),
            config: query.config.clone(),
        });
        self.send(&message);
        true
    }

    /// Record a `submit` from `user_id`
    pub fn add_response(&mut self, id: &str, user_id: &str, answers: Option<Value>) {
        debug!(%id, %user_id, answered = answers.is_some(), "QueryCoordinator::add_response: called");
        let Some(query) = self.queries.get_mut(id) else {
            debug!(%id, "QueryCoordinator::add_response: not ours or already closed");
            return;
        };
        if !query.is_target(user_id) {
            debug!(%id, %user_id, "QueryCoordinator::add_response: not a target, ignoring");
            return;
        }

        let Some(answers) = answers else {
            query.set_status(user_id, UserStatus::Unprompted);
            self.maybe_resolve(id);
            return;
        };

        if query.status_of(user_id) == Some(UserStatus::Finished) {
            debug!(%id, %user_id, "QueryCoordinator::add_response: duplicate submit, ignoring");
            return;
        }

        query.responses.insert(user_id.to_string(), answers.clone());
        query.set_status(user_id, UserStatus::Finished);
        let acknowledgement = query.hook_mut().and_then(|hook| hook(id, user_id, &answers));

        if let Some(Acknowledgement {
            content,
            include_privileged,
        }) = acknowledgement
            && let Err(e) = self.notify(id, user_id, &content, include_privileged)
        {
            warn!(%id, %user_id, error = %e, "Failed to send acknowledgement");
        }

        self.maybe_resolve(id);
    }

    /// Resolve the query if every target counts as finished
    ///
    /// Returns true when the query resolved.
    pub fn maybe_resolve(&mut self, id: &str) -> bool {
        let Some(query) = self.queries.get(id) else {
            return false;
        };
        if !query.is_settled() {
            query.refresh_observer(self.directory.as_ref());
            return false;
        }

        let Some(query) = self.queries.remove(id) else {
            return false;
        };
        info!(%id, responses = query.responses.len(), "Query resolved");
        let responses = query.responses.clone();
        query.complete(self.directory.as_ref(), Some(responses));
        self.stats.resolved += 1;
        true
    }

    /// Abandon a query; the caller sees None
    pub fn cancel(&mut self, id: &str) -> bool {
        self.close(id, Closing::Cancel)
    }

    /// End a query early with whatever answers have arrived
    pub fn finish(&mut self, id: &str) -> bool {
        self.close(id, Closing::Finish)
    }

    /// Time limit of the query started as `generation` reached; behaves like `finish`
    ///
    /// A later query reusing the id has a different generation and is left alone.
    pub fn expire(&mut self, id: &str, generation: u64) -> bool {
        if self.generation(id) != Some(generation) {
            debug!(%id, generation, "QueryCoordinator::expire: stale timer");
            return false;
        }
        self.close(id, Closing::Expire)
    }

    fn close(&mut self, id: &str, closing: Closing) -> bool {
        debug!(%id, ?closing, "QueryCoordinator::close: called");
        let Some(query) = self.queries.remove(id) else {
            debug!(%id, "QueryCoordinator::close: no live query");
            return false;
        };

        let targets = query.target_users.clone();
        let outcome = match closing {
            Closing::Cancel => {
                self.stats.cancelled += 1;
                None
            }
            Closing::Finish => {
                self.stats.resolved += 1;
                Some(query.responses.clone())
            }
            Closing::Expire => {
                self.stats.expired += 1;
                Some(query.responses.clone())
            }
        };
        info!(%id, ?closing, "Query closed");
        query.complete(self.directory.as_ref(), outcome);

        self.send(&Message::Cancel(CancelPayload {
            id: id.to_string(),
            users: Some(targets),
        }));
        true
    }

    /// A participant connected or disconnected
    pub fn user_activity(&mut self, user_id: &str, connected: bool) {
        debug!(%user_id, connected, "QueryCoordinator::user_activity: called");
        let next = if connected {
            UserStatus::Waiting
        } else {
            UserStatus::Disconnected
        };

        for id in self.queries.targeting(user_id) {
            if let Some(query) = self.queries.get_mut(&id)
                && query.status_of(user_id) != Some(UserStatus::Finished)
            {
                query.set_status(user_id, next);
            }
            self.maybe_resolve(&id);
        }
    }

    /// The status view for `id` was closed by the requestor
    pub fn observer_dismissed(&mut self, id: &str) {
        debug!(%id, "QueryCoordinator::observer_dismissed: called");
        if let Some(query) = self.queries.get_mut(id) {
            query.detach_observer(self.directory.as_ref());
            self.maybe_resolve(id);
        }
    }

    pub fn handle_observer(&mut self, request: ObserverRequest) {
        match request {
            ObserverRequest::Requery { id, user_id } => {
                self.requery(&id, &[user_id]);
            }
            ObserverRequest::Dismissed { id } => self.observer_dismissed(&id),
        }
    }

    /// Send an acknowledgement to a responder
    pub fn notify(&self, id: &str, user_id: &str, content: &str, include_privileged: bool) -> Result<(), CanvassError> {
        debug!(%id, %user_id, include_privileged, "QueryCoordinator::notify: called");
        if id.is_empty() {
            return Err(CanvassError::Validation("A request ID must be provided".to_string()));
        }
        self.broadcast(&Message::Notify(NotifyPayload {
            id: id.to_string(),
            user_id: user_id.to_string(),
            content: content.to_string(),
            include_privileged,
        }))
    }

    pub fn has(&self, id: &str) -> bool {
        self.queries.contains(id)
    }

    /// Generation of the live query with this id
    pub fn generation(&self, id: &str) -> Option<u64> {
        self.queries.get(id).map(|query| query.generation)
    }

    pub fn get(&self, id: &str) -> Option<QuerySnapshot> {
        self.queries.get(id).map(Query::snapshot)
    }

    pub fn ids(&self) -> Vec<QueryId> {
        self.queries.ids()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn stats(&self) -> CoordinatorStats {
        self.stats
    }

    fn broadcast(&self, message: &Message) -> Result<(), CanvassError> {
        let body = message.encode()?;
        self.transport.broadcast(body)?;
        Ok(())
    }

    /// Broadcast where a failure only needs logging
    fn send(&self, message: &Message) {
        if let Err(e) = self.broadcast(message) {
            warn!(event = message.event(), id = message.id(), error = %e, "Failed to broadcast");
        }
    }
}
