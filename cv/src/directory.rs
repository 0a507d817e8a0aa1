//! Participant directory
//!
//! Identity and connection state for everyone who can take part in a query.
//! The coordinator only reads it; the transport hub flips connection state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Participant identifier
pub type UserId = String;

/// Read-only view of the participant directory
pub trait Directory: Send + Sync {
    /// Every known participant, connected or not, in a stable order
    fn users(&self) -> Vec<UserId>;

    /// Whether the participant is currently connected
    fn is_active(&self, user_id: &str) -> bool;

    /// Participants allowed to see every acknowledgement
    fn privileged_users(&self) -> Vec<UserId>;

    /// Human-readable name, if known
    fn display_name(&self, user_id: &str) -> Option<String>;
}

/// A known participant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    pub name: String,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub active: bool,
}

impl Participant {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            privileged: false,
            active: false,
        }
    }

    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }
}

/// In-memory directory shared between the hub and every peer in a process
#[derive(Clone, Default)]
pub struct Roster {
    participants: Arc<RwLock<Vec<Participant>>>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from plain ids; nobody is connected yet
    pub fn with_users<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let roster = Self::new();
        for id in ids {
            roster.add(Participant::new(id));
        }
        roster
    }

    /// Add or replace a participant
    pub fn add(&self, participant: Participant) {
        debug!(user_id = %participant.id, "Roster::add: called");
        if let Ok(mut participants) = self.participants.write() {
            match participants.iter_mut().find(|p| p.id == participant.id) {
                Some(existing) => *existing = participant,
                None => participants.push(participant),
            }
        }
    }

    /// Record a connection change, adding unknown participants on first connect
    pub fn set_active(&self, user_id: &str, active: bool) {
        debug!(%user_id, active, "Roster::set_active: called");
        if let Ok(mut participants) = self.participants.write() {
            match participants.iter_mut().find(|p| p.id == user_id) {
                Some(existing) => existing.active = active,
                None => {
                    let mut participant = Participant::new(user_id);
                    participant.active = active;
                    participants.push(participant);
                }
            }
        }
    }

    pub fn get(&self, user_id: &str) -> Option<Participant> {
        self.participants
            .read()
            .ok()?
            .iter()
            .find(|p| p.id == user_id)
            .cloned()
    }

    /// Connection state of every participant
    pub fn presence(&self) -> HashMap<UserId, bool> {
        self.participants
            .read()
            .map(|participants| participants.iter().map(|p| (p.id.clone(), p.active)).collect())
            .unwrap_or_default()
    }
}

impl Directory for Roster {
    fn users(&self) -> Vec<UserId> {
        self.participants
            .read()
            .map(|participants| participants.iter().map(|p| p.id.clone()).collect())
            .unwrap_or_default()
    }

    fn is_active(&self, user_id: &str) -> bool {
        self.get(user_id).is_some_and(|p| p.active)
    }

    fn privileged_users(&self) -> Vec<UserId> {
        self.participants
            .read()
            .map(|participants| {
                participants
                    .iter()
                    .filter(|p| p.privileged)
                    .map(|p| p.id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn display_name(&self, user_id: &str) -> Option<String> {
        self.get(user_id).map(|p| p.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_users_starts_disconnected() {
        let roster = Roster::with_users(["gm", "alice", "bob"]);
        assert_eq!(roster.users(), vec!["gm", "alice", "bob"]);
        assert!(!roster.is_active("alice"));
    }

    #[test]
    fn test_set_active_adds_unknown() {
        let roster = Roster::new();
        roster.set_active("carol", true);
        assert!(roster.is_active("carol"));
        assert_eq!(roster.display_name("carol").as_deref(), Some("carol"));

        roster.set_active("carol", false);
        assert!(!roster.is_active("carol"));
        assert_eq!(roster.users().len(), 1);
    }

    #[test]
    fn test_privileged_users() {
        let roster = Roster::new();
        roster.add(Participant::new("gm").privileged());
        roster.add(Participant::new("alice"));
        assert_eq!(roster.privileged_users(), vec!["gm"]);
    }

    #[test]
    fn test_add_replaces_existing() {
        let roster = Roster::with_users(["alice"]);
        let mut renamed = Participant::new("alice");
        renamed.name = "Alice".to_string();
        roster.add(renamed);
        assert_eq!(roster.users().len(), 1);
        assert_eq!(roster.display_name("alice").as_deref(), Some("Alice"));
    }
}
