//! In-process broadcast hub
//!
//! Uses a tokio broadcast channel to fan frames and presence changes out to
//! every connected link. A link never sees its own frames, and receives
//! nothing while its participant is disconnected.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::Transport;
use crate::directory::{Directory, Roster, UserId};
use crate::error::TransportError;

/// Default channel capacity (frames)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// An envelope together with the participant whose link sent it
#[derive(Debug, Clone)]
pub struct Frame {
    pub sender: UserId,
    pub body: Value,
}

/// Everything a peer can receive from the hub
#[derive(Debug, Clone)]
pub enum Inbound {
    Frame(Frame),
    Presence { user_id: UserId, connected: bool },
}

/// Shared broadcast channel plus the roster it keeps up to date
pub struct BroadcastHub {
    tx: broadcast::Sender<Inbound>,
    roster: Roster,
}

impl BroadcastHub {
    pub fn new(roster: Roster, capacity: usize) -> Self {
        debug!(capacity, "BroadcastHub::new: called");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, roster }
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Connect a participant and hand back its link
    pub fn connect(&self, user_id: &str) -> PeerLink {
        debug!(%user_id, "BroadcastHub::connect: called");
        let rx = self.tx.subscribe();
        self.set_presence(user_id, true);
        PeerLink {
            user_id: user_id.to_string(),
            rx,
            roster: self.roster.clone(),
            sender: LinkSender {
                user_id: user_id.to_string(),
                tx: self.tx.clone(),
                roster: self.roster.clone(),
                sent: Arc::new(AtomicU64::new(0)),
            },
        }
    }

    /// Mark a participant as gone; its link stops sending and receiving
    pub fn disconnect(&self, user_id: &str) {
        debug!(%user_id, "BroadcastHub::disconnect: called");
        self.set_presence(user_id, false);
    }

    /// Bring a previously connected participant back
    pub fn reconnect(&self, user_id: &str) {
        debug!(%user_id, "BroadcastHub::reconnect: called");
        self.set_presence(user_id, true);
    }

    fn set_presence(&self, user_id: &str, connected: bool) {
        self.roster.set_active(user_id, connected);
        // No subscribers is fine
        let _ = self.tx.send(Inbound::Presence {
            user_id: user_id.to_string(),
            connected,
        });
    }

    /// Number of links currently subscribed
    pub fn link_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

/// Cloneable sending half bound to one participant
#[derive(Clone)]
pub struct LinkSender {
    user_id: UserId,
    tx: broadcast::Sender<Inbound>,
    roster: Roster,
    sent: Arc<AtomicU64>,
}

impl LinkSender {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Frames handed to at least one receiver through this link and its clones
    pub fn sent_count(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl Transport for LinkSender {
    fn broadcast(&self, body: Value) -> Result<(), TransportError> {
        if !self.roster.is_active(&self.user_id) {
            return Err(TransportError::Disconnected(self.user_id.clone()));
        }
        debug!(user_id = %self.user_id, event = ?body.get("event"), "LinkSender::broadcast");
        let frame = Inbound::Frame(Frame {
            sender: self.user_id.clone(),
            body,
        });
        // Nobody listening is not an error on a best-effort channel, but nothing went out
        if self.tx.send(frame).is_ok() {
            self.sent.fetch_add(1, Ordering::Relaxed);
        } else {
            debug!(user_id = %self.user_id, "LinkSender::broadcast: no receivers");
        }
        Ok(())
    }
}

/// One participant's connection to the hub
pub struct PeerLink {
    user_id: UserId,
    rx: broadcast::Receiver<Inbound>,
    roster: Roster,
    sender: LinkSender,
}

impl PeerLink {
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn sender(&self) -> LinkSender {
        self.sender.clone()
    }

    /// Next inbound item meant for anyone but this link
    ///
    /// Returns None once the hub and every sender are gone.
    pub async fn recv(&mut self) -> Option<Inbound> {
        loop {
            match self.rx.recv().await {
                Ok(Inbound::Frame(frame)) => {
                    if frame.sender == self.user_id || !self.roster.is_active(&self.user_id) {
                        continue;
                    }
                    return Some(Inbound::Frame(frame));
                }
                Ok(Inbound::Presence { user_id, connected }) => {
                    if user_id == self.user_id {
                        continue;
                    }
                    return Some(Inbound::Presence { user_id, connected });
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(user_id = %self.user_id, skipped, "PeerLink::recv: lagged, frames dropped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
