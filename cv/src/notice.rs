//! User-visible notifications
//!
//! Errors that must be shown to the local user and acknowledgements that are
//! whispered to specific recipients both leave the protocol through a
//! `NotificationSink`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::directory::UserId;
use crate::protocol::QueryId;

/// Header shown above query acknowledgements
pub const NOTICE_HEADER: &str = "Data Query Notification";

/// An acknowledgement delivered to a fixed set of recipients
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notice {
    pub query_id: QueryId,
    pub header: String,
    pub content: String,
    pub recipients: Vec<UserId>,
    pub sent_at: DateTime<Utc>,
}

impl Notice {
    pub fn new(query_id: impl Into<String>, content: impl Into<String>, recipients: Vec<UserId>) -> Self {
        Self {
            query_id: query_id.into(),
            header: NOTICE_HEADER.to_string(),
            content: content.into(),
            recipients,
            sent_at: Utc::now(),
        }
    }
}

/// Where user-facing output goes
pub trait NotificationSink: Send + Sync {
    /// Show an error to the local user
    fn error(&self, message: &str);

    /// Deliver an acknowledgement privately to its recipients
    fn whisper(&self, notice: Notice);
}

/// Sink that only writes to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn error(&self, message: &str) {
        error!(%message, "notification");
    }

    fn whisper(&self, notice: Notice) {
        info!(
            query_id = %notice.query_id,
            recipients = ?notice.recipients,
            content = %notice.content,
            "{}", notice.header
        );
    }
}
