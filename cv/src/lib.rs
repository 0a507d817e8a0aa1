//! Canvass - ask-and-collect query coordination
//!
//! One participant (the requestor) asks a set of others for structured
//! input over a broadcast-only channel. Each responder is shown at most one
//! prompt per query, answers or declines, and the requestor resolves the
//! query once everybody it targeted has answered or dropped out.
//!
//! # Core Concepts
//!
//! - **Broadcast only**: Every frame reaches every peer; addressing is done by
//!   each receiver through [`relay::route`]
//! - **One actor per peer**: A [`peer::Peer`] owns its coordinator and relay;
//!   everything else talks to it through a [`peer::PeerHandle`]
//! - **Resolve once**: A query's completion is consumed when it resolves, so a
//!   second resolution cannot happen
//!
//! # Modules
//!
//! - [`protocol`] - Wire envelope and payloads
//! - [`transport`] - Broadcast transport and in-process hub
//! - [`query`] - Requestor-side coordination
//! - [`dialog`] - Responder-side prompt presentation
//! - [`relay`] - Inbound dispatch
//! - [`status`] - Live progress view
//! - [`peer`] - Per-process runtime
//! - [`sim`] - Scripted sessions
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod dialog;
pub mod directory;
pub mod error;
pub mod notice;
pub mod peer;
pub mod protocol;
pub mod query;
pub mod relay;
pub mod sim;
pub mod status;
pub mod transport;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use dialog::{DialogOutcome, DialogPresenter, Prompt, PromptRenderer, PromptReply};
pub use directory::{Directory, Participant, Roster, UserId};
pub use error::{CanvassError, TransportError};
pub use notice::{Notice, NotificationSink, TracingSink};
pub use peer::{Peer, PeerHandle, PeerMetrics};
pub use protocol::{InputField, InputKind, Message, PromptConfig, QueryId, QueryRequest};
pub use query::{
    Acknowledgement, PendingQuery, QueryCoordinator, QueryOptions, QuerySnapshot, QueryStart, Responses, UserStatus,
};
pub use relay::{Dispatch, Relay};
pub use status::{StatusSnapshot, StatusWatch, UserProgress};
pub use transport::{BroadcastHub, PeerLink, Transport};
