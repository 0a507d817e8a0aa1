//! Prompt renderer interface
//!
//! Turning inputs into an on-screen form is someone else's job. The presenter
//! only needs to show a prompt, raise it, take it down, and hear back once.

use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::protocol::{InputField, QueryId};

/// A prepared prompt, ready to show
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub id: QueryId,
    pub title: Option<String>,
    pub description: Option<String>,
    pub inputs: Vec<InputField>,
}

/// How a shown prompt ended
#[derive(Debug, Clone, PartialEq)]
pub enum PromptReply {
    /// Raw field values keyed by input key
    Submitted(Map<String, Value>),
    /// Closed without submitting
    Closed,
}

/// External form renderer
///
/// Dropping the reply sender without sending counts as `Closed`.
pub trait PromptRenderer: Send + Sync {
    /// Show a prompt; the receiver fires once when it is submitted or closed
    fn present(&self, prompt: Prompt) -> oneshot::Receiver<PromptReply>;

    /// Raise an already visible prompt
    fn bring_to_front(&self, id: &str);

    /// Take a prompt down; its reply must resolve or be dropped
    fn dismiss(&self, id: &str);
}
