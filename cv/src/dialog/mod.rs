//! Peer-local prompt presentation
//!
//! A `DialogPresenter` guarantees at most one visible prompt per query id on
//! this peer. Rendering is delegated to a `PromptRenderer`.

mod inputs;
mod presenter;
mod renderer;

pub use inputs::{CHECKED_ATTRIBUTE, VALUE_ATTRIBUTE, normalize_answers, prepare_inputs};
pub use presenter::{DialogEntry, DialogOutcome, DialogPresenter, PromptState};
pub use renderer::{Prompt, PromptRenderer, PromptReply};
