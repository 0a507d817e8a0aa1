//! Requestor-side query coordination
//!
//! A query asks a set of participants for input and completes once every
//! one of them has answered, or counts as done by absence while nobody is
//! watching progress.

mod coordinator;
mod store;
mod types;

pub use coordinator::{CoordinatorStats, QueryCoordinator};
pub use store::{Query, QueryStore};
pub use types::{
    Acknowledgement, PendingQuery, QueryOptions, QuerySnapshot, QueryStart, Responses, SubmitHook, UserStatus,
};
