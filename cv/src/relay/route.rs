//! Addressing filter
//!
//! The transport delivers everything to everyone, so each peer decides on
//! its own which messages concern it. This is a pure function of the
//! message, its sender and the local participant.

use crate::directory::UserId;
use crate::protocol::Message;

/// Whether a message should be handled locally
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Deliver,
    Skip,
}

pub fn route(message: &Message, sender: &str, me: &str) -> Route {
    let deliver = match message {
        Message::Prompt(p) => audience_includes(p.users.as_deref(), sender, me),
        Message::Cancel(p) => audience_includes(p.users.as_deref(), sender, me),
        // Only the owner holds the query; everyone else's coordinator ignores it
        Message::Submit(_) => sender != me,
        Message::Notify(p) => p.user_id == me,
    };

    if deliver { Route::Deliver } else { Route::Skip }
}

/// An explicit list names its audience; no list means all but the sender
pub fn audience_includes(users: Option<&[UserId]>, sender: &str, me: &str) -> bool {
    match users {
        Some(users) => users.iter().any(|user| user == me),
        None => sender != me,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{CancelPayload, NotifyPayload, PromptConfig, PromptPayload, QueryRequest, SubmitPayload};

    fn prompt(users: Option<Vec<&str>>) -> Message {
        Message::Prompt(PromptPayload {
            id: "q-1".to_string(),
            users: users.map(|u| u.into_iter().map(String::from).collect()),
            request: QueryRequest::default(),
            config: PromptConfig::default(),
        })
    }

    #[test]
    fn test_prompt_without_users_reaches_all_but_sender() {
        let msg = prompt(None);
        assert_eq!(route(&msg, "gm", "alice"), Route::Deliver);
        assert_eq!(route(&msg, "gm", "gm"), Route::Skip);
    }

    #[test]
    fn test_prompt_with_users_reaches_only_listed() {
        let msg = prompt(Some(vec!["alice"]));
        assert_eq!(route(&msg, "gm", "alice"), Route::Deliver);
        assert_eq!(route(&msg, "gm", "bob"), Route::Skip);

        let nobody = prompt(Some(vec![]));
        assert_eq!(route(&nobody, "gm", "alice"), Route::Skip);
    }

    #[test]
    fn test_cancel_follows_prompt_rules() {
        let msg = Message::Cancel(CancelPayload {
            id: "q-1".to_string(),
            users: Some(vec!["bob".to_string()]),
        });
        assert_eq!(route(&msg, "gm", "bob"), Route::Deliver);
        assert_eq!(route(&msg, "gm", "alice"), Route::Skip);

        let broad = Message::Cancel(CancelPayload {
            id: "q-1".to_string(),
            users: None,
        });
        assert_eq!(route(&broad, "gm", "alice"), Route::Deliver);
    }

    #[test]
    fn test_submit_goes_to_every_other_coordinator() {
        let msg = Message::Submit(SubmitPayload {
            id: "q-1".to_string(),
            answers: None,
        });
        assert_eq!(route(&msg, "alice", "gm"), Route::Deliver);
        assert_eq!(route(&msg, "alice", "bob"), Route::Deliver);
        assert_eq!(route(&msg, "alice", "alice"), Route::Skip);
    }

    #[test]
    fn test_notify_only_for_named_user() {
        let msg = Message::Notify(NotifyPayload {
            id: "q-1".to_string(),
            user_id: "alice".to_string(),
            content: "Rolls: 3".to_string(),
            include_privileged: false,
        });
        assert_eq!(route(&msg, "gm", "alice"), Route::Deliver);
        assert_eq!(route(&msg, "gm", "bob"), Route::Skip);
    }
}
