// Conversation pairing rules, independent of storage
use serde::Serialize;
use thiserror::Error;

use crate::error::AppError;

pub const MAX_MESSAGE_LEN: usize = 2000;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Cannot start a conversation with yourself")]
    SelfConversation,

    #[error("Not a participant in this conversation")]
    NotParticipant,

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("Message cannot be empty")]
    EmptyMessage,

    #[error("Message must be {MAX_MESSAGE_LEN} characters or less")]
    MessageTooLong,

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<ChatError> for AppError {
    fn from(e: ChatError) -> Self {
        match e {
            ChatError::SelfConversation | ChatError::EmptyMessage | ChatError::MessageTooLong => {
                AppError::BadRequest(e.to_string())
            }
            ChatError::NotParticipant => AppError::Forbidden(e.to_string()),
            ChatError::NotFound(_) => AppError::NotFound,
            ChatError::Database(e) => AppError::Database(e),
            ChatError::Pool(e) => AppError::Pool(e),
        }
    }
}

/// The two members of a conversation, stored in sorted order so that
/// (a, b) and (b, a) name the same conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participants {
    low: String,
    high: String,
}

impl Participants {
    pub fn new(one: &str, other: &str) -> Result<Self, ChatError> {
        match one.cmp(other) {
            std::cmp::Ordering::Less => Ok(Self {
                low: one.to_string(),
                high: other.to_string(),
            }),
            std::cmp::Ordering::Greater => Ok(Self {
                low: other.to_string(),
                high: one.to_string(),
            }),
            std::cmp::Ordering::Equal => Err(ChatError::SelfConversation),
        }
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.low == user_id || self.high == user_id
    }

    /// The participant who is not `user_id`, if `user_id` is a participant.
    pub fn other(&self, user_id: &str) -> Option<&str> {
        if self.low == user_id {
            Some(&self.high)
        } else if self.high == user_id {
            Some(&self.low)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct Conversation {
    pub id: String,
    pub participants: Participants,
    pub listing_id: Option<String>,
}

/// Trim and bound message text.
pub fn normalize_text(text: &str) -> Result<String, ChatError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if text.chars().count() > MAX_MESSAGE_LEN {
        return Err(ChatError::MessageTooLong);
    }
    Ok(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn participants_are_order_independent() {
        let ab = Participants::new("a", "b").unwrap();
        let ba = Participants::new("b", "a").unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.low(), "a");
        assert_eq!(ab.high(), "b");
    }

    #[test]
    fn self_conversation_rejected() {
        assert!(matches!(
            Participants::new("a", "a"),
            Err(ChatError::SelfConversation)
        ));
    }

    #[test]
    fn other_participant() {
        let p = Participants::new("a", "b").unwrap();
        assert_eq!(p.other("a"), Some("b"));
        assert_eq!(p.other("b"), Some("a"));
        assert_eq!(p.other("c"), None);
        assert!(!p.contains("c"));
    }

    #[test]
    fn text_is_trimmed_and_bounded() {
        assert_eq!(normalize_text("  habari  ").unwrap(), "habari");
        assert!(matches!(normalize_text("   "), Err(ChatError::EmptyMessage)));
        assert!(matches!(
            normalize_text(&"x".repeat(MAX_MESSAGE_LEN + 1)),
            Err(ChatError::MessageTooLong)
        ));
    }

    #[test]
    fn errors_map_to_http_errors() {
        assert!(matches!(
            AppError::from(ChatError::NotParticipant),
            AppError::Forbidden(_)
        ));
        assert!(matches!(
            AppError::from(ChatError::NotFound("Conversation")),
            AppError::NotFound
        ));
        assert!(matches!(
            AppError::from(ChatError::EmptyMessage),
            AppError::BadRequest(_)
        ));
    }
}
