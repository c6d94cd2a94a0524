//! Wire types for the line-delimited JSON chat transport

use serde::{Deserialize, Serialize};

/// One incoming chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub chat_id: i64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    /// Placeholder shown while a long operation runs
    Working,
    /// Final text; replaces the chat's outstanding placeholder, if any
    Final,
}

/// One outgoing chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatReply {
    pub chat_id: i64,
    pub kind: ReplyKind,
    pub text: String,
}

impl ChatReply {
    #[inline]
    pub fn working(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            kind: ReplyKind::Working,
            text: text.into(),
        }
    }

    #[inline]
    pub fn final_text(chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            kind: ReplyKind::Final,
            text: text.into(),
        }
    }
}
