//! Chat sessions and their question/answer history.
//!
//! A chat belongs to a politician. Chats with an owner are permanent; chats
//! without one are temporary and get purged after a retention window.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A chat session about one politician.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: i64,
    pub politician: String,
    #[serde(default)]
    pub position: String,
    /// Owner; `None` marks a temporary chat
    #[serde(default)]
    pub user_id: Option<i64>,
    /// Linked report id, when research was available at creation time
    #[serde(default)]
    pub research_report: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn is_temporary(&self) -> bool {
        self.user_id.is_none()
    }

    /// Whether `user_id` may read or modify this chat.
    ///
    /// Temporary chats are open to anyone holding their id; owned chats only
    /// to their owner.
    pub fn accessible_by(&self, user_id: Option<i64>) -> bool {
        match self.user_id {
            None => true,
            Some(owner) => user_id == Some(owner),
        }
    }
}

/// Fields needed to create a chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewChat {
    pub politician: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub research_report: Option<i64>,
}

/// One question and its generated answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionAnswer {
    pub id: i64,
    /// Owning chat id
    pub chat: i64,
    pub question: String,
    pub answer: String,
    pub created_at: DateTime<Utc>,
}
