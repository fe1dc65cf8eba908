//! Support chats between a user and staff, and per-course group chats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PortalError, Result};
use crate::models::RemoteModel;

// == Support Chat ==
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Sender uid, or "admin"
    pub from: String,
    #[serde(default)]
    pub name: String,
    pub text: String,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

impl RemoteModel for Chat {}

/// A message before it is stamped.
#[derive(Debug, Clone, Deserialize)]
pub struct NewChatMessage {
    pub from: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub text: String,
}

impl NewChatMessage {
    pub fn new(from: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            name: name.into(),
            text: text.into(),
        }
    }

    pub fn stamp(self, time: DateTime<Utc>) -> Result<ChatMessage> {
        if self.text.trim().is_empty() {
            return Err(PortalError::InvalidRequest(
                "Message text is required".to_string(),
            ));
        }
        Ok(ChatMessage {
            from: self.from,
            name: self.name,
            text: self.text,
            time,
        })
    }
}

/// A chat joined with its owner, as listed for staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSummary {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub user_email: String,
    pub messages: Vec<ChatMessage>,
}

impl ChatSummary {
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }
}

// == Group Chat ==
/// Sender name used when a group message carries none.
pub const ANONYMOUS: &str = "Anonymous";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A group message as submitted; missing fields are filled in on stamping.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewGroupMessage {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewGroupMessage {
    pub fn stamp(self, now: DateTime<Utc>) -> Result<GroupMessage> {
        if self.text.trim().is_empty() {
            return Err(PortalError::InvalidRequest(
                "Message text is required".to_string(),
            ));
        }
        Ok(GroupMessage {
            email: self.email,
            name: self
                .name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| ANONYMOUS.to_string()),
            text: self.text,
            created_at: self.created_at.unwrap_or(now),
        })
    }
}

/// One course's group chat, all messages in a single document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupChat {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<GroupMessage>,
}

impl RemoteModel for GroupChat {}
