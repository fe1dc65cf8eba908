//! Support chats and per-course group chats.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use super::collections::{CHATS, GROUP_CHATS, USERS};
use super::{Portal, ReadMode};
use crate::cache::types;
use crate::error::{PortalError, Result};
use crate::models::{
    Chat, ChatMessage, ChatSummary, GroupChat, GroupMessage, NewChatMessage, NewGroupMessage,
    User,
};
use crate::remote::{to_document, ArrayUpdate, Snapshot, Subscription, WriteMode};

const UNKNOWN_USER: &str = "Unknown User";

impl Portal {
    // == Support Chats ==
    /// Returns the user's chat id, creating the chat and linking it to the
    /// user record when the user has none or it no longer exists.
    pub async fn create_or_get_user_chat(&self, uid: &str, email: &str, name: &str) -> Result<String> {
        if uid.trim().is_empty() {
            return Err(PortalError::InvalidRequest("User id is required".to_string()));
        }

        let existing = self
            .remote
            .get_document(USERS, uid)
            .await?
            .and_then(|snapshot| snapshot.decode::<User>().ok())
            .and_then(|user| user.chat_id);
        if let Some(chat_id) = existing {
            if self.remote.get_document(CHATS, &chat_id).await?.is_some() {
                return Ok(chat_id);
            }
            warn!(uid, chat_id = %chat_id, "linked chat missing, creating a new one");
        }

        let mut chat = Map::new();
        chat.insert("userId".to_string(), json!(uid));
        chat.insert("messages".to_string(), json!([]));
        let chat_id = self.remote.create_document(CHATS, chat).await?;

        let mut link = Map::new();
        link.insert("name".to_string(), json!(name));
        link.insert("email".to_string(), json!(email));
        link.insert("chatId".to_string(), json!(chat_id));
        self.remote.set_document(USERS, uid, link, WriteMode::Merge).await?;

        info!(uid, chat_id = %chat_id, "support chat created");
        self.user_changed(uid).await;
        self.layered.invalidate(types::CHATS, None).await;
        Ok(chat_id)
    }

    /// Appends a stamped message to an existing chat.
    pub async fn add_message_to_chat(&self, chat_id: &str, message: NewChatMessage) -> Result<ChatMessage> {
        let message = message.stamp(Utc::now())?;
        if self.remote.get_document(CHATS, chat_id).await?.is_none() {
            return Err(PortalError::NotFound(format!("{}/{}", CHATS, chat_id)));
        }

        let value = serde_json::to_value(&message)?;
        self.remote
            .update_array_field(CHATS, chat_id, "messages", ArrayUpdate::Union(vec![value]))
            .await?;
        debug!(chat_id, "chat message added");
        self.layered.invalidate(types::CHATS, None).await;
        Ok(message)
    }

    /// Messages of one chat; a missing chat has none.
    pub async fn get_chat_messages(&self, chat_id: &str) -> Result<Vec<ChatMessage>> {
        match self.remote.get_document(CHATS, chat_id).await? {
            Some(snapshot) => Ok(snapshot.decode::<Chat>()?.messages),
            None => Ok(Vec::new()),
        }
    }

    /// Every chat joined with its owner, most recently active first.
    /// Chats without messages sort last.
    pub async fn get_all_chats(&self, mode: ReadMode) -> Result<Vec<ChatSummary>> {
        if mode == ReadMode::Cached {
            if let Some(chats) = self.layered.get_as::<Vec<ChatSummary>>(types::CHATS, None).await {
                debug!(count = chats.len(), "chats served from layered cache");
                return Ok(chats);
            }
        }

        let mut summaries = Vec::new();
        for snapshot in self.remote.list_documents(CHATS).await? {
            let id = snapshot.id.clone();
            let chat = match snapshot.decode::<Chat>() {
                Ok(chat) => chat,
                Err(err) => {
                    warn!(chat_id = %id, error = %err, "skipping undecodable chat");
                    continue;
                }
            };
            let owner = self.chat_owner(&chat.user_id).await;
            summaries.push(ChatSummary {
                id: chat.id,
                user_name: owner
                    .as_ref()
                    .map(|u| u.display_name.clone())
                    .filter(|name| !name.is_empty())
                    .unwrap_or_else(|| UNKNOWN_USER.to_string()),
                user_email: owner.map(|u| u.email).unwrap_or_default(),
                user_id: chat.user_id,
                messages: chat.messages,
            });
        }
        summaries.sort_by(by_latest_activity);

        self.layered.set_as(types::CHATS, &summaries, None).await;
        Ok(summaries)
    }

    async fn chat_owner(&self, uid: &str) -> Option<User> {
        if uid.is_empty() {
            return None;
        }
        match self.get_user(uid, ReadMode::Cached).await {
            Ok(user) => Some(user),
            Err(PortalError::NotFound(_)) => None,
            Err(err) => {
                warn!(uid, error = %err, "chat owner lookup failed");
                None
            }
        }
    }

    // == Group Chats ==
    /// Creates an empty group chat, optionally bound to a course.
    pub async fn create_group_chat(&self, course_id: Option<&str>) -> Result<String> {
        let chat = GroupChat {
            id: String::new(),
            course_id: course_id.map(str::to_string),
            created_at: Some(Utc::now()),
            messages: Vec::new(),
        };
        let mut doc = to_document(&chat)?;
        doc.remove("id");
        let gc_id = self.remote.create_document(GROUP_CHATS, doc).await?;
        info!(gc_id = %gc_id, course_id, "group chat created");
        Ok(gc_id)
    }

    /// The group chat of `course_id`, created when the course has none.
    pub async fn ensure_group_chat(&self, course_id: &str) -> Result<String> {
        let existing = self
            .remote
            .list_documents(GROUP_CHATS)
            .await?
            .into_iter()
            .find(|snapshot| snapshot.data.get("courseId").and_then(Value::as_str) == Some(course_id));
        match existing {
            Some(snapshot) => Ok(snapshot.id),
            None => self.create_group_chat(Some(course_id)).await,
        }
    }

    /// Appends a message to a group chat, creating the chat document if needed.
    pub async fn send_group_message(&self, gc_id: &str, message: NewGroupMessage) -> Result<GroupMessage> {
        if gc_id.trim().is_empty() {
            return Err(PortalError::InvalidRequest("Group chat id is required".to_string()));
        }
        let message = message.stamp(Utc::now())?;

        let value = serde_json::to_value(&message)?;
        self.remote
            .update_array_field(GROUP_CHATS, gc_id, "messages", ArrayUpdate::Union(vec![value]))
            .await?;

        let mut touched = Map::new();
        touched.insert("lastUpdated".to_string(), json!(Utc::now()));
        self.remote
            .set_document(GROUP_CHATS, gc_id, touched, WriteMode::Merge)
            .await?;
        debug!(gc_id, "group message sent");
        Ok(message)
    }

    /// Calls `on_messages` with the chat's full message list now and after
    /// every change. A missing chat reports no messages.
    pub fn subscribe_group_messages<F>(&self, gc_id: &str, on_messages: F) -> Result<Subscription>
    where
        F: Fn(Vec<GroupMessage>) + Send + Sync + 'static,
    {
        if gc_id.trim().is_empty() {
            return Err(PortalError::InvalidRequest("Group chat id is required".to_string()));
        }
        let subscription = self.remote.subscribe(
            GROUP_CHATS,
            Some(gc_id),
            Arc::new(move |snapshots: Vec<Snapshot>| {
                let messages = snapshots
                    .into_iter()
                    .next()
                    .and_then(|snapshot| snapshot.decode::<GroupChat>().ok())
                    .map(|chat| chat.messages)
                    .unwrap_or_default();
                on_messages(messages);
            }),
        )?;
        Ok(subscription)
    }
}

fn by_latest_activity(a: &ChatSummary, b: &ChatSummary) -> Ordering {
    match (a.last_message(), b.last_message()) {
        (Some(a), Some(b)) => b.time.cmp(&a.time),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
