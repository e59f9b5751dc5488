//! Storage layer for the message forest.
//!
//! This module defines the durable records (conversations and messages with
//! parent/version linkage) and the transactional [`Storage`] trait the engine
//! runs against. Message history is append-only: edits and regenerations
//! always insert a new row, the single exception being the completion of a
//! streaming assistant message.

mod sqlite;

pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;

/// Author role of a message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Message written by the end user.
    #[default]
    User,
    /// Message produced by the generative-text provider.
    Assistant,
    /// System preamble / instruction message.
    System,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            "system" => Ok(Role::System),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// A single message in a conversation's forest.
///
/// `parent_id` is the conversational predecessor (None marks a root);
/// `previous_id` is fork lineage, pointing at the pre-edit version this
/// message was forked from. All alternative versions of one logical turn
/// share a version group, identified by [`Message::version_group`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier, immutable after creation.
    pub id: String,
    /// Owning conversation (forest partition key).
    pub conversation_id: String,
    /// Author/owner for authorization checks.
    pub user_id: String,
    /// Author role.
    pub role: Role,
    /// Text payload. Never overwritten except when a streaming assistant
    /// message is completed.
    pub content: String,
    /// Conversational predecessor; None for roots.
    pub parent_id: Option<String>,
    /// Fork lineage: the message this one was forked from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_id: Option<String>,
    /// Version group shared by all alternatives of the same logical turn.
    /// None on legacy rows, meaning the message's own id is the group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version_group_id: Option<String>,
    /// 1-based version number, unique and contiguous within the group.
    pub version_number: i64,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
    /// When the message was last updated (streaming completion only).
    pub updated_at: DateTime<Utc>,
}

impl Message {
    /// Effective version group: the stored group id, or the message's own id
    /// when it is the first (or only) member of its group.
    pub fn version_group(&self) -> &str {
        self.version_group_id.as_deref().unwrap_or(&self.id)
    }
}

/// Insert payload for a new message. The store assigns id, version number,
/// and timestamps.
#[derive(Debug, Clone)]
pub struct NewMessage {
    /// Owning conversation.
    pub conversation_id: String,
    /// Author/owner.
    pub user_id: String,
    /// Author role.
    pub role: Role,
    /// Text payload.
    pub content: String,
    /// Conversational predecessor.
    pub parent_id: Option<String>,
    /// Fork lineage (set only by fork/regenerate).
    pub previous_id: Option<String>,
    /// Version group to join. None starts a fresh group (version 1 with the
    /// new message's id as group).
    pub version_group_id: Option<String>,
}

impl NewMessage {
    /// Create an append payload (fresh version group, version 1).
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            parent_id: None,
            previous_id: None,
            version_group_id: None,
        }
    }

    /// Set the conversational parent.
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Join an existing version group (fork/regenerate).
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.version_group_id = Some(group_id.into());
        self
    }

    /// Record fork lineage.
    pub fn with_previous(mut self, previous_id: impl Into<String>) -> Self {
        self.previous_id = Some(previous_id.into());
        self
    }
}

/// A conversation grouping a message forest, with a denormalized rolling
/// summary used to bound prompt size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation identifier.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Human-readable title.
    pub title: String,
    /// Rolling summary of the conversation so far.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// When the summary was last refreshed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_updated_at: Option<DateTime<Utc>>,
    /// When the conversation was created.
    pub created_at: DateTime<Utc>,
    /// When the conversation last saw activity.
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    /// Create a new conversation
    pub fn new(user_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            summary: None,
            summary_updated_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Storage trait for message-forest persistence.
///
/// Implementations must assign ids and timestamps on insert and enforce
/// unique version numbers per group transactionally: the max-version read and
/// the insert happen in one transaction, and a lost race surfaces as
/// [`StorageError::VersionConflict`](crate::error::StorageError::VersionConflict).
#[async_trait]
pub trait Storage: Send + Sync {
    // Conversation operations

    /// Create a new conversation.
    async fn create_conversation(&self, conversation: &Conversation) -> StorageResult<()>;
    /// Get a conversation by ID.
    async fn get_conversation(&self, id: &str) -> StorageResult<Option<Conversation>>;
    /// Bump a conversation's activity timestamp.
    async fn touch_conversation(&self, id: &str) -> StorageResult<()>;
    /// Replace the rolling summary and its refresh timestamp.
    async fn update_summary(&self, id: &str, summary: &str) -> StorageResult<()>;
    /// Delete a conversation and (cascading) all its messages.
    async fn delete_conversation(&self, id: &str) -> StorageResult<()>;

    // Message operations

    /// List all messages in a conversation, ordered by creation time.
    async fn list_messages(&self, conversation_id: &str) -> StorageResult<Vec<Message>>;
    /// Get a message by ID.
    async fn get_message(&self, id: &str) -> StorageResult<Option<Message>>;
    /// Insert a message, assigning id, timestamps, and the next version
    /// number in its group.
    async fn insert_message(&self, message: &NewMessage) -> StorageResult<Message>;
    /// Finalize a streaming assistant message's content. The only operation
    /// that rewrites `content` (and bumps `updated_at`) in place.
    async fn complete_message(&self, id: &str, content: &str) -> StorageResult<Message>;
    /// Count messages in a conversation.
    async fn count_messages(&self, conversation_id: &str) -> StorageResult<u64>;
}
