use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;
use uuid::Uuid;

use super::{Conversation, Message, NewMessage, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory storage instance (tests and the CLI dry-run path)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .foreign_keys(true);

        // A single connection keeps the in-memory database alive and shared.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to open in-memory database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Map a unique-index violation on the version slot to a conflict the engine
/// can retry; pass everything else through.
fn map_insert_error(e: sqlx::Error, group_id: Option<&str>) -> StorageError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_unique_violation() {
            return StorageError::VersionConflict {
                group_id: group_id.unwrap_or("<none>").to_string(),
            };
        }
    }
    StorageError::Sqlx(e)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn create_conversation(&self, conversation: &Conversation) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO conversations (id, user_id, title, summary, summary_updated_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&conversation.id)
        .bind(&conversation.user_id)
        .bind(&conversation.title)
        .bind(&conversation.summary)
        .bind(conversation.summary_updated_at.map(|t| t.to_rfc3339()))
        .bind(conversation.created_at.to_rfc3339())
        .bind(conversation.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_conversation(&self, id: &str) -> StorageResult<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, title, summary, summary_updated_at, created_at, updated_at
            FROM conversations
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn touch_conversation(&self, id: &str) -> StorageResult<()> {
        let result = sqlx::query("UPDATE conversations SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ConversationNotFound {
                conversation_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn update_summary(&self, id: &str, summary: &str) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            r#"
            UPDATE conversations
            SET summary = ?, summary_updated_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(summary)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ConversationNotFound {
                conversation_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn delete_conversation(&self, id: &str) -> StorageResult<()> {
        sqlx::query("DELETE FROM conversations WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn list_messages(&self, conversation_id: &str) -> StorageResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, user_id, role, content, parent_id, previous_id,
                   version_group_id, version_number, created_at, updated_at
            FROM messages
            WHERE conversation_id = ?
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into()).collect())
    }

    async fn get_message(&self, id: &str) -> StorageResult<Option<Message>> {
        let row: Option<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, user_id, role, content, parent_id, previous_id,
                   version_group_id, version_number, created_at, updated_at
            FROM messages
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }

    async fn insert_message(&self, message: &NewMessage) -> StorageResult<Message> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let mut tx = self.pool.begin().await?;

        // The max-version read and the insert share one transaction; the
        // unique index on (version_group_id, version_number) catches any
        // writer that read the same max concurrently.
        let version_number = match &message.version_group_id {
            Some(group_id) => {
                let max: Option<i64> = sqlx::query_scalar(
                    "SELECT MAX(version_number) FROM messages WHERE version_group_id = ?",
                )
                .bind(group_id)
                .fetch_one(&mut *tx)
                .await?;
                max.unwrap_or(0) + 1
            }
            None => 1,
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, user_id, role, content, parent_id,
                                  previous_id, version_group_id, version_number, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&message.conversation_id)
        .bind(&message.user_id)
        .bind(message.role.to_string())
        .bind(&message.content)
        .bind(&message.parent_id)
        .bind(&message.previous_id)
        .bind(&message.version_group_id)
        .bind(version_number)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_insert_error(e, message.version_group_id.as_deref()))?;

        tx.commit().await?;

        Ok(Message {
            id,
            conversation_id: message.conversation_id.clone(),
            user_id: message.user_id.clone(),
            role: message.role,
            content: message.content.clone(),
            parent_id: message.parent_id.clone(),
            previous_id: message.previous_id.clone(),
            version_group_id: message.version_group_id.clone(),
            version_number,
            created_at: now,
            updated_at: now,
        })
    }

    async fn complete_message(&self, id: &str, content: &str) -> StorageResult<Message> {
        let result = sqlx::query("UPDATE messages SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(Utc::now().to_rfc3339())
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::MessageNotFound {
                message_id: id.to_string(),
            });
        }

        self.get_message(id)
            .await?
            .ok_or_else(|| StorageError::MessageNotFound {
                message_id: id.to_string(),
            })
    }

    async fn count_messages(&self, conversation_id: &str) -> StorageResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE conversation_id = ?")
                .bind(conversation_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }
}

// Internal row types for SQLx mapping

#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: String,
    user_id: String,
    title: String,
    summary: Option<String>,
    summary_updated_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            summary: row.summary,
            summary_updated_at: row.summary_updated_at.as_deref().map(parse_timestamp),
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

#[derive(sqlx::FromRow)]
struct MessageRow {
    id: String,
    conversation_id: String,
    user_id: String,
    role: String,
    content: String,
    parent_id: Option<String>,
    previous_id: Option<String>,
    version_group_id: Option<String>,
    version_number: i64,
    created_at: String,
    updated_at: String,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Self {
            id: row.id,
            conversation_id: row.conversation_id,
            user_id: row.user_id,
            role: row.role.parse().unwrap_or_default(),
            content: row.content,
            parent_id: row.parent_id,
            previous_id: row.previous_id,
            version_group_id: row.version_group_id,
            version_number: row.version_number,
            created_at: parse_timestamp(&row.created_at),
            updated_at: parse_timestamp(&row.updated_at),
        }
    }
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
