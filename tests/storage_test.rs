//! Integration tests for the SQLite storage layer
//!
//! Tests conversation and message persistence, version-number assignment,
//! and the unique version-slot constraint using an in-memory database.

use chat_tree_engine::storage::{Conversation, NewMessage, Role, SqliteStorage, Storage};
use chat_tree_engine::error::StorageError;

/// Create an in-memory storage instance for testing
async fn create_test_storage() -> SqliteStorage {
    SqliteStorage::new_in_memory()
        .await
        .expect("Failed to create in-memory storage")
}

async fn create_test_conversation(storage: &SqliteStorage) -> Conversation {
    let conversation = Conversation::new("u-1", "Test chat");
    storage
        .create_conversation(&conversation)
        .await
        .expect("Failed to create conversation");
    conversation
}

#[cfg(test)]
mod conversation_tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_conversation() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        let retrieved = storage.get_conversation(&conversation.id).await.unwrap();
        assert!(retrieved.is_some(), "Conversation should exist");
        let retrieved = retrieved.unwrap();
        assert_eq!(retrieved.id, conversation.id);
        assert_eq!(retrieved.user_id, "u-1");
        assert_eq!(retrieved.title, "Test chat");
        assert!(retrieved.summary.is_none());
    }

    #[tokio::test]
    async fn test_get_nonexistent_conversation() {
        let storage = create_test_storage().await;
        let result = storage.get_conversation("nonexistent").await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_touch_conversation_bumps_updated_at() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        storage.touch_conversation(&conversation.id).await.unwrap();
        let retrieved = storage
            .get_conversation(&conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert!(retrieved.updated_at >= conversation.updated_at);
    }

    #[tokio::test]
    async fn test_touch_missing_conversation_fails() {
        let storage = create_test_storage().await;
        let err = storage.touch_conversation("nope").await.unwrap_err();
        assert!(matches!(err, StorageError::ConversationNotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_summary() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        storage
            .update_summary(&conversation.id, "The user plans a trip.")
            .await
            .unwrap();

        let retrieved = storage
            .get_conversation(&conversation.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(retrieved.summary.as_deref(), Some("The user plans a trip."));
        assert!(retrieved.summary_updated_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_conversation_cascades_to_messages() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        storage
            .insert_message(&NewMessage::new(&conversation.id, "u-1", Role::User, "hi"))
            .await
            .unwrap();
        assert_eq!(storage.count_messages(&conversation.id).await.unwrap(), 1);

        storage.delete_conversation(&conversation.id).await.unwrap();
        assert!(storage
            .get_conversation(&conversation.id)
            .await
            .unwrap()
            .is_none());
        assert_eq!(storage.count_messages(&conversation.id).await.unwrap(), 0);
    }
}

#[cfg(test)]
mod message_tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_assigns_id_and_version_one() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        let message = storage
            .insert_message(&NewMessage::new(&conversation.id, "u-1", Role::User, "hi"))
            .await
            .unwrap();

        assert!(!message.id.is_empty());
        assert_eq!(message.version_number, 1);
        assert!(message.version_group_id.is_none());
        assert_eq!(message.version_group(), message.id);
    }

    #[tokio::test]
    async fn test_fork_versions_are_contiguous() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        let original = storage
            .insert_message(&NewMessage::new(&conversation.id, "u-1", Role::User, "hi"))
            .await
            .unwrap();

        let v2 = storage
            .insert_message(
                &NewMessage::new(&conversation.id, "u-1", Role::User, "hi there")
                    .with_group(original.id.clone())
                    .with_previous(original.id.clone()),
            )
            .await
            .unwrap();
        let v3 = storage
            .insert_message(
                &NewMessage::new(&conversation.id, "u-1", Role::User, "hello")
                    .with_group(original.id.clone())
                    .with_previous(v2.id.clone()),
            )
            .await
            .unwrap();

        assert_eq!(v2.version_number, 2);
        assert_eq!(v3.version_number, 3);
        assert_eq!(v2.version_group(), original.id);
        assert_eq!(v3.previous_id.as_deref(), Some(v2.id.as_str()));
    }

    #[tokio::test]
    async fn test_duplicate_version_slot_is_rejected() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        // Simulate two writers that both computed version 2 by inserting a
        // row with the slot already taken.
        let original = storage
            .insert_message(&NewMessage::new(&conversation.id, "u-1", Role::User, "hi"))
            .await
            .unwrap();
        storage
            .insert_message(
                &NewMessage::new(&conversation.id, "u-1", Role::User, "first fork")
                    .with_group(original.id.clone()),
            )
            .await
            .unwrap();

        let raced = sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, user_id, role, content, parent_id,
                                  previous_id, version_group_id, version_number, created_at, updated_at)
            VALUES ('race', ?, 'u-1', 'user', 'second fork', NULL, NULL, ?, 2,
                    '2026-01-01T00:00:00Z', '2026-01-01T00:00:00Z')
            "#,
        )
        .bind(&conversation.id)
        .bind(&original.id)
        .execute(storage.pool())
        .await;

        assert!(raced.is_err(), "Duplicate version slot must not commit");
    }

    #[tokio::test]
    async fn test_list_messages_in_creation_order() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        let first = storage
            .insert_message(&NewMessage::new(&conversation.id, "u-1", Role::User, "one"))
            .await
            .unwrap();
        let second = storage
            .insert_message(
                &NewMessage::new(&conversation.id, "u-1", Role::Assistant, "two")
                    .with_parent(first.id.clone()),
            )
            .await
            .unwrap();

        let messages = storage.list_messages(&conversation.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].id, first.id);
        assert_eq!(messages[1].id, second.id);
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].parent_id.as_deref(), Some(first.id.as_str()));
    }

    #[tokio::test]
    async fn test_messages_isolated_per_conversation() {
        let storage = create_test_storage().await;
        let conversation_a = create_test_conversation(&storage).await;
        let conversation_b = Conversation::new("u-2", "Other chat");
        storage.create_conversation(&conversation_b).await.unwrap();

        storage
            .insert_message(&NewMessage::new(&conversation_a.id, "u-1", Role::User, "a"))
            .await
            .unwrap();
        storage
            .insert_message(&NewMessage::new(&conversation_b.id, "u-2", Role::User, "b"))
            .await
            .unwrap();

        let messages_a = storage.list_messages(&conversation_a.id).await.unwrap();
        let messages_b = storage.list_messages(&conversation_b.id).await.unwrap();
        assert_eq!(messages_a.len(), 1);
        assert_eq!(messages_b.len(), 1);
        assert_eq!(messages_a[0].content, "a");
        assert_eq!(messages_b[0].content, "b");
    }

    #[tokio::test]
    async fn test_complete_message_rewrites_content_once() {
        let storage = create_test_storage().await;
        let conversation = create_test_conversation(&storage).await;

        let placeholder = storage
            .insert_message(&NewMessage::new(
                &conversation.id,
                "u-1",
                Role::Assistant,
                "",
            ))
            .await
            .unwrap();

        let completed = storage
            .complete_message(&placeholder.id, "full reply text")
            .await
            .unwrap();
        assert_eq!(completed.content, "full reply text");
        assert!(completed.updated_at >= placeholder.updated_at);

        let err = storage
            .complete_message("missing", "text")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::MessageNotFound { .. }));
    }
}

#[cfg(test)]
mod file_backed_tests {
    use super::*;

    #[tokio::test]
    async fn test_file_backed_storage_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = chat_tree_engine::config::DatabaseConfig {
            path: dir.path().join("chats.db"),
            max_connections: 2,
        };

        let conversation = {
            let storage = SqliteStorage::new(&config).await.unwrap();
            let conversation = create_test_conversation(&storage).await;
            storage
                .insert_message(&NewMessage::new(&conversation.id, "u-1", Role::User, "hi"))
                .await
                .unwrap();
            conversation
        };

        let reopened = SqliteStorage::new(&config).await.unwrap();
        let retrieved = reopened.get_conversation(&conversation.id).await.unwrap();
        assert!(retrieved.is_some(), "Data should survive a reopen");
        assert_eq!(reopened.count_messages(&conversation.id).await.unwrap(), 1);
    }
}
