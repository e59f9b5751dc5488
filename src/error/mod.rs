use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Conversation not found: {conversation_id}")]
    ConversationNotFound { conversation_id: String },

    #[error("Message not found: {message_id}")]
    MessageNotFound { message_id: String },

    #[error("Version number conflict in group {group_id}")]
    VersionConflict { group_id: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Generative-text provider errors
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Provider unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Message-forest errors surfaced to callers of the engine and navigator.
///
/// These map one-to-one onto the user-actionable failure modes: a missing
/// target, an ownership mismatch, bad input, an out-of-range sibling index,
/// a version-number race, or corrupted tree data.
#[derive(Debug, Error)]
pub enum TreeError {
    #[error("Message not found: {message_id}")]
    NotFound { message_id: String },

    #[error("Access denied for message: {message_id}")]
    Forbidden { message_id: String },

    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Invalid branch index {index} (parent has {len} children)")]
    InvalidIndex { index: usize, len: usize },

    #[error("Concurrent edit conflict in version group {group_id}")]
    Conflict { group_id: String },

    #[error("Data integrity violation: {0}")]
    Integrity(IntegrityViolation),
}

/// A structural defect found while walking the message forest.
///
/// Integrity violations indicate corrupted data rather than user error. The
/// resolver records them on the [`Resolution`](crate::tree::Resolution) and
/// still returns the partial path built up to the point of detection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntegrityViolation {
    #[error("parent chain cycle at message {message_id}")]
    Cycle { message_id: String },

    #[error("message {message_id} references missing parent {parent_id}")]
    DanglingParent {
        message_id: String,
        parent_id: String,
    },
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Result type alias for tree operations
pub type TreeResult<T> = Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Connection {
            message: "failed to connect".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Database connection failed: failed to connect"
        );

        let err = StorageError::MessageNotFound {
            message_id: "msg-123".to_string(),
        };
        assert_eq!(err.to_string(), "Message not found: msg-123");

        let err = StorageError::VersionConflict {
            group_id: "group-7".to_string(),
        };
        assert_eq!(err.to_string(), "Version number conflict in group group-7");
    }

    #[test]
    fn test_tree_error_display() {
        let err = TreeError::NotFound {
            message_id: "m-1".to_string(),
        };
        assert_eq!(err.to_string(), "Message not found: m-1");

        let err = TreeError::Validation {
            field: "content".to_string(),
            reason: "cannot be empty".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Validation failed: content - cannot be empty"
        );

        let err = TreeError::InvalidIndex { index: 5, len: 2 };
        assert_eq!(
            err.to_string(),
            "Invalid branch index 5 (parent has 2 children)"
        );
    }

    #[test]
    fn test_integrity_violation_display() {
        let v = IntegrityViolation::Cycle {
            message_id: "m-9".to_string(),
        };
        assert_eq!(v.to_string(), "parent chain cycle at message m-9");

        let v = IntegrityViolation::DanglingParent {
            message_id: "m-2".to_string(),
            parent_id: "gone".to_string(),
        };
        assert_eq!(
            v.to_string(),
            "message m-2 references missing parent gone"
        );

        let err = TreeError::Integrity(v);
        assert!(err.to_string().contains("Data integrity violation"));
    }

    #[test]
    fn test_provider_error_display() {
        let err = ProviderError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(
            err.to_string(),
            "Provider unavailable: server down (retries: 3)"
        );

        let err = ProviderError::Api {
            status: 429,
            message: "quota exceeded".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 429 - quota exceeded");

        let err = ProviderError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_storage_error_conversion_to_app_error() {
        let storage_err = StorageError::ConversationNotFound {
            conversation_id: "conv-1".to_string(),
        };
        let app_err: AppError = storage_err.into();
        assert!(matches!(app_err, AppError::Storage(_)));
    }

    #[test]
    fn test_tree_error_conversion_to_app_error() {
        let tree_err = TreeError::Forbidden {
            message_id: "m-1".to_string(),
        };
        let app_err: AppError = tree_err.into();
        assert!(matches!(app_err, AppError::Tree(_)));
        assert!(app_err.to_string().contains("Access denied"));
    }

    #[test]
    fn test_provider_error_conversion_to_app_error() {
        let provider_err = ProviderError::Timeout { timeout_ms: 1000 };
        let app_err: AppError = provider_err.into();
        assert!(matches!(app_err, AppError::Provider(_)));
    }
}
