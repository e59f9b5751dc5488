//! # Chat Tree Engine
//!
//! A conversation branching and versioning engine: messages form a forest
//! linked by parent ids, any past message can be edited into a new version,
//! every alternate branch stays alive, and the currently active linear
//! transcript is reconstructed deterministically for display and for
//! prompting the language model.
//!
//! ## Features
//!
//! - **Message forest**: parent/child links plus version groups for
//!   alternative takes on the same logical turn
//! - **Active-path resolution**: deterministic root-to-leaf walk with
//!   explicit per-group overrides and a "continue where the user last
//!   worked" default
//! - **Fork and regenerate**: append-only edits; old branches stay stored
//!   but unreachable from the active path
//! - **Branch navigation**: "version 2 of 3" sibling info and index-based
//!   branch switching
//! - **Transcript rendering**: role-tagged linear transcript for the
//!   provider call and the client view
//!
//! ## Architecture
//!
//! ```text
//! Client call → ChatEngine → TreeIndex → Resolver → Transcript
//!                    ↓                                  ↓
//!              SQLite (messages)              Gemini (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use chat_tree_engine::{ChatEngine, Config};
//! use chat_tree_engine::provider::GeminiClient;
//! use chat_tree_engine::storage::SqliteStorage;
//! use chat_tree_engine::tree::ActiveVersions;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let provider = GeminiClient::new(&config.provider, config.request.clone())?;
//!     let engine = ChatEngine::new(storage, provider, config.engine.clone());
//!
//!     let conversation = engine.create_conversation("user-1", "First chat").await?;
//!     let exchange = engine
//!         .send_message(&conversation.id, "user-1", "hi", &ActiveVersions::new())
//!         .await?;
//!     println!("{}", exchange.assistant_message.content);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management loaded from the environment.
pub mod config;
/// Conversation engine: append, fork, regenerate, navigate, view.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Prompt templates for replies and summaries.
pub mod prompts;
/// Generative-text provider abstraction and the Gemini client.
pub mod provider;
/// Storage layer for conversations and the message forest.
pub mod storage;
/// Transcript rendering of a resolved path.
pub mod transcript;
/// Tree index, active-path resolver, and branch navigation.
pub mod tree;

pub use config::Config;
pub use engine::{ChatEngine, ConversationView, Exchange, PendingReply};
pub use error::{AppError, AppResult};
