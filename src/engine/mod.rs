//! The conversation engine: append, fork, regenerate, navigate, render.
//!
//! Every operation is request-scoped: load the conversation's messages,
//! rebuild the [`TreeIndex`], compute in memory, persist new rows. Nothing
//! holds forest state between calls, so conversations never share mutable
//! state and concurrent edits are linearized by the store alone.

mod view;

pub use view::{build_view, BranchNavigation, ConversationView, MessageView, TreeNodeView};

use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{AppResult, StorageError, TreeError};
use crate::prompts;
use crate::provider::{TextGenerator, TextStream};
use crate::storage::{Conversation, Message, NewMessage, Role, Storage};
use crate::transcript::{render, TranscriptOptions};
use crate::tree::{self, ActiveVersions, Resolution, SiblingInfo, TreeIndex};

/// A user turn and the assistant reply produced for it.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Exchange {
    /// The appended user message.
    pub user_message: Message,
    /// The assistant reply appended under it.
    pub assistant_message: Message,
}

/// A streaming reply in progress.
///
/// The placeholder assistant row is already committed, so the tree stays
/// structurally valid even if the stream is dropped mid-way; pass the
/// accumulated text to [`ChatEngine::complete_reply`] when the stream ends.
pub struct PendingReply {
    /// The appended user message.
    pub user_message: Message,
    /// The committed placeholder row for the reply (empty content).
    pub assistant_message: Message,
    /// Text chunks as the provider produces them.
    pub chunks: TextStream,
}

/// Conversation engine over a message store and a text provider.
pub struct ChatEngine<S, G> {
    storage: S,
    generator: G,
    config: EngineConfig,
    transcript_options: TranscriptOptions,
}

impl<S: Storage, G: TextGenerator> ChatEngine<S, G> {
    /// Create an engine with default transcript labels.
    pub fn new(storage: S, generator: G, config: EngineConfig) -> Self {
        Self {
            storage,
            generator,
            config,
            transcript_options: TranscriptOptions::default(),
        }
    }

    /// Override the transcript labels and system-message policy.
    pub fn with_transcript_options(mut self, options: TranscriptOptions) -> Self {
        self.transcript_options = options;
        self
    }

    /// The underlying store.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Create a new conversation owned by `user_id`.
    pub async fn create_conversation(
        &self,
        user_id: &str,
        title: &str,
    ) -> AppResult<Conversation> {
        let conversation = Conversation::new(user_id, title);
        self.storage.create_conversation(&conversation).await?;
        info!(conversation = %conversation.id, "Created conversation");
        Ok(conversation)
    }

    /// Fetch a conversation by id.
    pub async fn conversation(&self, conversation_id: &str) -> AppResult<Conversation> {
        Ok(self
            .storage
            .get_conversation(conversation_id)
            .await?
            .ok_or(StorageError::ConversationNotFound {
                conversation_id: conversation_id.to_string(),
            })?)
    }

    /// Build the tree index over a conversation's current messages.
    pub async fn tree_index(&self, conversation_id: &str) -> AppResult<TreeIndex> {
        let messages = self.storage.list_messages(conversation_id).await?;
        Ok(TreeIndex::build(&messages))
    }

    /// Resolve the active path for a conversation.
    pub async fn active_path(
        &self,
        conversation_id: &str,
        overrides: &ActiveVersions,
    ) -> AppResult<Resolution> {
        let index = self.tree_index(conversation_id).await?;
        Ok(tree::resolve(&index, overrides, self.config.root_policy))
    }

    /// Full client payload: active path, fork-point navigation, tree.
    pub async fn view(
        &self,
        conversation_id: &str,
        overrides: &ActiveVersions,
    ) -> AppResult<ConversationView> {
        let index = self.tree_index(conversation_id).await?;
        let resolution = tree::resolve(&index, overrides, self.config.root_policy);
        Ok(build_view(&index, &resolution))
    }

    /// Render the active path as a plain-text transcript.
    pub async fn transcript(
        &self,
        conversation_id: &str,
        overrides: &ActiveVersions,
    ) -> AppResult<String> {
        let resolution = self.active_path(conversation_id, overrides).await?;
        Ok(render(&resolution.path, &self.transcript_options))
    }

    /// Append a user message at the active-path leaf and produce the
    /// assistant reply under it.
    pub async fn send_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        content: &str,
        overrides: &ActiveVersions,
    ) -> AppResult<Exchange> {
        let (conversation, user_message, mut path, prompt) = self
            .append_user_turn(conversation_id, user_id, content, overrides)
            .await?;

        let reply = self.generator.complete(&prompt).await?;
        let assistant_message = self
            .storage
            .insert_message(
                &NewMessage::new(conversation_id, user_id, Role::Assistant, reply)
                    .with_parent(user_message.id.clone()),
            )
            .await?;

        self.storage.touch_conversation(conversation_id).await?;
        path.push(assistant_message.clone());
        self.maybe_refresh_summary(&conversation.id, &path).await;

        debug!(
            conversation = conversation_id,
            user_message = %user_message.id,
            assistant_message = %assistant_message.id,
            "Appended exchange"
        );

        Ok(Exchange {
            user_message,
            assistant_message,
        })
    }

    /// Streaming variant of [`send_message`](Self::send_message): commits the
    /// user message and an empty assistant placeholder, then returns the
    /// provider's chunk stream for the caller to drain.
    pub async fn send_message_stream(
        &self,
        conversation_id: &str,
        user_id: &str,
        content: &str,
        overrides: &ActiveVersions,
    ) -> AppResult<PendingReply> {
        let (_, user_message, _, prompt) = self
            .append_user_turn(conversation_id, user_id, content, overrides)
            .await?;

        // Placeholder first: the reply's slot in the tree is committed before
        // the first chunk arrives.
        let assistant_message = self
            .storage
            .insert_message(
                &NewMessage::new(conversation_id, user_id, Role::Assistant, "")
                    .with_parent(user_message.id.clone()),
            )
            .await?;
        self.storage.touch_conversation(conversation_id).await?;

        let chunks = self.generator.stream(&prompt).await?;
        debug!(
            conversation = conversation_id,
            assistant_message = %assistant_message.id,
            "Streaming reply started"
        );

        Ok(PendingReply {
            user_message,
            assistant_message,
            chunks,
        })
    }

    /// Finalize a streamed reply with its accumulated text.
    pub async fn complete_reply(
        &self,
        conversation_id: &str,
        assistant_message_id: &str,
        content: &str,
    ) -> AppResult<Message> {
        let message = self
            .storage
            .complete_message(assistant_message_id, content)
            .await?;
        self.storage.touch_conversation(conversation_id).await?;

        let index = self.tree_index(conversation_id).await?;
        if let Ok(resolution) =
            tree::resolve_through(&index, &ActiveVersions::new(), assistant_message_id)
        {
            self.maybe_refresh_summary(conversation_id, &resolution.path)
                .await;
        }

        Ok(message)
    }

    /// Fork a message: insert a new version sharing the target's parent and
    /// version group. The fork becomes the active version on the next
    /// resolve; the old version's descendants stay stored but unreachable
    /// from the active path.
    pub async fn fork_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        target_id: &str,
        new_content: &str,
        new_role: Option<Role>,
    ) -> AppResult<Message> {
        validate_content(new_content)?;
        let target = self.owned_message(conversation_id, user_id, target_id).await?;

        let payload = NewMessage {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role: new_role.unwrap_or(target.role),
            content: new_content.to_string(),
            parent_id: target.parent_id.clone(),
            previous_id: Some(target.id.clone()),
            version_group_id: Some(target.version_group().to_string()),
        };
        let forked = self.insert_version(payload).await?;
        self.storage.touch_conversation(conversation_id).await?;

        info!(
            conversation = conversation_id,
            target = target_id,
            fork = %forked.id,
            version = forked.version_number,
            "Forked message"
        );
        Ok(forked)
    }

    /// Regenerate an assistant message: a fork whose content the provider
    /// produces again from the transcript up to the target's parent.
    pub async fn regenerate(
        &self,
        conversation_id: &str,
        user_id: &str,
        target_id: &str,
    ) -> AppResult<Message> {
        let target = self.owned_message(conversation_id, user_id, target_id).await?;
        if target.role != Role::Assistant {
            return Err(TreeError::Validation {
                field: "target_id".to_string(),
                reason: "only assistant messages can be regenerated".to_string(),
            }
            .into());
        }

        let conversation = self.owned_conversation(conversation_id, user_id).await?;
        let index = self.tree_index(conversation_id).await?;

        // Context is the chain above the reply, not the whole active path.
        let transcript = match &target.parent_id {
            Some(parent_id) => {
                let (chain, _) = tree::chain_to_root(&index, parent_id);
                let path: Vec<Message> = chain
                    .iter()
                    .filter_map(|id| index.get(id).cloned())
                    .collect();
                render(&path, &self.transcript_options)
            }
            None => String::new(),
        };
        let prompt = prompts::chat_prompt(conversation.summary.as_deref(), &transcript);
        let reply = self.generator.complete(&prompt).await?;

        let payload = NewMessage {
            conversation_id: conversation_id.to_string(),
            user_id: user_id.to_string(),
            role: Role::Assistant,
            content: reply,
            parent_id: target.parent_id.clone(),
            previous_id: Some(target.id.clone()),
            version_group_id: Some(target.version_group().to_string()),
        };
        let regenerated = self.insert_version(payload).await?;
        self.storage.touch_conversation(conversation_id).await?;

        info!(
            conversation = conversation_id,
            target = target_id,
            regenerated = %regenerated.id,
            version = regenerated.version_number,
            "Regenerated assistant message"
        );
        Ok(regenerated)
    }

    /// Position of a message among its siblings.
    pub async fn sibling_info(
        &self,
        conversation_id: &str,
        message_id: &str,
    ) -> AppResult<SiblingInfo> {
        let index = self.tree_index(conversation_id).await?;
        Ok(tree::sibling_info(&index, message_id)?)
    }

    /// Record an active-version override and rebuild the path through the
    /// selected message. Returns the caller's new navigation state.
    pub async fn switch_to_version(
        &self,
        conversation_id: &str,
        overrides: &ActiveVersions,
        group_id: &str,
        message_id: &str,
    ) -> AppResult<(ActiveVersions, Resolution)> {
        let index = self.tree_index(conversation_id).await?;
        let updated = tree::switch_to_version(&index, overrides, group_id, message_id)?;
        let resolution = tree::resolve_through(&index, &updated, message_id)?;
        Ok((updated, resolution))
    }

    /// Switch the active path to descend through the parent's nth child.
    /// Returns the caller's updated navigation state along with the rebuilt
    /// path, so the switch holds on later resolves.
    pub async fn switch_branch(
        &self,
        conversation_id: &str,
        overrides: &ActiveVersions,
        parent_id: &str,
        branch_index: usize,
    ) -> AppResult<(ActiveVersions, Resolution)> {
        let index = self.tree_index(conversation_id).await?;
        Ok(tree::switch_to_branch_by_index(
            &index,
            overrides,
            parent_id,
            branch_index,
        )?)
    }

    // Shared first half of send_message / send_message_stream: validate,
    // resolve, append the user turn, build the prompt.
    async fn append_user_turn(
        &self,
        conversation_id: &str,
        user_id: &str,
        content: &str,
        overrides: &ActiveVersions,
    ) -> AppResult<(Conversation, Message, Vec<Message>, String)> {
        validate_content(content)?;
        let conversation = self.owned_conversation(conversation_id, user_id).await?;

        let index = self.tree_index(conversation_id).await?;
        let resolution = tree::resolve(&index, overrides, self.config.root_policy);

        let mut payload = NewMessage::new(conversation_id, user_id, Role::User, content);
        if let Some(leaf) = resolution.leaf() {
            payload = payload.with_parent(leaf.id.clone());
        }
        let user_message = self.storage.insert_message(&payload).await?;

        let mut path = resolution.path;
        path.push(user_message.clone());
        let transcript = render(&path, &self.transcript_options);
        let prompt = prompts::chat_prompt(conversation.summary.as_deref(), &transcript);

        Ok((conversation, user_message, path, prompt))
    }

    async fn owned_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
    ) -> AppResult<Conversation> {
        let conversation = self.conversation(conversation_id).await?;
        if conversation.user_id != user_id {
            return Err(TreeError::Forbidden {
                message_id: conversation_id.to_string(),
            }
            .into());
        }
        Ok(conversation)
    }

    async fn owned_message(
        &self,
        conversation_id: &str,
        user_id: &str,
        message_id: &str,
    ) -> AppResult<Message> {
        let message = self
            .storage
            .get_message(message_id)
            .await?
            .ok_or(TreeError::NotFound {
                message_id: message_id.to_string(),
            })?;
        if message.conversation_id != conversation_id || message.user_id != user_id {
            return Err(TreeError::Forbidden {
                message_id: message_id.to_string(),
            }
            .into());
        }
        Ok(message)
    }

    // Version-slot races lose to the unique index; re-read-and-retry once
    // before surfacing a conflict.
    async fn insert_version(&self, payload: NewMessage) -> AppResult<Message> {
        match self.storage.insert_message(&payload).await {
            Ok(message) => Ok(message),
            Err(StorageError::VersionConflict { group_id }) => {
                warn!(group = %group_id, "Version slot taken, retrying insert");
                match self.storage.insert_message(&payload).await {
                    Ok(message) => Ok(message),
                    Err(StorageError::VersionConflict { group_id }) => {
                        Err(TreeError::Conflict { group_id }.into())
                    }
                    Err(e) => Err(e.into()),
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    // Refresh the rolling summary every N messages. Failures are logged and
    // swallowed: the summary is an optimization, not part of the operation.
    async fn maybe_refresh_summary(&self, conversation_id: &str, path: &[Message]) {
        if self.config.summary_every == 0 {
            return;
        }
        let count = match self.storage.count_messages(conversation_id).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Skipping summary refresh, count failed");
                return;
            }
        };
        if count == 0 || count % self.config.summary_every != 0 {
            return;
        }

        let transcript = render(path, &self.transcript_options);
        match self
            .generator
            .complete(&prompts::summary_prompt(&transcript))
            .await
        {
            Ok(summary) => match self.storage.update_summary(conversation_id, &summary).await {
                Ok(()) => info!(conversation = conversation_id, "Refreshed summary"),
                Err(e) => warn!(error = %e, "Failed to store refreshed summary"),
            },
            Err(e) => warn!(error = %e, "Summary refresh failed"),
        }
    }
}

fn validate_content(content: &str) -> Result<(), TreeError> {
    if content.trim().is_empty() {
        return Err(TreeError::Validation {
            field: "content".to_string(),
            reason: "cannot be empty".to_string(),
        });
    }
    Ok(())
}
