//! Rendering an active path as a plain-text transcript.
//!
//! The transcript is what gets sent to the provider as conversation context
//! and what a client can show as the linear view. Rendering is pure: same
//! path and options, same string, no side effects.

use std::collections::HashSet;

use crate::error::{TreeError, TreeResult};
use crate::storage::{Message, Role};
use crate::tree::{chain_to_root, next_child, ActiveVersions, TreeIndex};

/// How system-role messages appear in the transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SystemHandling {
    /// Leave system messages out entirely.
    #[default]
    Skip,
    /// Collect system messages into a preamble above the dialogue.
    Preamble,
}

/// Labels and system-message policy for transcript rendering.
#[derive(Debug, Clone)]
pub struct TranscriptOptions {
    /// Label for user turns.
    pub user_label: String,
    /// Label for assistant turns.
    pub assistant_label: String,
    /// System-message policy.
    pub system: SystemHandling,
}

impl Default for TranscriptOptions {
    fn default() -> Self {
        Self {
            user_label: "User".to_string(),
            assistant_label: "Assistant".to_string(),
            system: SystemHandling::Skip,
        }
    }
}

/// Render a resolved path as role-tagged lines, one message per line.
pub fn render(path: &[Message], options: &TranscriptOptions) -> String {
    let mut preamble = String::new();
    let mut body = String::new();
    for message in path {
        append_line(message, options, &mut preamble, &mut body);
    }
    join_sections(preamble, body)
}

/// Render the transcript passing through `via_id` straight from the index,
/// without materializing the path first. Output is identical to rendering the
/// corresponding resolution.
pub fn render_from(
    index: &TreeIndex,
    overrides: &ActiveVersions,
    via_id: &str,
    options: &TranscriptOptions,
) -> TreeResult<String> {
    if !index.contains(via_id) {
        return Err(TreeError::NotFound {
            message_id: via_id.to_string(),
        });
    }

    let (chain, _) = chain_to_root(index, via_id);
    let mut preamble = String::new();
    let mut body = String::new();
    let mut visited: HashSet<String> = chain.iter().cloned().collect();

    for id in &chain {
        if let Some(message) = index.get(id) {
            append_line(message, options, &mut preamble, &mut body);
        }
    }

    let prefer = HashSet::new();
    let mut current = chain.last().cloned();
    while let Some(cur) = current {
        let children = index.children(&cur);
        if children.is_empty() {
            break;
        }
        match next_child(index, overrides, &prefer, children, &visited) {
            Some(next) => {
                visited.insert(next.clone());
                if let Some(message) = index.get(&next) {
                    append_line(message, options, &mut preamble, &mut body);
                }
                current = Some(next);
            }
            None => break,
        }
    }

    Ok(join_sections(preamble, body))
}

fn append_line(
    message: &Message,
    options: &TranscriptOptions,
    preamble: &mut String,
    body: &mut String,
) {
    let label = match message.role {
        Role::System => {
            if options.system == SystemHandling::Preamble {
                if !preamble.is_empty() {
                    preamble.push('\n');
                }
                preamble.push_str(&message.content);
            }
            return;
        }
        Role::User => &options.user_label,
        Role::Assistant => &options.assistant_label,
    };
    if !body.is_empty() {
        body.push('\n');
    }
    body.push_str(label);
    body.push_str(": ");
    body.push_str(&message.content);
}

fn join_sections(preamble: String, body: String) -> String {
    match (preamble.is_empty(), body.is_empty()) {
        (true, _) => body,
        (_, true) => preamble,
        (false, false) => format!("{}\n\n{}", preamble, body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{resolve_through, RootPolicy};
    use chrono::{Duration, Utc};

    fn msg(id: &str, parent: Option<&str>, role: Role, content: &str, offset_s: i64) -> Message {
        let t = Utc::now() + Duration::seconds(offset_s);
        Message {
            id: id.to_string(),
            conversation_id: "c-1".to_string(),
            user_id: "u-1".to_string(),
            role,
            content: content.to_string(),
            parent_id: parent.map(|s| s.to_string()),
            previous_id: None,
            version_group_id: None,
            version_number: 1,
            created_at: t,
            updated_at: t,
        }
    }

    #[test]
    fn test_empty_path_renders_empty_string() {
        assert_eq!(render(&[], &TranscriptOptions::default()), "");
    }

    #[test]
    fn test_single_user_message() {
        let path = [msg("m1", None, Role::User, "hi", 0)];
        assert_eq!(render(&path, &TranscriptOptions::default()), "User: hi");
    }

    #[test]
    fn test_alternating_turns() {
        let path = [
            msg("m1", None, Role::User, "hi", 0),
            msg("m2", Some("m1"), Role::Assistant, "hello!", 10),
            msg("m3", Some("m2"), Role::User, "how are you?", 20),
        ];
        assert_eq!(
            render(&path, &TranscriptOptions::default()),
            "User: hi\nAssistant: hello!\nUser: how are you?"
        );
    }

    #[test]
    fn test_custom_labels() {
        let path = [
            msg("m1", None, Role::User, "hi", 0),
            msg("m2", Some("m1"), Role::Assistant, "hello", 10),
        ];
        let options = TranscriptOptions {
            user_label: "Human".to_string(),
            assistant_label: "Model".to_string(),
            system: SystemHandling::Skip,
        };
        assert_eq!(render(&path, &options), "Human: hi\nModel: hello");
    }

    #[test]
    fn test_system_messages_skipped_by_default() {
        let path = [
            msg("s", None, Role::System, "be terse", 0),
            msg("m1", Some("s"), Role::User, "hi", 10),
        ];
        assert_eq!(render(&path, &TranscriptOptions::default()), "User: hi");
    }

    #[test]
    fn test_system_messages_as_preamble() {
        let path = [
            msg("s", None, Role::System, "be terse", 0),
            msg("m1", Some("s"), Role::User, "hi", 10),
            msg("m2", Some("m1"), Role::Assistant, "ok", 20),
        ];
        let options = TranscriptOptions {
            system: SystemHandling::Preamble,
            ..TranscriptOptions::default()
        };
        assert_eq!(render(&path, &options), "be terse\n\nUser: hi\nAssistant: ok");
    }

    #[test]
    fn test_render_is_idempotent() {
        let path = [msg("m1", None, Role::User, "hi", 0)];
        let options = TranscriptOptions::default();
        assert_eq!(render(&path, &options), render(&path, &options));
    }

    #[test]
    fn test_render_from_matches_resolved_render() {
        let messages = vec![
            msg("root", None, Role::User, "hi", 0),
            msg("reply", Some("root"), Role::Assistant, "hello", 10),
            msg("followup", Some("reply"), Role::User, "tell me more", 20),
        ];
        let index = TreeIndex::build(&messages);
        let overrides = ActiveVersions::new();
        let options = TranscriptOptions::default();

        let resolution = crate::tree::resolve(&index, &overrides, RootPolicy::default());
        let direct = render_from(&index, &overrides, "reply", &options).unwrap();
        assert_eq!(direct, render(&resolution.path, &options));

        let through = resolve_through(&index, &overrides, "root").unwrap();
        assert_eq!(
            render_from(&index, &overrides, "root", &options).unwrap(),
            render(&through.path, &options)
        );
    }

    #[test]
    fn test_render_from_unknown_start() {
        let index = TreeIndex::build(&[msg("root", None, Role::User, "hi", 0)]);
        let result = render_from(&index, &ActiveVersions::new(), "nope", &TranscriptOptions::default());
        assert!(matches!(result, Err(TreeError::NotFound { .. })));
    }
}
