use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::storage::{Message, Role};
use crate::tree::{Resolution, TreeIndex};

const PREVIEW_CHARS: usize = 50;

/// One message of the active path, shaped for clients.
#[derive(Debug, Clone, Serialize)]
pub struct MessageView {
    /// Message id.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Full text payload.
    pub content: String,
    /// Conversational predecessor; None for roots.
    pub parent_id: Option<String>,
    /// Effective version group id.
    pub version_group_id: String,
    /// 1-based version number within the group.
    pub version_number: i64,
    /// When the message was created.
    pub created_at: DateTime<Utc>,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            role: message.role,
            content: message.content.clone(),
            parent_id: message.parent_id.clone(),
            version_group_id: message.version_group().to_string(),
            version_number: message.version_number,
            created_at: message.created_at,
        }
    }
}

/// Navigation metadata for a fork point on the active path: where the shown
/// message sits among its siblings, and who the siblings are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchNavigation {
    /// The message on the active path that has siblings.
    pub message_id: String,
    /// Zero-based position among the siblings.
    pub current_index: usize,
    /// Total number of siblings, the shown message included.
    pub total_branches: usize,
    /// Sibling ids in creation order, for direct switching.
    pub sibling_ids: Vec<String>,
}

/// One node of the rendered tree structure.
#[derive(Debug, Clone, Serialize)]
pub struct TreeNodeView {
    /// Message id.
    pub id: String,
    /// Author role.
    pub role: Role,
    /// Content preview, truncated to a few words.
    pub preview: String,
    /// 1-based version number within the node's group.
    pub version_number: i64,
    /// Whether the node lies on the active path.
    pub is_active: bool,
    /// Child nodes in creation order.
    pub children: Vec<TreeNodeView>,
}

/// Full payload for rendering a conversation: the linear view, per-fork-point
/// navigation, and the whole tree.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    /// Active path, root first.
    pub active_path: Vec<MessageView>,
    /// Fork points along the active path.
    pub branch_navigation: Vec<BranchNavigation>,
    /// The complete forest, one entry per root.
    pub tree: Vec<TreeNodeView>,
    /// Human-readable description of a structural defect hit during
    /// resolution, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub integrity_warning: Option<String>,
}

/// Assemble the client payload from an index and a resolution over it.
pub fn build_view(index: &TreeIndex, resolution: &Resolution) -> ConversationView {
    let active: HashSet<&str> = resolution.path.iter().map(|m| m.id.as_str()).collect();

    let mut branch_navigation = Vec::new();
    for message in &resolution.path {
        let siblings = match &message.parent_id {
            Some(parent_id) => index.children(parent_id),
            None => index.roots(),
        };
        if siblings.len() > 1 {
            let current_index = siblings
                .iter()
                .position(|id| id == &message.id)
                .unwrap_or(0);
            branch_navigation.push(BranchNavigation {
                message_id: message.id.clone(),
                current_index,
                total_branches: siblings.len(),
                sibling_ids: siblings.to_vec(),
            });
        }
    }

    ConversationView {
        active_path: resolution.path.iter().map(MessageView::from).collect(),
        branch_navigation,
        tree: build_tree(index, &active),
        integrity_warning: resolution.violation.as_ref().map(|v| v.to_string()),
    }
}

/// Build the nested tree without recursion: children are always created
/// after their parent, so a reverse-chronological sweep has every subtree
/// finished before its root comes up. Rows violating that (corrupted links)
/// simply drop out of the rendering.
fn build_tree(index: &TreeIndex, active: &HashSet<&str>) -> Vec<TreeNodeView> {
    let mut built: HashMap<&str, TreeNodeView> = HashMap::new();

    for id in index.chronological().iter().rev() {
        let Some(message) = index.get(id) else {
            continue;
        };
        let children = index
            .children(id)
            .iter()
            .filter_map(|child| built.remove(child.as_str()))
            .collect();
        built.insert(
            id,
            TreeNodeView {
                id: id.clone(),
                role: message.role,
                preview: preview(&message.content),
                version_number: message.version_number,
                is_active: active.contains(id.as_str()),
                children,
            },
        );
    }

    index
        .roots()
        .iter()
        .filter_map(|root| built.remove(root.as_str()))
        .collect()
}

fn preview(content: &str) -> String {
    let mut out: String = content.chars().take(PREVIEW_CHARS).collect();
    if content.chars().nth(PREVIEW_CHARS).is_some() {
        out.push_str("...");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{resolve, ActiveVersions, RootPolicy};
    use chrono::Duration;

    fn msg(id: &str, parent: Option<&str>, content: &str, offset_s: i64) -> Message {
        let t = Utc::now() + Duration::seconds(offset_s);
        Message {
            id: id.to_string(),
            conversation_id: "c-1".to_string(),
            user_id: "u-1".to_string(),
            role: Role::User,
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
    fn test_preview_truncation() {
        assert_eq!(preview("short"), "short");
        let long = "x".repeat(60);
        let p = preview(&long);
        assert_eq!(p.len(), 53);
        assert!(p.ends_with("..."));
        // Multi-byte content truncates on character boundaries.
        let unicode = "é".repeat(60);
        assert!(preview(&unicode).ends_with("..."));
    }

    #[test]
    fn test_view_marks_active_nodes_and_fork_points() {
        let messages = vec![
            msg("root", None, "hi", 0),
            msg("a", Some("root"), "branch a", 10),
            msg("b", Some("root"), "branch b", 20),
            msg("a-leaf", Some("a"), "deeper", 30),
        ];
        let index = TreeIndex::build(&messages);
        let resolution = resolve(&index, &ActiveVersions::new(), RootPolicy::FirstRootByCreation);
        let view = build_view(&index, &resolution);

        let path_ids: Vec<&str> = view.active_path.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(path_ids, ["root", "a", "a-leaf"]);

        assert_eq!(view.branch_navigation.len(), 1);
        let nav = &view.branch_navigation[0];
        assert_eq!(nav.message_id, "a");
        assert_eq!(nav.current_index, 0);
        assert_eq!(nav.total_branches, 2);
        assert_eq!(nav.sibling_ids, ["a", "b"]);

        assert_eq!(view.tree.len(), 1);
        let root = &view.tree[0];
        assert!(root.is_active);
        assert_eq!(root.children.len(), 2);
        let inactive: Vec<&TreeNodeView> =
            root.children.iter().filter(|c| !c.is_active).collect();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, "b");
        assert!(view.integrity_warning.is_none());
    }

    #[test]
    fn test_multi_root_forest_renders_every_root() {
        let messages = vec![
            msg("r1", None, "first", 0),
            msg("r1-child", Some("r1"), "child", 5),
            msg("r2", None, "second", 10),
        ];
        let index = TreeIndex::build(&messages);
        let resolution = resolve(&index, &ActiveVersions::new(), RootPolicy::FirstRootByCreation);
        let view = build_view(&index, &resolution);

        assert_eq!(view.tree.len(), 2);
        // The root itself is a fork point because roots are siblings.
        assert_eq!(view.branch_navigation[0].message_id, "r1");
        assert_eq!(view.branch_navigation[0].total_branches, 2);
    }
}
