use serde::{Deserialize, Serialize};

use crate::error::{TreeError, TreeResult};

use super::{resolve::resolve_through, ActiveVersions, Resolution, TreeIndex};

/// Position of a message among its parent's children, for "version 2 of 3"
/// style navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiblingInfo {
    /// Zero-based position among the siblings, in creation order.
    pub current_index: usize,
    /// Total number of siblings, the message itself included.
    pub total_siblings: usize,
    /// The shared parent; None when the message is a root.
    pub parent_id: Option<String>,
}

/// Locate a message among its siblings. Roots are siblings of each other.
pub fn sibling_info(index: &TreeIndex, message_id: &str) -> TreeResult<SiblingInfo> {
    let message = index.get(message_id).ok_or_else(|| TreeError::NotFound {
        message_id: message_id.to_string(),
    })?;

    let siblings = match &message.parent_id {
        Some(parent_id) => index.children(parent_id),
        None => index.roots(),
    };
    let current_index = siblings
        .iter()
        .position(|id| id == message_id)
        .unwrap_or(0);

    Ok(SiblingInfo {
        current_index,
        total_siblings: siblings.len().max(1),
        parent_id: message.parent_id.clone(),
    })
}

/// Record an explicit active-version override for a group. Creates and
/// deletes nothing; the returned map is the caller's new navigation state.
pub fn switch_to_version(
    index: &TreeIndex,
    overrides: &ActiveVersions,
    group_id: &str,
    message_id: &str,
) -> TreeResult<ActiveVersions> {
    let message = index.get(message_id).ok_or_else(|| TreeError::NotFound {
        message_id: message_id.to_string(),
    })?;
    if message.version_group() != group_id {
        return Err(TreeError::Validation {
            field: "message_id".to_string(),
            reason: format!(
                "message {} does not belong to version group {}",
                message_id, group_id
            ),
        });
    }

    let mut updated = overrides.clone();
    updated.set(group_id, message_id);
    Ok(updated)
}

/// Switch the active path to descend through the parent's nth child and
/// rebuild the forward path from there.
///
/// When the chosen child has version siblings, its group override is recorded
/// so the switch survives later default resolves instead of reverting to the
/// highest version. The returned map is the caller's new navigation state.
pub fn switch_to_branch_by_index(
    index: &TreeIndex,
    overrides: &ActiveVersions,
    parent_id: &str,
    branch_index: usize,
) -> TreeResult<(ActiveVersions, Resolution)> {
    if !index.contains(parent_id) {
        return Err(TreeError::NotFound {
            message_id: parent_id.to_string(),
        });
    }

    let children = index.children(parent_id);
    let child = children
        .get(branch_index)
        .ok_or(TreeError::InvalidIndex {
            index: branch_index,
            len: children.len(),
        })?;

    let mut updated = overrides.clone();
    if let Some(message) = index.get(child) {
        if index.versions(message.version_group()).len() > 1 {
            updated.set(message.version_group(), child.clone());
        }
    }

    let resolution = resolve_through(index, &updated, child)?;
    Ok((updated, resolution))
}
