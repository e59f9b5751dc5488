use std::collections::HashMap;

use crate::storage::Message;

/// In-memory adjacency index over one conversation's messages.
///
/// Built fresh from the flat message list on every request; nothing here is
/// persisted. Children and roots are kept in creation order, version members
/// in version-number order, so every traversal over the index is
/// deterministic.
#[derive(Debug, Default)]
pub struct TreeIndex {
    by_id: HashMap<String, Message>,
    children_of: HashMap<String, Vec<String>>,
    versions_of: HashMap<String, Vec<String>>,
    roots: Vec<String>,
    chronological: Vec<String>,
}

impl TreeIndex {
    /// Build the index from a conversation's messages in a single pass plus
    /// per-adjacency sorts.
    pub fn build(messages: &[Message]) -> Self {
        let mut index = TreeIndex {
            by_id: HashMap::with_capacity(messages.len()),
            ..TreeIndex::default()
        };

        for msg in messages {
            match &msg.parent_id {
                Some(parent_id) => index
                    .children_of
                    .entry(parent_id.clone())
                    .or_default()
                    .push(msg.id.clone()),
                None => index.roots.push(msg.id.clone()),
            }
            index
                .versions_of
                .entry(msg.version_group().to_string())
                .or_default()
                .push(msg.id.clone());
            index.chronological.push(msg.id.clone());
            index.by_id.insert(msg.id.clone(), msg.clone());
        }

        let by_id = &index.by_id;
        let by_creation = |id: &String| {
            let m = &by_id[id];
            (m.created_at, m.id.clone())
        };
        for children in index.children_of.values_mut() {
            children.sort_by_key(by_creation);
        }
        index.roots.sort_by_key(by_creation);
        index.chronological.sort_by_key(by_creation);
        for members in index.versions_of.values_mut() {
            members.sort_by_key(|id| by_id[id].version_number);
        }

        index
    }

    /// Look up a message by id.
    pub fn get(&self, id: &str) -> Option<&Message> {
        self.by_id.get(id)
    }

    /// Children of a message, in creation order.
    pub fn children(&self, id: &str) -> &[String] {
        self.children_of.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Members of a version group, in version-number order.
    pub fn versions(&self, group_id: &str) -> &[String] {
        self.versions_of
            .get(group_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Root messages (no parent), in creation order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    /// All message ids in creation order.
    pub fn chronological(&self) -> &[String] {
        &self.chronological
    }

    /// Whether a message is present.
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    /// Number of indexed messages.
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Whether the conversation has no messages.
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// The message with the latest `updated_at`, breaking ties by earliest
    /// creation and then id so the answer is stable across rebuilds.
    pub fn most_recently_updated(&self) -> Option<&Message> {
        let mut best: Option<&Message> = None;
        for id in &self.chronological {
            let msg = &self.by_id[id];
            let better = match best {
                None => true,
                Some(b) => msg.updated_at > b.updated_at,
            };
            if better {
                best = Some(msg);
            }
        }
        best
    }
}
