//! The message forest: indexing, active-path resolution, and branch
//! navigation.
//!
//! A conversation's messages form a forest linked by `parent_id`, with
//! sibling alternatives of one logical turn grouped by version. Everything in
//! this module is pure and rebuilt fresh from the flat message list on every
//! request; the only client-visible navigation state is the
//! [`ActiveVersions`] override map, passed explicitly.

mod index;
mod navigate;
mod resolve;

pub use index::TreeIndex;
pub use navigate::{sibling_info, switch_to_branch_by_index, switch_to_version, SiblingInfo};
pub use resolve::{resolve, resolve_through, Resolution};

pub(crate) use resolve::{chain_to_root, next_child};

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Policy for choosing the starting root of the active path.
///
/// The default continues where the user last worked; the alternative is a
/// stable chronological choice. This is a UX policy, not a correctness
/// requirement, so it is configurable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RootPolicy {
    /// Start from the root of the most recently updated message.
    #[default]
    MostRecentlyUpdated,
    /// Start from the first root by creation time.
    FirstRootByCreation,
}

impl std::fmt::Display for RootPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RootPolicy::MostRecentlyUpdated => write!(f, "most_recently_updated"),
            RootPolicy::FirstRootByCreation => write!(f, "first_root_by_creation"),
        }
    }
}

impl std::str::FromStr for RootPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "most_recently_updated" => Ok(RootPolicy::MostRecentlyUpdated),
            "first_root_by_creation" => Ok(RootPolicy::FirstRootByCreation),
            _ => Err(format!("Unknown root policy: {}", s)),
        }
    }
}

/// Explicit per-group active-version selections.
///
/// Maps a version group id to the message id the caller wants shown for that
/// logical turn. Groups without an entry fall back to their highest version
/// number. Switching versions only edits this map; it never touches storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActiveVersions(HashMap<String, String>);

impl ActiveVersions {
    /// Create an empty override map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up the override for a version group.
    pub fn get(&self, group_id: &str) -> Option<&str> {
        self.0.get(group_id).map(|s| s.as_str())
    }

    /// Record an override for a version group, replacing any prior one.
    pub fn set(&mut self, group_id: impl Into<String>, message_id: impl Into<String>) {
        self.0.insert(group_id.into(), message_id.into());
    }

    /// Remove the override for a version group.
    pub fn clear(&mut self, group_id: &str) {
        self.0.remove(group_id);
    }

    /// Whether any overrides are recorded.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of recorded overrides.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}
