use std::collections::HashSet;

use crate::error::{IntegrityViolation, TreeError, TreeResult};
use crate::storage::Message;

use super::{ActiveVersions, RootPolicy, TreeIndex};

/// Outcome of resolving the active path.
///
/// Resolution is best-effort: a structural defect (cycle, dangling parent)
/// truncates the walk and is recorded on `violation` instead of failing the
/// whole call, so the caller always has something to show.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Messages along the active path, root first.
    pub path: Vec<Message>,
    /// First structural defect hit while resolving, if any.
    pub violation: Option<IntegrityViolation>,
}

impl Resolution {
    /// Ids along the path, root first.
    pub fn ids(&self) -> Vec<&str> {
        self.path.iter().map(|m| m.id.as_str()).collect()
    }

    /// The deepest message on the path.
    pub fn leaf(&self) -> Option<&Message> {
        self.path.last()
    }
}

/// Compute the active linear path through the conversation forest.
///
/// The starting root is chosen per `policy`, every version group along the
/// way collapses to its active member (explicit override, else the branch the
/// user last worked on, else the highest version number), and the walk
/// continues to the deepest reachable leaf. Subtrees under non-selected
/// versions are unreachable by construction.
pub fn resolve(index: &TreeIndex, overrides: &ActiveVersions, policy: RootPolicy) -> Resolution {
    if index.is_empty() {
        return Resolution {
            path: Vec::new(),
            violation: None,
        };
    }

    if is_legacy_linear(index) {
        let path = index
            .chronological()
            .iter()
            .filter_map(|id| index.get(id).cloned())
            .collect();
        return Resolution {
            path,
            violation: None,
        };
    }

    // When no real root exists (every message claims a parent), the walk-up
    // from the most recent message still yields a best-effort start, with the
    // cycle or dangling parent it ran into recorded on the resolution.
    let roots = index.roots();
    let (start, prefer, mut violation) = match (policy, roots.first()) {
        (RootPolicy::FirstRootByCreation, Some(root)) => (root.clone(), HashSet::new(), None),
        _ => match index.most_recently_updated() {
            Some(recent) => {
                let (chain, violation) = chain_to_root(index, &recent.id);
                let start = chain.first().cloned().unwrap_or_else(|| recent.id.clone());
                let prefer: HashSet<String> = chain.into_iter().collect();
                (start, prefer, violation)
            }
            None => {
                return Resolution {
                    path: Vec::new(),
                    violation: None,
                }
            }
        },
    };

    // Collapse the starting root through its version group. Only real roots
    // take part; a chain truncated by a dangling parent starts as-is.
    let start = if roots.contains(&start) {
        let group = index
            .get(&start)
            .map(|m| m.version_group().to_string())
            .unwrap_or_default();
        let candidates: Vec<String> = roots
            .iter()
            .filter(|id| {
                index
                    .get(id)
                    .map(|m| m.version_group() == group)
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        select_version(index, overrides, &prefer, &candidates).unwrap_or(start)
    } else {
        start
    };

    let path = walk_forward(index, overrides, vec![start], &prefer, &mut violation);
    Resolution { path, violation }
}

/// Rebuild the active path so that it passes through `via_id`: the literal
/// parent chain above it, the usual forward walk below it. Used by branch
/// switching, where the caller has already picked the exact message to show.
pub fn resolve_through(
    index: &TreeIndex,
    overrides: &ActiveVersions,
    via_id: &str,
) -> TreeResult<Resolution> {
    if !index.contains(via_id) {
        return Err(TreeError::NotFound {
            message_id: via_id.to_string(),
        });
    }

    let (chain, mut violation) = chain_to_root(index, via_id);
    let prefer = HashSet::new();
    let path = walk_forward(index, overrides, chain, &prefer, &mut violation);
    Ok(Resolution { path, violation })
}

/// Legacy linear import: no parent links anywhere and no version groups.
/// Such conversations read as a flat chronological transcript.
fn is_legacy_linear(index: &TreeIndex) -> bool {
    index.len() > 1
        && index.roots().len() == index.len()
        && index.roots().iter().all(|id| {
            index
                .get(id)
                .map(|m| index.versions(m.version_group()).len() == 1)
                .unwrap_or(true)
        })
}

/// Walk `parent_id` links up from `id`. Returns the chain root-first,
/// truncated (with a violation) at a cycle or a missing parent.
pub(crate) fn chain_to_root(
    index: &TreeIndex,
    id: &str,
) -> (Vec<String>, Option<IntegrityViolation>) {
    let mut chain = vec![id.to_string()];
    let mut seen: HashSet<String> = chain.iter().cloned().collect();
    let mut current = id.to_string();
    let mut violation = None;

    while let Some(parent_id) = index.get(&current).and_then(|m| m.parent_id.clone()) {
        if seen.contains(&parent_id) {
            violation = Some(IntegrityViolation::Cycle {
                message_id: parent_id,
            });
            break;
        }
        if !index.contains(&parent_id) {
            violation = Some(IntegrityViolation::DanglingParent {
                message_id: current,
                parent_id,
            });
            break;
        }
        seen.insert(parent_id.clone());
        chain.push(parent_id.clone());
        current = parent_id;
    }

    chain.reverse();
    (chain, violation)
}

/// Extend `start` (an already-valid path prefix, root first) to the deepest
/// reachable leaf. The visited set doubles as the cycle guard.
pub(crate) fn walk_forward(
    index: &TreeIndex,
    overrides: &ActiveVersions,
    start: Vec<String>,
    prefer: &HashSet<String>,
    violation: &mut Option<IntegrityViolation>,
) -> Vec<Message> {
    let mut visited: HashSet<String> = start.iter().cloned().collect();
    let mut path: Vec<Message> = start.iter().filter_map(|id| index.get(id).cloned()).collect();
    let mut current = start.last().cloned();

    while let Some(cur) = current {
        let children = index.children(&cur);
        if children.is_empty() {
            break;
        }
        match next_child(index, overrides, prefer, children, &visited) {
            Some(next) => {
                visited.insert(next.clone());
                if let Some(msg) = index.get(&next) {
                    path.push(msg.clone());
                }
                current = Some(next);
            }
            None => {
                // Children exist but all of them are already on the path.
                if violation.is_none() {
                    *violation = Some(IntegrityViolation::Cycle { message_id: cur });
                }
                break;
            }
        }
    }

    path
}

/// Pick the next hop among a node's children: an explicitly selected version
/// first, then a child on the prior working branch, then the first child in
/// creation order collapsed to its group's active version.
pub(crate) fn next_child(
    index: &TreeIndex,
    overrides: &ActiveVersions,
    prefer: &HashSet<String>,
    children: &[String],
    visited: &HashSet<String>,
) -> Option<String> {
    for child in children {
        if visited.contains(child) {
            continue;
        }
        if let Some(msg) = index.get(child) {
            if overrides.get(msg.version_group()) == Some(child.as_str()) {
                return Some(child.clone());
            }
        }
    }

    if let Some(preferred) = children
        .iter()
        .find(|c| !visited.contains(*c) && prefer.contains(*c))
    {
        return Some(preferred.clone());
    }

    let first = children.iter().find(|c| !visited.contains(*c))?;
    let group = index.get(first)?.version_group().to_string();
    let candidates: Vec<String> = children
        .iter()
        .filter(|c| {
            !visited.contains(*c)
                && index
                    .get(c)
                    .map(|m| m.version_group() == group)
                    .unwrap_or(false)
        })
        .cloned()
        .collect();
    select_version(index, overrides, prefer, &candidates)
}

/// Active member of one version group: explicit override, else the branch the
/// user last worked on, else the highest version number.
fn select_version(
    index: &TreeIndex,
    overrides: &ActiveVersions,
    prefer: &HashSet<String>,
    candidates: &[String],
) -> Option<String> {
    let group = index.get(candidates.first()?)?.version_group();
    if let Some(chosen) = overrides.get(group) {
        if candidates.iter().any(|c| c == chosen) {
            return Some(chosen.to_string());
        }
    }
    if let Some(preferred) = candidates.iter().find(|c| prefer.contains(*c)) {
        return Some(preferred.clone());
    }
    candidates
        .iter()
        .max_by_key(|c| index.get(c).map(|m| m.version_number).unwrap_or(0))
        .cloned()
}
