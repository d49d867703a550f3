//! Delegation edges and path resolution
//!
//! Resolution is the security-critical part of the role graph: it decides
//! which roles are consulted for a target path, and in which order.

use glob::Pattern;
use std::collections::HashSet;
use tracing::trace;
use tuf_fixtures_core::canonical::sha256_hex;
use tuf_fixtures_core::{FixtureError, Result};

use super::registry::{Role, RoleId};

/// An outgoing delegation from a targets-like role
///
/// Edges live in their parent's ordered list; their position there is their
/// evaluation priority.
#[derive(Debug, Clone)]
pub struct Delegation {
    child: RoleId,
    paths: Vec<String>,
    patterns: Vec<Pattern>,
    path_hash_prefixes: Option<Vec<String>>,
    terminating: bool,
}

impl Delegation {
    /// Create an edge, compiling its path patterns
    pub fn new(
        child: RoleId,
        paths: Vec<String>,
        path_hash_prefixes: Option<Vec<String>>,
        terminating: bool,
    ) -> Result<Self> {
        let patterns = paths
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| FixtureError::InvalidPattern {
                    pattern: p.clone(),
                    reason: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            child,
            paths,
            patterns,
            path_hash_prefixes,
            terminating,
        })
    }

    /// The delegated role
    pub fn child(&self) -> RoleId {
        self.child
    }

    /// Path patterns as declared
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    pub fn path_hash_prefixes(&self) -> Option<&[String]> {
        self.path_hash_prefixes.as_deref()
    }

    pub fn is_terminating(&self) -> bool {
        self.terminating
    }

    /// Whether this delegation covers a path
    ///
    /// `*` also matches `/`. A path is covered if any pattern matches or
    /// the hex SHA-256 of the path starts with any hash prefix.
    pub fn matches(&self, path: &str) -> bool {
        if self.patterns.iter().any(|p| p.matches(path)) {
            return true;
        }

        match &self.path_hash_prefixes {
            Some(prefixes) => {
                let digest = sha256_hex(path.as_bytes());
                prefixes.iter().any(|prefix| digest.starts_with(prefix.as_str()))
            }
            None => false,
        }
    }
}

/// Ordered roles consulted for a path, starting at `start`
///
/// Preorder depth-first: each delegation of a role is evaluated in
/// declaration order, and a matching child is visited (with its own
/// delegations) before the next sibling. Once a terminating delegation has
/// been evaluated, later siblings at that parent are skipped whether or not
/// it matched. No role is visited twice.
pub(crate) fn resolve(roles: &[Role], start: RoleId, path: &str) -> Vec<RoleId> {
    let mut order = vec![start];
    let mut visited = HashSet::from([start]);
    visit(roles, start, path, &mut order, &mut visited);
    order
}

fn visit(
    roles: &[Role],
    parent: RoleId,
    path: &str,
    order: &mut Vec<RoleId>,
    visited: &mut HashSet<RoleId>,
) {
    for delegation in roles[parent].delegations() {
        let child = delegation.child();

        if delegation.matches(path) && visited.insert(child) {
            trace!(parent = %roles[parent].name(), child = %roles[child].name(), path, "Delegation taken");
            order.push(child);
            visit(roles, child, path, order, visited);
        }

        if delegation.is_terminating() {
            trace!(parent = %roles[parent].name(), child = %roles[child].name(), path, "Terminating delegation reached");
            break;
        }
    }
}
