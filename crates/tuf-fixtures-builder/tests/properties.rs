//! Property-Based Tests for the role graph and the metadata store
//!
//! These tests verify the properties every fixture relies on:
//! 1. RESOLUTION: starts at targets, never repeats a role, is deterministic
//! 2. TERMINATING: nothing after a terminating delegation is consulted
//! 3. VERSIONS: a write bumps each written role by one and nothing else
//!
//! Uses proptest for property-based testing with arbitrary inputs.

use proptest::prelude::*;
use std::collections::HashSet;
use tuf_fixtures::{RepositoryOptions, RoleRegistry, VersionedMetadataStore};
use tuf_fixtures_core::types::{ROOT, SNAPSHOT, TARGETS, TIMESTAMP};
use tuf_fixtures_core::{FixedClock, KeyStore};

fn registry(keys: &mut KeyStore) -> RoleRegistry {
    RoleRegistry::bootstrap(keys).expect("Failed to bootstrap")
}

fn delegate(
    registry: &mut RoleRegistry,
    keys: &mut KeyStore,
    parent: &str,
    child: &str,
    pattern: &str,
    terminating: bool,
) {
    let key = keys.next_key().unwrap().public_key();
    registry
        .delegate(parent, child, vec![key], vec![pattern.to_string()], 1, terminating, None)
        .unwrap();
}

// =============================================================================
// RESOLUTION: well-formed and deterministic
// =============================================================================

/// A random delegation graph; each edge is (parent index, pattern index,
/// terminating), where parent index 0 is `targets` and i > 0 is role `r{i-1}`
fn graph_strategy() -> impl Strategy<Value = Vec<(usize, usize, bool)>> {
    prop::collection::vec((0usize..8, 0usize..3, any::<bool>()), 1..12)
}

const PATTERNS: [&str; 3] = ["*.txt", "a*", "*"];

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_resolution_is_well_formed(edges in graph_strategy(), path in "[a-c]{1,3}(\\.txt)?") {
        let mut keys = KeyStore::new("props");
        let mut reg = registry(&mut keys);

        for (i, (parent, pattern, terminating)) in edges.iter().enumerate() {
            let parent = match parent % (i + 1) {
                0 => TARGETS.to_string(),
                n => format!("r{}", n - 1),
            };
            delegate(&mut reg, &mut keys, &parent, &format!("r{i}"), PATTERNS[*pattern], *terminating);
        }

        let first: Vec<String> = reg.resolve_path(&path).unwrap().iter().map(|r| r.name().to_string()).collect();
        let second: Vec<String> = reg.resolve_path(&path).unwrap().iter().map(|r| r.name().to_string()).collect();

        prop_assert_eq!(&first, &second);
        prop_assert_eq!(first[0].as_str(), TARGETS);

        let unique: HashSet<_> = first.iter().collect();
        prop_assert_eq!(unique.len(), first.len());
    }
}

// =============================================================================
// TERMINATING: later siblings are never consulted
// =============================================================================

/// Sibling patterns tried against `x.txt`: two that match, one that does not
const SIBLING_PATTERNS: [&str; 3] = ["*", "*.txt", "none_*"];

fn siblings_strategy() -> impl Strategy<Value = Vec<(usize, bool)>> {
    prop::collection::vec((0usize..3, prop::bool::weighted(0.3)), 1..10)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_terminating_cuts_siblings(siblings in siblings_strategy()) {
        let mut keys = KeyStore::new("terminating");
        let mut reg = registry(&mut keys);

        for (i, (pattern, terminating)) in siblings.iter().enumerate() {
            delegate(&mut reg, &mut keys, TARGETS, &format!("c{i}"), SIBLING_PATTERNS[*pattern], *terminating);
        }

        let resolved: Vec<String> = reg.resolve_path("x.txt").unwrap().iter().map(|r| r.name().to_string()).collect();

        // The first terminating sibling is the last one evaluated, matched or not
        let cut = siblings.iter().position(|(_, t)| *t).unwrap_or(siblings.len() - 1);
        let mut expected = vec![TARGETS.to_string()];
        expected.extend(
            siblings[..=cut]
                .iter()
                .enumerate()
                .filter(|(_, (pattern, _))| SIBLING_PATTERNS[*pattern] != "none_*")
                .map(|(i, _)| format!("c{i}")),
        );
        prop_assert_eq!(&resolved, &expected);

        let later_siblings_pruned = (cut + 1..siblings.len()).all(|i| !resolved.contains(&format!("c{i}")));
        prop_assert!(later_siblings_pruned);
    }
}

// =============================================================================
// VERSIONS: one step per write, only for written roles
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_versions_advance_by_one(rounds in prop::collection::vec(prop::collection::vec(0usize..4, 0..4), 1..6)) {
        let mut keys = KeyStore::new("versions");
        let reg = registry(&mut keys);
        let mut store = VersionedMetadataStore::new(RepositoryOptions::default(), FixedClock::default());
        let roles = [ROOT, TARGETS, SNAPSHOT, TIMESTAMP];

        store.write_all(&reg, true).unwrap();
        for role in roles {
            prop_assert_eq!(store.version(role), 1);
        }

        for round in rounds {
            let dirty: Vec<&str> = round.iter().map(|&i| roles[i]).collect();
            store.mark_dirty(&reg, &dirty).unwrap();

            let before: Vec<u32> = roles.iter().map(|r| store.version(r)).collect();
            let report = store.write_all(&reg, true).unwrap();
            let written: HashSet<&str> = report.written.iter().map(|(r, _)| r.as_str()).collect();

            for (role, old) in roles.iter().zip(before) {
                let expected = if written.contains(role) { old + 1 } else { old };
                prop_assert_eq!(store.version(role), expected);
            }

            // Anything below timestamp that was written forces a new timestamp
            if written.contains(TARGETS) || written.contains(SNAPSHOT) {
                prop_assert!(written.contains(TIMESTAMP));
            }
            prop_assert_eq!(written.contains(ROOT), dirty.contains(&ROOT));
        }
    }
}
