//! Role Registry
//!
//! Owns every role of a repository in an arena addressed by [`RoleId`]:
//! - the four top-level roles created at bootstrap
//! - delegated roles created on demand by [`RoleRegistry::delegate`]
//! - each role's verification keys, loaded signing keys and threshold
//! - each targets-like role's targets and ordered outgoing delegations
//!
//! Misconfiguration that fixtures deliberately model (thresholds above the
//! key count) is recorded as a [`ConsistencyWarning`] rather than rejected.

use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};
use tuf_fixtures_core::types::{TARGETS, TOP_LEVEL_ROLES};
use tuf_fixtures_core::{
    ConsistencyWarning, FixtureError, KeyPair, KeyStore, PublicKey, Result, RoleKind, Target,
};

use super::delegation::{self, Delegation};

/// Stable index of a role in the registry arena
pub type RoleId = usize;

/// A named signing authority
#[derive(Debug, Clone)]
pub struct Role {
    name: String,
    kind: RoleKind,
    threshold: u32,
    /// Trusted keys, in the order they were added
    verification_keys: Vec<PublicKey>,
    /// Keys that sign this role's documents, revoked ones included
    signing_keys: Vec<KeyPair>,
    delegations: Vec<Delegation>,
    targets: BTreeMap<String, Target>,
}

impl Role {
    fn new(name: &str, threshold: u32) -> Self {
        Self {
            name: name.to_string(),
            kind: RoleKind::for_name(name),
            threshold,
            verification_keys: Vec::new(),
            signing_keys: Vec::new(),
            delegations: Vec::new(),
            targets: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RoleKind {
        self.kind
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn verification_keys(&self) -> &[PublicKey] {
        &self.verification_keys
    }

    /// Ids of the verification keys
    pub fn keyids(&self) -> Vec<String> {
        self.verification_keys
            .iter()
            .map(|k| k.keyid().to_string())
            .collect()
    }

    pub fn signing_keys(&self) -> &[KeyPair] {
        &self.signing_keys
    }

    /// Outgoing delegations in evaluation order
    pub fn delegations(&self) -> &[Delegation] {
        &self.delegations
    }

    pub fn targets(&self) -> &BTreeMap<String, Target> {
        &self.targets
    }

    fn below_threshold(&self) -> bool {
        (self.verification_keys.len() as u64) < u64::from(self.threshold)
    }
}

/// Arena of roles plus the ordered delegation graph between them
#[derive(Debug, Default)]
pub struct RoleRegistry {
    roles: Vec<Role>,
    by_name: HashMap<String, RoleId>,
    /// Target path -> owning role
    target_owners: HashMap<String, RoleId>,
    warnings: Vec<ConsistencyWarning>,
}

impl RoleRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create root, targets, snapshot and timestamp with one key each
    ///
    /// Keys are issued in that role order, so the first four keys of a
    /// store always belong to the top-level roles.
    pub fn bootstrap(keys: &mut KeyStore) -> Result<Self> {
        let mut registry = Self::new();

        for name in TOP_LEVEL_ROLES {
            registry.create_role(name, 1)?;
            let key = keys.next_key()?;
            registry.add_verification_key(name, key.public_key())?;
            registry.load_signing_key(name, key)?;
        }

        info!(roles = registry.len(), "Bootstrapped top-level roles");
        Ok(registry)
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Id of a role by name
    pub fn id(&self, name: &str) -> Result<RoleId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| FixtureError::UnknownRole(name.to_string()))
    }

    pub fn role(&self, name: &str) -> Result<&Role> {
        Ok(&self.roles[self.id(name)?])
    }

    /// Role by id
    ///
    /// # Panics
    /// If the id did not come from this registry.
    pub fn get(&self, id: RoleId) -> &Role {
        &self.roles[id]
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.roles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Every role, in creation order
    pub fn iter(&self) -> impl Iterator<Item = (RoleId, &Role)> {
        self.roles.iter().enumerate()
    }

    /// Targets and every delegated role, in creation order
    pub fn targets_like(&self) -> impl Iterator<Item = (RoleId, &Role)> {
        self.iter().filter(|(_, role)| role.kind().is_targets_like())
    }

    /// Owner of a target path, if signed
    pub fn target_owner(&self, path: &str) -> Option<&Role> {
        self.target_owners.get(path).map(|&id| &self.roles[id])
    }

    /// Roles with a delegation to the given role
    pub fn delegators_of(&self, name: &str) -> Result<Vec<RoleId>> {
        let child = self.id(name)?;
        Ok(self
            .iter()
            .filter(|(_, role)| role.delegations.iter().any(|d| d.child() == child))
            .map(|(id, _)| id)
            .collect())
    }

    // =========================================================================
    // Roles and Keys
    // =========================================================================

    /// Create a role
    pub fn create_role(&mut self, name: &str, threshold: u32) -> Result<RoleId> {
        if self.by_name.contains_key(name) {
            return Err(FixtureError::DuplicateRole(name.to_string()));
        }
        if threshold == 0 {
            return Err(FixtureError::InvalidThreshold {
                role: name.to_string(),
                threshold,
            });
        }

        let id = self.roles.len();
        self.roles.push(Role::new(name, threshold));
        self.by_name.insert(name.to_string(), id);

        debug!(role = %name, threshold, "Created role");
        Ok(id)
    }

    /// Trust a key for a role
    pub fn add_verification_key(&mut self, name: &str, key: PublicKey) -> Result<()> {
        let id = self.id(name)?;
        let role = &mut self.roles[id];

        if role.verification_keys.iter().any(|k| k.keyid() == key.keyid()) {
            return Err(FixtureError::DuplicateKey {
                role: name.to_string(),
                keyid: key.keyid().to_string(),
            });
        }

        info!(role = %name, keyid = %key.keyid(), "Added verification key");
        role.verification_keys.push(key);
        Ok(())
    }

    /// Stop trusting a key
    ///
    /// Removal below the threshold succeeds with a warning.
    pub fn remove_verification_key(&mut self, name: &str, keyid: &str) -> Result<PublicKey> {
        let id = self.id(name)?;
        let index = self.roles[id]
            .verification_keys
            .iter()
            .position(|k| k.keyid() == keyid)
            .ok_or_else(|| FixtureError::UnknownKey {
                role: name.to_string(),
                keyid: keyid.to_string(),
            })?;
        self.remove_verification_key_at(name, index)
    }

    /// Stop trusting the key at an index of the role's key list
    pub fn remove_verification_key_at(&mut self, name: &str, index: usize) -> Result<PublicKey> {
        let id = self.id(name)?;
        let role = &mut self.roles[id];

        if index >= role.verification_keys.len() {
            return Err(FixtureError::KeyIndexOutOfRange {
                role: name.to_string(),
                index,
                count: role.verification_keys.len(),
            });
        }

        let key = role.verification_keys.remove(index);
        info!(role = %name, keyid = %key.keyid(), "Removed verification key");

        if role.below_threshold() {
            let warning = ConsistencyWarning::RemovalBelowThreshold {
                role: name.to_string(),
                threshold: role.threshold,
                keys: role.verification_keys.len(),
            };
            self.record_warning(warning);
        }

        Ok(key)
    }

    /// Sign the role's future documents with a key
    ///
    /// Loading a key twice is a no-op.
    pub fn load_signing_key(&mut self, name: &str, key: KeyPair) -> Result<()> {
        let id = self.id(name)?;
        let role = &mut self.roles[id];

        if role.signing_keys.iter().any(|k| k.keyid() == key.keyid()) {
            return Ok(());
        }

        debug!(role = %name, keyid = %key.keyid(), "Loaded signing key");
        role.signing_keys.push(key);
        Ok(())
    }

    /// Stop signing with a key; returns whether it was loaded
    pub fn unload_signing_key(&mut self, name: &str, keyid: &str) -> Result<bool> {
        let id = self.id(name)?;
        let role = &mut self.roles[id];
        let before = role.signing_keys.len();
        role.signing_keys.retain(|k| k.keyid() != keyid);
        Ok(role.signing_keys.len() != before)
    }

    /// Change a role's threshold
    ///
    /// A threshold above the key count succeeds with a warning.
    pub fn set_threshold(&mut self, name: &str, threshold: u32) -> Result<()> {
        if threshold == 0 {
            return Err(FixtureError::InvalidThreshold {
                role: name.to_string(),
                threshold,
            });
        }

        let id = self.id(name)?;
        let role = &mut self.roles[id];
        role.threshold = threshold;
        info!(role = %name, threshold, "Set threshold");

        if role.below_threshold() {
            let warning = ConsistencyWarning::ThresholdExceedsKeys {
                role: name.to_string(),
                threshold,
                keys: role.verification_keys.len(),
            };
            self.record_warning(warning);
        }

        Ok(())
    }

    // =========================================================================
    // Delegation Graph
    // =========================================================================

    /// Delegate part of a parent's paths to a child role
    ///
    /// The child is created if absent (with the given threshold) and the
    /// keys it lacks are added to it. The edge is appended to the parent's
    /// delegation list, so earlier delegations take priority. Delegating
    /// again from the same parent to the same child replaces that edge in
    /// place.
    #[allow(clippy::too_many_arguments)]
    pub fn delegate(
        &mut self,
        parent: &str,
        child: &str,
        keys: Vec<PublicKey>,
        paths: Vec<String>,
        threshold: u32,
        terminating: bool,
        path_hash_prefixes: Option<Vec<String>>,
    ) -> Result<RoleId> {
        let parent_id = self
            .by_name
            .get(parent)
            .copied()
            .ok_or_else(|| FixtureError::UnknownParent(parent.to_string()))?;
        if !self.roles[parent_id].kind().is_targets_like() {
            return Err(FixtureError::NotADelegator(parent.to_string()));
        }

        let existing = self.by_name.get(child).copied();
        if let Some(id) = existing {
            if !self.roles[id].kind().is_targets_like() {
                return Err(FixtureError::DuplicateRole(child.to_string()));
            }
        }

        // Patterns compile before the arena changes
        let edge = Delegation::new(
            existing.unwrap_or(self.roles.len()),
            paths,
            path_hash_prefixes,
            terminating,
        )?;
        let child_id = match existing {
            Some(id) => id,
            None => self.create_role(child, threshold)?,
        };

        for key in keys {
            if !self.roles[child_id]
                .verification_keys
                .iter()
                .any(|k| k.keyid() == key.keyid())
            {
                self.add_verification_key(child, key)?;
            }
        }

        let edges = &mut self.roles[parent_id].delegations;
        let priority = match edges.iter().position(|d| d.child() == child_id) {
            Some(position) => {
                edges[position] = edge;
                position
            }
            None => {
                edges.push(edge);
                edges.len() - 1
            }
        };

        info!(
            parent = %parent,
            child = %child,
            priority,
            terminating,
            "Delegated role"
        );
        Ok(child_id)
    }

    /// Roles consulted for a path, in evaluation order, starting at `targets`
    pub fn resolve_path(&self, path: &str) -> Result<Vec<&Role>> {
        let start = self.id(TARGETS)?;
        Ok(delegation::resolve(&self.roles, start, path)
            .into_iter()
            .map(|id| &self.roles[id])
            .collect())
    }

    // =========================================================================
    // Targets
    // =========================================================================

    /// Make a role the signer of a target
    pub fn add_target(&mut self, name: &str, target: Target) -> Result<()> {
        let id = self.id(name)?;
        if !self.roles[id].kind().is_targets_like() {
            return Err(FixtureError::NotADelegator(name.to_string()));
        }
        if self.target_owners.contains_key(&target.path) {
            return Err(FixtureError::DuplicateTarget(target.path));
        }

        debug!(role = %name, path = %target.path, length = target.length, "Added target");
        self.target_owners.insert(target.path.clone(), id);
        self.roles[id].targets.insert(target.path.clone(), target);
        Ok(())
    }

    // =========================================================================
    // Warnings
    // =========================================================================

    /// Log and keep a consistency warning
    pub fn record_warning(&mut self, warning: ConsistencyWarning) {
        warn!(warning = %warning, "Consistency warning");
        self.warnings.push(warning);
    }

    /// Every warning recorded so far
    pub fn warnings(&self) -> &[ConsistencyWarning] {
        &self.warnings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bootstrapped() -> (RoleRegistry, KeyStore) {
        let mut keys = KeyStore::new("registry");
        let registry = RoleRegistry::bootstrap(&mut keys).unwrap();
        (registry, keys)
    }

    fn names(roles: Vec<&Role>) -> Vec<&str> {
        roles.into_iter().map(|r| r.name()).collect()
    }

    fn globs(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_bootstrap() {
        let (registry, keys) = bootstrapped();
        assert_eq!(registry.len(), 4);
        assert_eq!(keys.issued_count(), 4);

        for name in TOP_LEVEL_ROLES {
            let role = registry.role(name).unwrap();
            assert_eq!(role.threshold(), 1);
            assert_eq!(role.verification_keys().len(), 1);
            assert_eq!(role.signing_keys().len(), 1);
        }

        let targets_like: Vec<_> = registry.targets_like().map(|(_, r)| r.name()).collect();
        assert_eq!(targets_like, vec!["targets"]);
    }

    #[test]
    fn test_duplicate_role_rejected() {
        let (mut registry, _) = bootstrapped();
        let err = registry.create_role("targets", 1).unwrap_err();
        assert!(matches!(err, FixtureError::DuplicateRole(_)));
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_unknown_role_rejected() {
        let (mut registry, _) = bootstrapped();
        assert!(matches!(
            registry.set_threshold("nope", 1),
            Err(FixtureError::UnknownRole(_))
        ));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let (mut registry, _) = bootstrapped();
        assert!(matches!(
            registry.set_threshold("timestamp", 0),
            Err(FixtureError::InvalidThreshold { .. })
        ));
    }

    #[test]
    fn test_threshold_above_keys_warns() {
        let (mut registry, _) = bootstrapped();
        registry.set_threshold("timestamp", 2).unwrap();

        assert_eq!(registry.role("timestamp").unwrap().threshold(), 2);
        assert_eq!(
            registry.warnings(),
            &[ConsistencyWarning::ThresholdExceedsKeys {
                role: "timestamp".into(),
                threshold: 2,
                keys: 1,
            }]
        );
    }

    #[test]
    fn test_removal_below_threshold_warns() {
        let (mut registry, _) = bootstrapped();
        registry.remove_verification_key_at("snapshot", 0).unwrap();

        assert!(registry.role("snapshot").unwrap().verification_keys().is_empty());
        // Signing key stays loaded
        assert_eq!(registry.role("snapshot").unwrap().signing_keys().len(), 1);
        assert!(matches!(
            registry.warnings()[0],
            ConsistencyWarning::RemovalBelowThreshold { keys: 0, .. }
        ));
    }

    #[test]
    fn test_key_errors() {
        let (mut registry, mut keys) = bootstrapped();
        let existing = registry.role("root").unwrap().verification_keys()[0].clone();

        assert!(matches!(
            registry.add_verification_key("root", existing),
            Err(FixtureError::DuplicateKey { .. })
        ));
        assert!(matches!(
            registry.remove_verification_key_at("root", 3),
            Err(FixtureError::KeyIndexOutOfRange { index: 3, count: 1, .. })
        ));

        let stranger = keys.next_key().unwrap();
        assert!(matches!(
            registry.remove_verification_key("root", stranger.keyid()),
            Err(FixtureError::UnknownKey { .. })
        ));
    }

    #[test]
    fn test_signing_keys() {
        let (mut registry, mut keys) = bootstrapped();
        let key = keys.next_key().unwrap();

        registry.load_signing_key("targets", key.clone()).unwrap();
        registry.load_signing_key("targets", key.clone()).unwrap();
        assert_eq!(registry.role("targets").unwrap().signing_keys().len(), 2);

        assert!(registry.unload_signing_key("targets", key.keyid()).unwrap());
        assert!(!registry.unload_signing_key("targets", key.keyid()).unwrap());
    }

    #[test]
    fn test_delegate_to_unknown_parent() {
        let (mut registry, _) = bootstrapped();
        let err = registry
            .delegate("ghost", "child", vec![], globs(&["*"]), 1, false, None)
            .unwrap_err();
        assert!(matches!(err, FixtureError::UnknownParent(_)));
        assert!(!registry.contains("child"));
    }

    #[test]
    fn test_delegate_from_non_targets_role() {
        let (mut registry, _) = bootstrapped();
        let err = registry
            .delegate("snapshot", "child", vec![], globs(&["*"]), 1, false, None)
            .unwrap_err();
        assert!(matches!(err, FixtureError::NotADelegator(_)));
    }

    #[test]
    fn test_delegate_creates_child() {
        let (mut registry, mut keys) = bootstrapped();
        let key = keys.next_key().unwrap();

        registry
            .delegate("targets", "unclaimed", vec![key.public_key()], globs(&["a_*.txt"]), 1, false, None)
            .unwrap();

        let child = registry.role("unclaimed").unwrap();
        assert_eq!(child.kind(), RoleKind::Delegated);
        assert_eq!(child.keyids(), vec![key.keyid().to_string()]);
        assert_eq!(registry.role("targets").unwrap().delegations().len(), 1);
        assert_eq!(
            registry.delegators_of("unclaimed").unwrap(),
            vec![registry.id("targets").unwrap()]
        );
    }

    #[test]
    fn test_redelegation_replaces_edge() {
        let (mut registry, _) = bootstrapped();
        registry.delegate("targets", "a", vec![], globs(&["a_*"]), 1, false, None).unwrap();
        registry.delegate("targets", "b", vec![], globs(&["b_*"]), 1, false, None).unwrap();
        registry.delegate("targets", "a", vec![], globs(&["x_*"]), 3, true, None).unwrap();

        let edges = registry.role("targets").unwrap().delegations();
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].paths(), &["x_*".to_string()]);
        assert!(edges[0].is_terminating());
        // Existing child keeps its threshold
        assert_eq!(registry.role("a").unwrap().threshold(), 1);
    }

    #[test]
    fn test_invalid_pattern_leaves_no_role() {
        let (mut registry, mut keys) = bootstrapped();
        let before = registry.len();
        let key = keys.next_key().unwrap().public_key();

        let err = registry
            .delegate("targets", "broken", vec![key], globs(&["["]), 1, false, None)
            .unwrap_err();

        assert!(matches!(err, FixtureError::InvalidPattern { .. }));
        assert!(!registry.contains("broken"));
        assert_eq!(registry.len(), before);
        assert!(registry.role("targets").unwrap().delegations().is_empty());

        // The name stays free for a later, valid delegation
        let id = registry.delegate("targets", "broken", vec![], globs(&["*"]), 1, false, None).unwrap();
        assert_eq!(id, before);
        assert_eq!(registry.role("targets").unwrap().delegations()[0].child(), id);
    }

    #[test]
    fn test_resolve_simple_delegation() {
        let (mut registry, _) = bootstrapped();
        registry
            .delegate("targets", "unclaimed", vec![], globs(&["a_*.txt"]), 1, false, None)
            .unwrap();

        assert_eq!(
            names(registry.resolve_path("a_1.txt").unwrap()),
            vec!["targets", "unclaimed"]
        );
        assert_eq!(names(registry.resolve_path("b_1.txt").unwrap()), vec!["targets"]);
    }

    #[test]
    fn test_resolve_is_preorder() {
        let (mut registry, _) = bootstrapped();
        let all = globs(&["*.txt"]);
        registry.delegate("targets", "a", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("a", "b", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("b", "c", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("b", "d", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("a", "e", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("targets", "f", vec![], all, 1, false, None).unwrap();

        assert_eq!(
            names(registry.resolve_path("x.txt").unwrap()),
            vec!["targets", "a", "b", "c", "d", "e", "f"]
        );
    }

    #[test]
    fn test_terminating_skips_later_siblings_only() {
        let (mut registry, _) = bootstrapped();
        let all = globs(&["*.txt"]);
        registry.delegate("targets", "a", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("a", "b", vec![], all.clone(), 1, true, None).unwrap();
        registry.delegate("a", "c", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("targets", "d", vec![], all, 1, false, None).unwrap();

        assert_eq!(
            names(registry.resolve_path("c.txt").unwrap()),
            vec!["targets", "a", "b", "d"]
        );
    }

    #[test]
    fn test_unmatched_terminating_still_stops_siblings() {
        let (mut registry, _) = bootstrapped();
        registry
            .delegate("targets", "narrow", vec![], globs(&["narrow_*"]), 1, true, None)
            .unwrap();
        registry.delegate("targets", "wide", vec![], globs(&["*"]), 1, false, None).unwrap();

        assert_eq!(names(registry.resolve_path("other.txt").unwrap()), vec!["targets"]);
    }

    #[test]
    fn test_terminating_role_children_are_visited() {
        let (mut registry, _) = bootstrapped();
        registry
            .delegate("targets", "term", vec![], globs(&["t_*"]), 1, true, None)
            .unwrap();
        registry.delegate("term", "below", vec![], globs(&["t_3_*"]), 1, false, None).unwrap();

        assert_eq!(
            names(registry.resolve_path("t_3_x").unwrap()),
            vec!["targets", "term", "below"]
        );
    }

    #[test]
    fn test_resolution_survives_cycles() {
        let (mut registry, _) = bootstrapped();
        let all = globs(&["*"]);
        registry.delegate("targets", "a", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("a", "b", vec![], all.clone(), 1, false, None).unwrap();
        registry.delegate("b", "a", vec![], all, 1, false, None).unwrap();

        assert_eq!(names(registry.resolve_path("x").unwrap()), vec!["targets", "a", "b"]);
    }

    #[test]
    fn test_targets_have_one_owner() {
        let (mut registry, _) = bootstrapped();
        registry.add_target("targets", Target::new("t.txt", "x")).unwrap();

        assert_eq!(registry.target_owner("t.txt").unwrap().name(), "targets");
        assert!(matches!(
            registry.add_target("targets", Target::new("t.txt", "y")),
            Err(FixtureError::DuplicateTarget(_))
        ));
        assert!(matches!(
            registry.add_target("timestamp", Target::new("u.txt", "y")),
            Err(FixtureError::NotADelegator(_))
        ));
    }
}
