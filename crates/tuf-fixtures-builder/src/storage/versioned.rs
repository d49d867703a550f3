//! Versioned Metadata Store
//!
//! Builds and signs one document per dirty role per write, in dependency
//! order: root, then every targets-like role, then snapshot, then timestamp.
//! Snapshot and timestamp reference the bytes written earlier in the same
//! pass, so the reference chain is always current.
//!
//! The store keeps the full file map of the repository. Under consistent
//! snapshots each write adds `<version>.<role>.json` next to the `<role>.json`
//! alias; superseded versions are retained. Timestamp only ever has the alias.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{debug, info};
use tuf_fixtures_core::metadata::{
    DelegatedRoleEntry, Delegations, MetaFileInfo, RoleKeys, RootMetadata, Signed,
    SignedMetadata, SnapshotMetadata, TargetFileInfo, TargetsMetadata, TimestampMetadata,
};
use tuf_fixtures_core::types::{ROOT, SNAPSHOT, SPEC_VERSION, TIMESTAMP};
use tuf_fixtures_core::{
    ConsistencyWarning, FixedClock, FixtureError, Hashes, Result, RoleKind,
};

use crate::config::RepositoryOptions;
use crate::roles::{Role, RoleId, RoleRegistry};

/// File name of the latest document of a role
pub fn metadata_file(role: &str) -> String {
    format!("{role}.json")
}

/// File name of a specific version of a role's document
pub fn versioned_file(role: &str, version: u32) -> String {
    format!("{version}.{role}.json")
}

/// Every persisted document of a repository
#[derive(Debug, Clone, Default)]
pub struct RepositoryState {
    /// Latest document of each written role
    latest: BTreeMap<String, SignedMetadata>,
    /// File name -> bytes, retained versions included
    files: BTreeMap<String, Vec<u8>>,
}

impl RepositoryState {
    /// Latest document of a role
    pub fn latest(&self, role: &str) -> Option<&SignedMetadata> {
        self.latest.get(role)
    }

    /// Bytes of a metadata file
    pub fn file(&self, name: &str) -> Option<&[u8]> {
        self.files.get(name).map(Vec::as_slice)
    }

    /// Every file, sorted by name
    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    fn record(&mut self, role: &str, doc: SignedMetadata, bytes: Vec<u8>, consistent: bool) {
        if consistent && role != TIMESTAMP {
            self.files
                .insert(versioned_file(role, doc.signed.version()), bytes.clone());
        }
        self.files.insert(metadata_file(role), bytes);
        self.latest.insert(role.to_string(), doc);
    }
}

/// What one `write_all` produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Role and new version, in write order
    pub written: Vec<(String, u32)>,
    /// Documents written with fewer trusted signatures than their threshold
    pub warnings: Vec<ConsistencyWarning>,
}

/// Builds, signs and retains documents for dirty roles
#[derive(Debug)]
pub struct VersionedMetadataStore {
    options: RepositoryOptions,
    clock: FixedClock,
    /// Latest written version per role; absent means never written
    versions: HashMap<String, u32>,
    pending: BTreeSet<RoleId>,
    state: RepositoryState,
}

impl VersionedMetadataStore {
    pub fn new(options: RepositoryOptions, clock: FixedClock) -> Self {
        Self {
            options,
            clock,
            versions: HashMap::new(),
            pending: BTreeSet::new(),
            state: RepositoryState::default(),
        }
    }

    /// Flag roles for rewrite at the next write
    pub fn mark_dirty(&mut self, registry: &RoleRegistry, roles: &[&str]) -> Result<()> {
        for name in roles {
            let id = registry.id(name)?;
            if self.pending.insert(id) {
                debug!(role = %name, "Marked dirty");
            }
        }
        Ok(())
    }

    /// Flag a role by id
    pub fn mark_dirty_id(&mut self, id: RoleId) {
        self.pending.insert(id);
    }

    pub fn is_dirty(&self, registry: &RoleRegistry, role: &str) -> Result<bool> {
        Ok(self.pending.contains(&registry.id(role)?))
    }

    /// Latest written version of a role; 0 if never written
    pub fn version(&self, role: &str) -> u32 {
        self.versions.get(role).copied().unwrap_or(0)
    }

    /// Latest written version of every role
    pub fn versions(&self) -> BTreeMap<String, u32> {
        self.versions.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }

    pub fn state(&self) -> &RepositoryState {
        &self.state
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    /// Write every dirty role, then clear the dirty set
    ///
    /// A dirty (or never written) targets-like role dirties snapshot, and a
    /// dirty snapshot dirties timestamp.
    pub fn write_all(&mut self, registry: &RoleRegistry, consistent: bool) -> Result<WriteReport> {
        let snapshot = registry.id(SNAPSHOT)?;
        let timestamp = registry.id(TIMESTAMP)?;

        for (id, role) in registry.targets_like() {
            if !self.versions.contains_key(role.name()) {
                self.pending.insert(id);
            }
        }
        if registry
            .targets_like()
            .any(|(id, _)| self.pending.contains(&id))
        {
            self.pending.insert(snapshot);
        }
        if self.pending.contains(&snapshot) {
            self.pending.insert(timestamp);
        }

        let mut order = Vec::with_capacity(self.pending.len());
        let root = registry.id(ROOT)?;
        if self.pending.contains(&root) {
            order.push(root);
        }
        order.extend(
            registry
                .targets_like()
                .map(|(id, _)| id)
                .filter(|id| self.pending.contains(id)),
        );
        order.extend([snapshot, timestamp].into_iter().filter(|id| self.pending.contains(id)));

        let mut report = WriteReport::default();
        for id in order {
            let role = registry.get(id);
            let version = self.version(role.name()) + 1;
            let signed = self.build_body(registry, role, version, consistent)?;

            let doc = SignedMetadata::sign(signed, role.signing_keys())?;
            let bytes = doc.to_bytes()?;

            let status = doc.threshold_status(&role.keyids(), role.threshold());
            if let Some(warning) = status.warning(role.name(), version) {
                report.warnings.push(warning);
            }

            debug!(
                role = %role.name(),
                version,
                signatures = doc.signatures.len(),
                length = bytes.len(),
                "Wrote document"
            );
            self.state.record(role.name(), doc, bytes, consistent);
            self.versions.insert(role.name().to_string(), version);
            report.written.push((role.name().to_string(), version));
        }

        self.pending.clear();
        info!(documents = report.written.len(), consistent, "Wrote dirty roles");
        Ok(report)
    }

    fn build_body(
        &self,
        registry: &RoleRegistry,
        role: &Role,
        version: u32,
        consistent: bool,
    ) -> Result<Signed> {
        let expires = self.clock.expires_for(role.kind());

        let signed = match role.kind() {
            RoleKind::Root => {
                let mut keys = BTreeMap::new();
                let mut roles = BTreeMap::new();
                for (_, top) in registry.iter().filter(|(_, r)| r.kind().is_top_level()) {
                    for key in top.verification_keys() {
                        keys.insert(key.keyid().to_string(), key.metadata());
                    }
                    roles.insert(
                        top.name().to_string(),
                        RoleKeys {
                            keyids: top.keyids(),
                            threshold: top.threshold(),
                        },
                    );
                }
                Signed::Root(RootMetadata {
                    consistent_snapshot: consistent,
                    expires,
                    keys,
                    roles,
                    spec_version: SPEC_VERSION.to_string(),
                    version,
                })
            }
            RoleKind::Targets | RoleKind::Delegated => {
                let custom = (role.kind() == RoleKind::Delegated).then(BTreeMap::new);
                let targets = role
                    .targets()
                    .iter()
                    .map(|(path, target)| {
                        let info = TargetFileInfo {
                            hashes: target.hashes.clone(),
                            length: target.length,
                            custom: custom.clone(),
                        };
                        (path.clone(), info)
                    })
                    .collect();

                let mut delegations = Delegations::default();
                for edge in role.delegations() {
                    let child = registry.get(edge.child());
                    for key in child.verification_keys() {
                        delegations
                            .keys
                            .insert(key.keyid().to_string(), key.metadata());
                    }
                    delegations.roles.push(DelegatedRoleEntry {
                        name: child.name().to_string(),
                        keyids: child.keyids(),
                        threshold: child.threshold(),
                        terminating: edge.is_terminating(),
                        paths: edge.paths().to_vec(),
                        path_hash_prefixes: edge.path_hash_prefixes().map(<[String]>::to_vec),
                    });
                }

                Signed::Targets(TargetsMetadata {
                    delegations,
                    expires,
                    spec_version: SPEC_VERSION.to_string(),
                    targets,
                    version,
                })
            }
            RoleKind::Snapshot => {
                let mut meta = BTreeMap::new();
                for (_, targets_role) in registry.targets_like() {
                    let info = self.reference(
                        targets_role.name(),
                        self.options.use_snapshot_length,
                        self.options.use_snapshot_hashes,
                    )?;
                    meta.insert(metadata_file(targets_role.name()), info);
                }
                Signed::Snapshot(SnapshotMetadata {
                    expires,
                    meta,
                    spec_version: SPEC_VERSION.to_string(),
                    version,
                })
            }
            RoleKind::Timestamp => {
                let info = self.reference(
                    SNAPSHOT,
                    self.options.use_timestamp_length,
                    self.options.use_timestamp_hashes,
                )?;
                let mut meta = BTreeMap::new();
                meta.insert(metadata_file(SNAPSHOT), info);
                Signed::Timestamp(TimestampMetadata {
                    expires,
                    meta,
                    spec_version: SPEC_VERSION.to_string(),
                    version,
                })
            }
        };
        Ok(signed)
    }

    /// Reference to the latest bytes written for a role
    fn reference(&self, role: &str, use_length: bool, use_hashes: bool) -> Result<MetaFileInfo> {
        let bytes = self
            .state
            .file(&metadata_file(role))
            .ok_or_else(|| FixtureError::MissingField(format!("no document written for {role}")))?;

        Ok(MetaFileInfo {
            hashes: use_hashes.then(|| Hashes::of(bytes)),
            length: use_length.then_some(bytes.len() as u64),
            version: self.version(role),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tuf_fixtures_core::types::TOP_LEVEL_ROLES;
    use tuf_fixtures_core::{KeyStore, Target};

    fn setup(options: RepositoryOptions) -> (RoleRegistry, VersionedMetadataStore) {
        let mut keys = KeyStore::new("store");
        let registry = RoleRegistry::bootstrap(&mut keys).unwrap();
        let mut store = VersionedMetadataStore::new(options, FixedClock::default());
        store.mark_dirty(&registry, &TOP_LEVEL_ROLES).unwrap();
        (registry, store)
    }

    fn meta(store: &VersionedMetadataStore, role: &str, file: &str) -> MetaFileInfo {
        store.state().latest(role).unwrap().signed.meta().unwrap()[file].clone()
    }

    #[test]
    fn test_first_write_is_version_one() {
        let (registry, mut store) = setup(RepositoryOptions::default());
        let report = store.write_all(&registry, true).unwrap();

        let written: Vec<_> = report.written.iter().map(|(r, v)| (r.as_str(), *v)).collect();
        assert_eq!(
            written,
            vec![("root", 1), ("targets", 1), ("snapshot", 1), ("timestamp", 1)]
        );
        assert!(report.warnings.is_empty());
        assert!(!store.is_dirty(&registry, "root").unwrap());
    }

    #[test]
    fn test_consistent_naming() {
        let (registry, mut store) = setup(RepositoryOptions::default());
        store.write_all(&registry, true).unwrap();

        let state = store.state();
        for role in ["root", "targets", "snapshot"] {
            assert!(state.file(&versioned_file(role, 1)).is_some());
            assert_eq!(state.file(&versioned_file(role, 1)), state.file(&metadata_file(role)));
        }
        assert!(state.file("timestamp.json").is_some());
        assert!(state.file("1.timestamp.json").is_none());
    }

    #[test]
    fn test_inconsistent_naming() {
        let (registry, mut store) = setup(RepositoryOptions::default());
        store.write_all(&registry, false).unwrap();

        let names: Vec<_> = store.state().files().map(|(name, _)| name).collect();
        assert_eq!(
            names,
            vec!["root.json", "snapshot.json", "targets.json", "timestamp.json"]
        );
    }

    #[test]
    fn test_dirty_targets_cascades() {
        let (mut registry, mut store) = setup(RepositoryOptions::default());
        store.write_all(&registry, true).unwrap();

        registry.add_target("targets", Target::new("t.txt", "x")).unwrap();
        store.mark_dirty(&registry, &["targets"]).unwrap();
        let report = store.write_all(&registry, true).unwrap();

        let roles: Vec<_> = report.written.iter().map(|(r, _)| r.as_str()).collect();
        assert_eq!(roles, vec!["targets", "snapshot", "timestamp"]);
        assert_eq!(store.version("root"), 1);
        assert_eq!(store.version("targets"), 2);
        assert_eq!(meta(&store, "snapshot", "targets.json").version, 2);
        assert_eq!(meta(&store, "timestamp", "snapshot.json").version, 2);
    }

    #[test]
    fn test_nothing_dirty_writes_nothing() {
        let (registry, mut store) = setup(RepositoryOptions::default());
        store.write_all(&registry, true).unwrap();

        let report = store.write_all(&registry, true).unwrap();
        assert!(report.written.is_empty());
        assert_eq!(store.version("timestamp"), 1);
    }

    #[test]
    fn test_reference_toggles() {
        let options = RepositoryOptions::default()
            .lengths(false, true)
            .hashes(true, false);
        let (registry, mut store) = setup(options);
        store.write_all(&registry, true).unwrap();

        let snapshot_bytes = store.state().file("snapshot.json").unwrap().to_vec();
        let in_timestamp = meta(&store, "timestamp", "snapshot.json");
        assert_eq!(in_timestamp.length, None);
        assert_eq!(in_timestamp.hashes, Some(Hashes::of(&snapshot_bytes)));

        let targets_bytes = store.state().file("targets.json").unwrap().to_vec();
        let in_snapshot = meta(&store, "snapshot", "targets.json");
        assert_eq!(in_snapshot.length, Some(targets_bytes.len() as u64));
        assert_eq!(in_snapshot.hashes, None);
    }

    #[test]
    fn test_under_threshold_document_is_written() {
        let (mut registry, mut store) = setup(RepositoryOptions::default());
        registry.set_threshold("timestamp", 2).unwrap();

        let report = store.write_all(&registry, true).unwrap();
        assert_eq!(store.state().latest("timestamp").unwrap().signatures.len(), 1);
        assert_eq!(
            report.warnings,
            vec![ConsistencyWarning::UnderThresholdSignatures {
                role: "timestamp".into(),
                version: 1,
                signatures: 1,
                threshold: 2,
            }]
        );
    }

    #[test]
    fn test_root_lists_top_level_keys() {
        let (registry, mut store) = setup(RepositoryOptions::default());
        store.write_all(&registry, true).unwrap();

        let Signed::Root(root) = &store.state().latest("root").unwrap().signed else {
            panic!("root document expected");
        };
        assert!(root.consistent_snapshot);
        assert_eq!(root.keys.len(), 4);
        assert_eq!(root.roles["timestamp"].threshold, 1);
        assert_eq!(root.expires, "2020-12-31T00:00:00Z");
    }

    #[test]
    fn test_delegated_role_document() {
        let (mut registry, mut store) = setup(RepositoryOptions::default());
        let mut keys = KeyStore::new("delegate");
        let key = keys.next_key().unwrap();
        registry
            .delegate("targets", "unclaimed", vec![key.public_key()], vec!["a_*.txt".into()], 1, false, None)
            .unwrap();
        registry.load_signing_key("unclaimed", key).unwrap();
        registry.add_target("unclaimed", Target::new("a_1.txt", "a")).unwrap();

        store.write_all(&registry, true).unwrap();

        let Signed::Targets(targets) = &store.state().latest("targets").unwrap().signed else {
            panic!("targets document expected");
        };
        assert_eq!(targets.delegations.roles.len(), 1);
        assert_eq!(targets.delegations.roles[0].name, "unclaimed");
        assert_eq!(targets.delegations.keys.len(), 1);

        let Signed::Targets(unclaimed) = &store.state().latest("unclaimed").unwrap().signed else {
            panic!("targets document expected");
        };
        assert_eq!(unclaimed.targets["a_1.txt"].length, 1);
        assert_eq!(unclaimed.targets["a_1.txt"].custom, Some(BTreeMap::new()));

        let snapshot_meta = store.state().latest("snapshot").unwrap().signed.meta().unwrap();
        assert!(snapshot_meta.contains_key("unclaimed.json"));
    }
}
