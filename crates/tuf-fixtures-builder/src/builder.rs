//! Fixture Builder
//!
//! A mutable session over one fixture directory. Operations change the role
//! model and mark the affected roles dirty; nothing reaches disk until
//! [`FixtureBuilder::publish`], except target content which is written as
//! soon as a target is created.
//!
//! Publishing writes every dirty role, stages the complete metadata set next
//! to `server/metadata` and swaps it in. The client store is only touched by
//! [`FixtureBuilder::export_client_state`], so a client exported earlier
//! keeps its point-in-time view while the server moves on.

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};
use tracing::{debug, info, warn};
use tuf_fixtures_core::canonical::sha256_hex;
use tuf_fixtures_core::types::{ROOT, TIMESTAMP, TOP_LEVEL_ROLES};
use tuf_fixtures_core::{
    ConsistencyWarning, FixedClock, FixtureError, KeyStore, Result, SignedMetadata, Target,
    ThresholdStatus, UnsupportedFeature,
};

use crate::attacks::AttackInjector;
use crate::config::{DelegateOptions, PublishOptions, RepositoryOptions};
use crate::roles::RoleRegistry;
use crate::storage::{fs, metadata_file, FixtureLayout, VersionedMetadataStore};

/// Number of distinct leading hex digits of a SHA-256
const HEX_DIGITS: usize = 16;

/// A delegated role selected by path hash prefix
#[derive(Debug, Clone)]
struct HashBin {
    role: String,
    prefixes: Vec<String>,
}

/// Summary written to `fixture.json` after every publish
#[derive(Debug, Serialize)]
struct FixtureManifest<'a> {
    name: &'a str,
    options: &'a RepositoryOptions,
    publishes: u32,
    unsupported_features: &'a BTreeSet<UnsupportedFeature>,
    warnings: &'a [ConsistencyWarning],
    versions: BTreeMap<String, u32>,
}

/// Builder session for one fixture
#[derive(Debug)]
pub struct FixtureBuilder {
    name: String,
    layout: FixtureLayout,
    options: RepositoryOptions,
    keys: KeyStore,
    registry: RoleRegistry,
    store: VersionedMetadataStore,
    /// Every target file written, signed or not
    files: BTreeMap<String, Target>,
    hash_bins: Vec<HashBin>,
    unsupported: BTreeSet<UnsupportedFeature>,
    publishes: u32,
}

impl FixtureBuilder {
    /// Create a repository at `<base_dir>/<name>`
    ///
    /// Anything already at that path is removed. The four top-level roles
    /// get the first four keys of `keys` and start dirty.
    pub fn create(
        name: impl Into<String>,
        base_dir: impl AsRef<Path>,
        options: RepositoryOptions,
        mut keys: KeyStore,
        clock: FixedClock,
    ) -> Result<Self> {
        let name = name.into();
        let layout = FixtureLayout::new(base_dir.as_ref().join(&name));

        fs::remove_dir_if_exists(layout.root())?;
        std::fs::create_dir_all(layout.root()).map_err(|e| FixtureError::io(layout.root(), e))?;

        let registry = RoleRegistry::bootstrap(&mut keys)?;
        let mut store = VersionedMetadataStore::new(options, clock);
        store.mark_dirty(&registry, &TOP_LEVEL_ROLES)?;

        info!(
            fixture = %name,
            dir = %layout.root().display(),
            consistent = options.consistent_snapshot,
            "Created fixture repository"
        );

        Ok(Self {
            name,
            layout,
            options,
            keys,
            registry,
            store,
            files: BTreeMap::new(),
            hash_bins: Vec::new(),
            unsupported: BTreeSet::new(),
            publishes: 0,
        })
    }

    /// Create a repository with default options, keys seeded by its name and
    /// the default pinned clock
    pub fn with_defaults(name: impl Into<String>, base_dir: impl AsRef<Path>) -> Result<Self> {
        let name = name.into();
        let keys = KeyStore::new(name.clone());
        Self::create(name, base_dir, RepositoryOptions::default(), keys, FixedClock::default())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn layout(&self) -> &FixtureLayout {
        &self.layout
    }

    pub fn options(&self) -> &RepositoryOptions {
        &self.options
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn store(&self) -> &VersionedMetadataStore {
        &self.store
    }

    /// Latest version the builder wrote for a role; 0 if never written
    pub fn version(&self, role: &str) -> u32 {
        self.store.version(role)
    }

    /// Warnings recorded so far
    pub fn warnings(&self) -> &[ConsistencyWarning] {
        self.registry.warnings()
    }

    /// Client-unsupported behaviour this fixture exercises
    pub fn unsupported_features(&self) -> &BTreeSet<UnsupportedFeature> {
        &self.unsupported
    }

    // =========================================================================
    // Targets
    // =========================================================================

    /// Create a target with default content, optionally signed by a role
    pub fn create_target(&mut self, path: &str, signing_role: Option<&str>) -> Result<&mut Self> {
        let content = Target::default_content(path);
        self.create_target_with_content(path, &content, signing_role)
    }

    /// Create a target file that no role signs
    pub fn create_unsigned_target(&mut self, path: &str) -> Result<&mut Self> {
        self.create_target(path, None)
    }

    /// Create a target with explicit content, optionally signed by a role
    pub fn create_target_with_content(
        &mut self,
        path: &str,
        content: &[u8],
        signing_role: Option<&str>,
    ) -> Result<&mut Self> {
        check_target_path(path)?;
        if self.files.contains_key(path) {
            return Err(FixtureError::DuplicateTarget(path.to_string()));
        }
        if let Some(role) = signing_role {
            self.registry.id(role)?;
        }

        let target = Target::new(path, content);
        fs::write_atomic(&self.layout.server_targets().join(path), content)?;
        self.files.insert(path.to_string(), target.clone());

        match signing_role {
            Some(role) => self.sign_target(role, target)?,
            None => debug!(path, "Created unsigned target"),
        }
        Ok(self)
    }

    fn sign_target(&mut self, role: &str, target: Target) -> Result<()> {
        self.registry.add_target(role, target)?;
        self.store.mark_dirty(&self.registry, &[role])
    }

    // =========================================================================
    // Delegation
    // =========================================================================

    /// Delegate paths to a role, creating it with a fresh key if absent
    pub fn delegate(&mut self, name: &str, paths: &[&str], options: DelegateOptions) -> Result<&mut Self> {
        if !self.registry.contains(&options.parent) {
            return Err(FixtureError::UnknownParent(options.parent));
        }

        let new_key = if self.registry.contains(name) {
            None
        } else {
            Some(self.keys.next_key()?)
        };
        let verification_keys = new_key.iter().map(|k| k.public_key()).collect();

        let tagged = options.path_hash_prefixes.is_some();
        self.registry.delegate(
            &options.parent,
            name,
            verification_keys,
            paths.iter().map(|p| p.to_string()).collect(),
            options.threshold,
            options.terminating,
            options.path_hash_prefixes,
        )?;
        if let Some(key) = new_key {
            self.registry.load_signing_key(name, key)?;
        }

        if tagged && self.unsupported.insert(UnsupportedFeature::PathHashPrefixes) {
            info!(fixture = %self.name, role = %name, "Fixture uses path hash prefixes");
        }

        self.store.mark_dirty(&self.registry, &[options.parent.as_str(), name])?;
        Ok(self)
    }

    /// Delegate from `targets` to `count` roles selected by the first hex
    /// digit of each path's SHA-256
    ///
    /// `count` must divide 16. Bins are named by their digit range, e.g.
    /// `0-1` for the first of eight bins.
    pub fn create_hash_bins(&mut self, count: usize, terminating: bool) -> Result<&mut Self> {
        if count == 0 || HEX_DIGITS % count != 0 {
            return Err(FixtureError::InvalidConfig(format!(
                "hash bin count must divide {HEX_DIGITS}, got {count}"
            )));
        }

        let per_bin = HEX_DIGITS / count;
        for bin in 0..count {
            let prefixes: Vec<String> = (bin * per_bin..(bin + 1) * per_bin)
                .map(|digit| format!("{digit:x}"))
                .collect();
            let role = match (prefixes.first(), prefixes.last()) {
                (Some(first), Some(last)) if first != last => format!("{first}-{last}"),
                _ => prefixes.concat(),
            };

            let mut options = DelegateOptions::default().path_hash_prefixes(prefixes.clone());
            options.terminating = terminating;
            self.delegate(&role, &[], options)?;
            self.hash_bins.push(HashBin { role, prefixes });
        }
        Ok(self)
    }

    /// Sign an existing target by the hash bin covering its path
    pub fn add_to_hash_bin(&mut self, path: &str) -> Result<&mut Self> {
        let target = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| FixtureError::InvalidConfig(format!("no target file at {path}")))?;

        let digest = sha256_hex(path.as_bytes());
        let role = self
            .hash_bins
            .iter()
            .find(|bin| bin.prefixes.iter().any(|p| digest.starts_with(p.as_str())))
            .map(|bin| bin.role.clone())
            .ok_or_else(|| FixtureError::InvalidConfig(format!("no hash bin covers {path}")))?;

        self.sign_target(&role, target)?;
        Ok(self)
    }

    // =========================================================================
    // Keys and Thresholds
    // =========================================================================

    /// Issue a new key and make it both trusted and signing for a role
    pub fn add_key(&mut self, role: &str) -> Result<&mut Self> {
        self.registry.id(role)?;
        let key = self.keys.next_key()?;
        self.registry.add_verification_key(role, key.public_key())?;
        self.registry.load_signing_key(role, key)?;
        self.mark_key_change(role)
    }

    /// Stop trusting the key at an index of the role's key list
    ///
    /// The private key stays loaded, so later documents still carry its
    /// signature.
    pub fn revoke_key(&mut self, role: &str, key_index: usize) -> Result<&mut Self> {
        self.registry.remove_verification_key_at(role, key_index)?;
        self.mark_key_change(role)
    }

    pub fn set_threshold(&mut self, role: &str, threshold: u32) -> Result<&mut Self> {
        self.registry.set_threshold(role, threshold)?;
        self.mark_key_change(role)
    }

    /// Dirty a role and whoever lists its keys
    fn mark_key_change(&mut self, role: &str) -> Result<&mut Self> {
        let id = self.registry.id(role)?;
        self.store.mark_dirty_id(id);

        if self.registry.get(id).kind().is_top_level() {
            self.store.mark_dirty(&self.registry, &[ROOT])?;
        } else {
            for parent in self.registry.delegators_of(role)? {
                self.store.mark_dirty_id(parent);
            }
        }
        Ok(self)
    }

    // =========================================================================
    // Publishing
    // =========================================================================

    /// Flag roles for rewrite at the next publish
    pub fn mark_dirty(&mut self, roles: &[&str]) -> Result<&mut Self> {
        self.store.mark_dirty(&self.registry, roles)?;
        Ok(self)
    }

    /// Force the next publish to advance every top-level role
    pub fn invalidate(&mut self) -> Result<&mut Self> {
        self.store.mark_dirty(&self.registry, &TOP_LEVEL_ROLES)?;
        debug!(fixture = %self.name, "Invalidated top-level roles");
        Ok(self)
    }

    /// Write dirty roles and atomically replace the live server metadata
    pub fn publish(&mut self, options: PublishOptions) -> Result<&mut Self> {
        let consistent = options.consistent.unwrap_or(self.options.consistent_snapshot);

        let report = self.store.write_all(&self.registry, consistent)?;
        for warning in report.warnings {
            self.registry.record_warning(warning);
        }

        let live = self.layout.server_metadata();
        let staged = fs::stage_files(&live, self.store.state().files())?;
        fs::swap_dir(&staged, &live)?;

        if consistent {
            self.write_consistent_targets()?;
        }

        self.publishes += 1;
        info!(
            fixture = %self.name,
            publish = self.publishes,
            documents = report.written.len(),
            timestamp = self.store.version(TIMESTAMP),
            consistent,
            "Published server metadata"
        );

        if options.export_client {
            self.export_client_state()?;
        }
        self.write_manifest()?;
        Ok(self)
    }

    /// Copy the live server metadata into the client store
    ///
    /// This is a one-shot copy; later publishes do not update it.
    pub fn export_client_state(&mut self) -> Result<&mut Self> {
        let live = self.layout.client_metadata();
        let staged = fs::stage_copy(&self.layout.server_metadata(), &live)?;
        fs::swap_dir(&staged, &live)?;

        info!(fixture = %self.name, dir = %live.display(), "Exported client state");
        Ok(self)
    }

    /// Store each signed target under `<sha256>.<name>` and `<sha512>.<name>`
    fn write_consistent_targets(&self) -> Result<()> {
        let targets_dir = self.layout.server_targets();

        for (_, role) in self.registry.targets_like() {
            for target in role.targets().values() {
                let path = Path::new(&target.path);
                let file_name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .ok_or_else(|| FixtureError::InvalidConfig(format!("bad target path {}", target.path)))?;
                let dir = match path.parent() {
                    Some(parent) => targets_dir.join(parent),
                    None => targets_dir.clone(),
                };

                for digest in [&target.hashes.sha256, &target.hashes.sha512] {
                    fs::write_atomic(&dir.join(format!("{digest}.{file_name}")), &target.content)?;
                }
            }
        }
        Ok(())
    }

    fn write_manifest(&self) -> Result<()> {
        let manifest = FixtureManifest {
            name: &self.name,
            options: &self.options,
            publishes: self.publishes,
            unsupported_features: &self.unsupported,
            warnings: self.registry.warnings(),
            versions: self.store.versions(),
        };
        fs::write_atomic(&self.layout.manifest(), &serde_json::to_vec_pretty(&manifest)?)
    }

    // =========================================================================
    // Inspection and Low-Level Access
    // =========================================================================

    /// Roles consulted for a target path, in evaluation order
    pub fn resolve_path(&self, path: &str) -> Result<Vec<String>> {
        Ok(self
            .registry
            .resolve_path(path)?
            .into_iter()
            .map(|role| role.name().to_string())
            .collect())
    }

    /// Read a server metadata file as JSON
    pub fn read(&self, file: &str) -> Result<Value> {
        read_json(&self.layout.server_metadata().join(file))
    }

    /// Read a client metadata file as JSON
    pub fn read_client(&self, file: &str) -> Result<Value> {
        read_json(&self.layout.client_metadata().join(file))
    }

    /// Overwrite a server metadata file with a JSON document
    pub fn write(&self, file: &str, doc: &Value) -> Result<()> {
        self.write_raw(file, &serde_json::to_vec_pretty(doc)?)
    }

    /// Overwrite a server metadata file with arbitrary bytes
    pub fn write_raw(&self, file: &str, bytes: &[u8]) -> Result<()> {
        let path = self.layout.server_metadata().join(file);
        fs::write_atomic(&path, bytes)?;
        warn!(fixture = %self.name, file, length = bytes.len(), "Overwrote server metadata");
        Ok(())
    }

    /// Whether a server metadata file exists
    pub fn server_file_exists(&self, file: &str) -> bool {
        self.layout.server_metadata().join(file).is_file()
    }

    /// Version of a role's document as currently served
    pub fn server_version(&self, role: &str) -> Result<u32> {
        let file = metadata_file(role);
        document_version(&self.read(&file)?, &file)
    }

    /// Version of a role's document in the client store
    pub fn client_version(&self, role: &str) -> Result<u32> {
        let file = metadata_file(role);
        document_version(&self.read_client(&file)?, &file)
    }

    /// Count the served document's signatures against the role's current
    /// keys and threshold
    pub fn threshold_status(&self, role: &str) -> Result<ThresholdStatus> {
        let config = self.registry.role(role)?;
        let bytes = fs::read(&self.layout.server_metadata().join(metadata_file(role)))?;
        let doc = SignedMetadata::from_bytes(&bytes)?;
        Ok(doc.threshold_status(&config.keyids(), config.threshold()))
    }

    /// Mutators that corrupt the published server state
    pub fn attacks(&mut self) -> AttackInjector<'_> {
        AttackInjector::new(self)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let bytes = fs::read(path)?;
    serde_json::from_slice(&bytes)
        .map_err(|e| FixtureError::InvalidDocument(format!("{}: {e}", path.display())))
}

fn document_version(doc: &Value, file: &str) -> Result<u32> {
    doc.pointer("/signed/version")
        .and_then(Value::as_u64)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| FixtureError::MissingField(format!("{file}: signed.version")))
}

/// Target paths are relative and made of plain names only
fn check_target_path(path: &str) -> Result<()> {
    let mut components = Path::new(path).components().peekable();
    if components.peek().is_none() || !components.all(|c| matches!(c, Component::Normal(_))) {
        return Err(FixtureError::InvalidTargetPath(path.to_string()));
    }
    Ok(())
}
