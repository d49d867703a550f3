//! Configuration for repositories, publishes and the generator binary

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;
use tuf_fixtures_core::types::{DEFAULT_EPOCH, TARGETS};
use tuf_fixtures_core::{FixedClock, FixtureError, Result};

/// Repository-wide settings fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryOptions {
    /// Default naming mode for publishes
    pub consistent_snapshot: bool,
    /// Embed snapshot's length in timestamp
    pub use_timestamp_length: bool,
    /// Embed snapshot's hashes in timestamp
    pub use_timestamp_hashes: bool,
    /// Embed each targets-like document's length in snapshot
    pub use_snapshot_length: bool,
    /// Embed each targets-like document's hashes in snapshot
    pub use_snapshot_hashes: bool,
}

impl Default for RepositoryOptions {
    fn default() -> Self {
        Self {
            consistent_snapshot: true,
            use_timestamp_length: true,
            use_timestamp_hashes: true,
            use_snapshot_length: false,
            use_snapshot_hashes: false,
        }
    }
}

impl RepositoryOptions {
    /// Set the default naming mode
    pub fn consistent(mut self, consistent: bool) -> Self {
        self.consistent_snapshot = consistent;
        self
    }

    /// Set both length toggles
    pub fn lengths(mut self, timestamp: bool, snapshot: bool) -> Self {
        self.use_timestamp_length = timestamp;
        self.use_snapshot_length = snapshot;
        self
    }

    /// Set both hash toggles
    pub fn hashes(mut self, timestamp: bool, snapshot: bool) -> Self {
        self.use_timestamp_hashes = timestamp;
        self.use_snapshot_hashes = snapshot;
        self
    }
}

/// Settings for one publish
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOptions {
    /// Copy the published server metadata into the client store
    pub export_client: bool,
    /// Override the repository's naming mode for this publish
    pub consistent: Option<bool>,
}

impl PublishOptions {
    /// Publish and export the client state
    pub fn with_client() -> Self {
        Self {
            export_client: true,
            consistent: None,
        }
    }

    /// Force a naming mode for this publish
    pub fn consistent(mut self, consistent: bool) -> Self {
        self.consistent = Some(consistent);
        self
    }
}

/// Settings for a delegation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegateOptions {
    /// Delegating role
    pub parent: String,
    /// Threshold of a newly created child
    pub threshold: u32,
    pub terminating: bool,
    /// Select paths by hash prefix instead of, or in addition to, patterns
    pub path_hash_prefixes: Option<Vec<String>>,
}

impl Default for DelegateOptions {
    fn default() -> Self {
        Self {
            parent: TARGETS.to_string(),
            threshold: 1,
            terminating: false,
            path_hash_prefixes: None,
        }
    }
}

impl DelegateOptions {
    /// Delegate from a role other than `targets`
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = parent.into();
        self
    }

    pub fn threshold(mut self, threshold: u32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Make the delegation terminating
    pub fn terminating(mut self) -> Self {
        self.terminating = true;
        self
    }

    pub fn path_hash_prefixes<S: Into<String>>(mut self, prefixes: impl IntoIterator<Item = S>) -> Self {
        self.path_hash_prefixes = Some(prefixes.into_iter().map(Into::into).collect());
        self
    }
}

/// Settings of the generator binary
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Directory fixtures are written under
    pub output_dir: PathBuf,
    /// Pinned unix time
    pub epoch: i64,
    /// Seed every fixture's key store is derived from
    pub key_seed: String,
    /// Build only these fixtures
    pub only: Option<Vec<String>>,
    pub log_level: Level,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("fixtures"),
            epoch: DEFAULT_EPOCH,
            key_seed: "tuf-fixtures".to_string(),
            only: None,
            log_level: Level::INFO,
        }
    }
}

impl GeneratorConfig {
    /// Read configuration from `TUF_FIXTURES_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through a variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup("TUF_FIXTURES_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }

        if let Some(epoch) = lookup("TUF_FIXTURES_EPOCH") {
            config.epoch = epoch.trim().parse().map_err(|_| {
                FixtureError::InvalidConfig(format!("TUF_FIXTURES_EPOCH is not a unix time: {epoch}"))
            })?;
        }

        if let Some(seed) = lookup("TUF_FIXTURES_KEY_SEED") {
            if seed.is_empty() {
                return Err(FixtureError::InvalidConfig(
                    "TUF_FIXTURES_KEY_SEED must not be empty".into(),
                ));
            }
            config.key_seed = seed;
        }

        if let Some(only) = lookup("TUF_FIXTURES_ONLY") {
            let names: Vec<String> = only
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if !names.is_empty() {
                config.only = Some(names);
            }
        }

        if let Some(level) = lookup("TUF_FIXTURES_LOG_LEVEL") {
            config.log_level = Level::from_str(level.trim()).map_err(|_| {
                FixtureError::InvalidConfig(format!("TUF_FIXTURES_LOG_LEVEL is not a level: {level}"))
            })?;
        }

        Ok(config)
    }

    /// The pinned clock for this run
    pub fn clock(&self) -> Result<FixedClock> {
        FixedClock::from_unix(self.epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_repository_defaults() {
        let options = RepositoryOptions::default();
        assert!(options.consistent_snapshot);
        assert!(options.use_timestamp_length);
        assert!(options.use_timestamp_hashes);
        assert!(!options.use_snapshot_length);
        assert!(!options.use_snapshot_hashes);

        let options = options.consistent(false).lengths(false, true);
        assert!(!options.consistent_snapshot);
        assert!(!options.use_timestamp_length);
        assert!(options.use_snapshot_length);
    }

    #[test]
    fn test_delegate_defaults() {
        let options = DelegateOptions::default();
        assert_eq!(options.parent, "targets");
        assert_eq!(options.threshold, 1);
        assert!(!options.terminating);
        assert!(options.path_hash_prefixes.is_none());

        let options = options.parent("a").terminating().path_hash_prefixes(["ab"]);
        assert_eq!(options.parent, "a");
        assert!(options.terminating);
        assert_eq!(options.path_hash_prefixes, Some(vec!["ab".to_string()]));
    }

    #[test]
    fn test_generator_defaults() {
        let config = GeneratorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, GeneratorConfig::default());
        assert_eq!(config.clock().unwrap(), FixedClock::default());
    }

    #[test]
    fn test_generator_from_vars() {
        let config = GeneratorConfig::from_lookup(lookup(&[
            ("TUF_FIXTURES_OUTPUT_DIR", "/tmp/out"),
            ("TUF_FIXTURES_EPOCH", "0"),
            ("TUF_FIXTURES_KEY_SEED", "seed"),
            ("TUF_FIXTURES_ONLY", "Simple, HashedBins,"),
            ("TUF_FIXTURES_LOG_LEVEL", "debug"),
        ]))
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.epoch, 0);
        assert_eq!(config.key_seed, "seed");
        assert_eq!(
            config.only,
            Some(vec!["Simple".to_string(), "HashedBins".to_string()])
        );
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn test_generator_rejects_bad_values() {
        let err = GeneratorConfig::from_lookup(lookup(&[("TUF_FIXTURES_EPOCH", "soon")])).unwrap_err();
        assert!(err.is_configuration_error());

        let err = GeneratorConfig::from_lookup(lookup(&[("TUF_FIXTURES_LOG_LEVEL", "loud")])).unwrap_err();
        assert!(err.is_configuration_error());

        let err = GeneratorConfig::from_lookup(lookup(&[("TUF_FIXTURES_KEY_SEED", "")])).unwrap_err();
        assert!(err.is_configuration_error());
    }
}
