//! Error, warning and tag types for the fixture builder

use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using FixtureError
pub type Result<T> = std::result::Result<T, FixtureError>;

/// Errors that can occur while building a fixture
///
/// Every variant is fatal: fixture generation must fail loudly rather than
/// emit a broken fixture. Misconfigurations that fixtures deliberately model
/// are reported as [`ConsistencyWarning`] instead.
#[derive(Error, Debug)]
pub enum FixtureError {
    /// A role name was referenced that the registry does not know
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// A role with this name already exists
    #[error("Role already exists: {0}")]
    DuplicateRole(String),

    /// Delegation from a parent that does not exist
    #[error("Delegation to nonexistent parent: {0}")]
    UnknownParent(String),

    /// Delegation from a role that cannot delegate (only targets-like roles can)
    #[error("Role '{0}' cannot delegate")]
    NotADelegator(String),

    /// Threshold must be at least one
    #[error("Invalid threshold {threshold} for role '{role}'")]
    InvalidThreshold { role: String, threshold: u32 },

    /// Path pattern could not be compiled
    #[error("Invalid path pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// Target path already owned by a role
    #[error("Target already exists: {0}")]
    DuplicateTarget(String),

    /// Target path that would land outside the targets directory
    #[error("Target path must be relative and stay inside the targets directory: {0}")]
    InvalidTargetPath(String),

    /// The same key was attached to a role twice
    #[error("Role '{role}' already has key {keyid}")]
    DuplicateKey { role: String, keyid: String },

    /// Key id not attached to the role
    #[error("Role '{role}' has no key {keyid}")]
    UnknownKey { role: String, keyid: String },

    /// Key index outside the role's verification keys
    #[error("Role '{role}' has {count} keys, no key at index {index}")]
    KeyIndexOutOfRange {
        role: String,
        index: usize,
        count: usize,
    },

    /// Invalid generator configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem failure
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Missing required field in a persisted document
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Persisted document has an unexpected shape
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    Crypto(String),
}

impl FixtureError {
    /// Build an I/O error carrying the path it happened at
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        FixtureError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a configuration error (unknown or duplicate
    /// names, bad thresholds, bad patterns, bad settings)
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            FixtureError::UnknownRole(_)
                | FixtureError::DuplicateRole(_)
                | FixtureError::UnknownParent(_)
                | FixtureError::NotADelegator(_)
                | FixtureError::InvalidThreshold { .. }
                | FixtureError::InvalidPattern { .. }
                | FixtureError::DuplicateTarget(_)
                | FixtureError::InvalidTargetPath(_)
                | FixtureError::DuplicateKey { .. }
                | FixtureError::UnknownKey { .. }
                | FixtureError::KeyIndexOutOfRange { .. }
                | FixtureError::InvalidConfig(_)
        )
    }
}

impl From<ed25519_dalek::SignatureError> for FixtureError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        FixtureError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for FixtureError {
    fn from(err: serde_json::Error) -> Self {
        FixtureError::Serialization(err.to_string())
    }
}

/// Non-fatal misconfiguration
///
/// These are permitted on purpose so that misconfiguration fixtures can be
/// built. They are logged when raised and accumulated by the builder.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyWarning {
    /// Threshold is higher than the number of verification keys
    #[error("role '{role}' has threshold {threshold} but only {keys} verification keys")]
    ThresholdExceedsKeys { role: String, threshold: u32, keys: usize },

    /// A key removal left the role below its threshold
    #[error("removing a key from role '{role}' left {keys} keys for threshold {threshold}")]
    RemovalBelowThreshold { role: String, threshold: u32, keys: usize },

    /// A document was written with fewer signatures than its threshold
    #[error("role '{role}' version {version} carries {signatures} signatures for threshold {threshold}")]
    UnderThresholdSignatures {
        role: String,
        version: u32,
        signatures: usize,
        threshold: u32,
    },
}

/// Behaviour a fixture exercises that clients are not expected to support
///
/// Building such a fixture always succeeds; the tag is recorded in the
/// fixture manifest instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedFeature {
    /// Delegation selected by `path_hash_prefixes`
    PathHashPrefixes,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_category() {
        assert!(FixtureError::UnknownRole("x".into()).is_configuration_error());
        assert!(FixtureError::DuplicateRole("x".into()).is_configuration_error());
        assert!(FixtureError::UnknownParent("x".into()).is_configuration_error());
        assert!(FixtureError::InvalidTargetPath("../x".into()).is_configuration_error());

        let io = FixtureError::io(
            "/nowhere",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(!io.is_configuration_error());
        assert!(io.to_string().contains("/nowhere"));
    }

    #[test]
    fn test_warning_serialization() {
        let warning = ConsistencyWarning::ThresholdExceedsKeys {
            role: "timestamp".into(),
            threshold: 2,
            keys: 1,
        };

        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "threshold_exceeds_keys");
        assert_eq!(json["role"], "timestamp");
        assert_eq!(
            warning.to_string(),
            "role 'timestamp' has threshold 2 but only 1 verification keys"
        );
    }

    #[test]
    fn test_unsupported_feature_tag() {
        let json = serde_json::to_string(&UnsupportedFeature::PathHashPrefixes).unwrap();
        assert_eq!(json, "\"path_hash_prefixes\"");
    }
}
