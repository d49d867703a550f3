//! Common types used across the fixture builder

use crate::canonical::Hashes;
use crate::error::{FixtureError, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Name of the root role
pub const ROOT: &str = "root";
/// Name of the top-level targets role
pub const TARGETS: &str = "targets";
/// Name of the snapshot role
pub const SNAPSHOT: &str = "snapshot";
/// Name of the timestamp role
pub const TIMESTAMP: &str = "timestamp";

/// The four roles every repository is bootstrapped with, in key issue order
pub const TOP_LEVEL_ROLES: [&str; 4] = [ROOT, TARGETS, SNAPSHOT, TIMESTAMP];

/// Metadata format version written into every document
pub const SPEC_VERSION: &str = "1.0.0";

/// Default pinned time (2020-01-01T00:00:00Z)
pub const DEFAULT_EPOCH: i64 = 1_577_836_800;

/// Format of `expires` fields
pub const EXPIRES_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Kind of a role, which decides its document shape
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    Root,
    Targets,
    Snapshot,
    Timestamp,
    /// A targets role created by delegation
    Delegated,
}

impl RoleKind {
    /// Kind of the role with a given name
    pub fn for_name(name: &str) -> Self {
        match name {
            ROOT => RoleKind::Root,
            TARGETS => RoleKind::Targets,
            SNAPSHOT => RoleKind::Snapshot,
            TIMESTAMP => RoleKind::Timestamp,
            _ => RoleKind::Delegated,
        }
    }

    /// Whether the role's keys are listed in root
    pub fn is_top_level(&self) -> bool {
        !matches!(self, RoleKind::Delegated)
    }

    /// Whether the role publishes a targets document
    pub fn is_targets_like(&self) -> bool {
        matches!(self, RoleKind::Targets | RoleKind::Delegated)
    }

    /// How long a freshly written document stays valid
    pub fn lifetime(&self) -> Duration {
        match self {
            RoleKind::Root => Duration::days(365),
            RoleKind::Targets | RoleKind::Delegated => Duration::days(90),
            RoleKind::Snapshot => Duration::days(30),
            RoleKind::Timestamp => Duration::days(30),
        }
    }
}

/// Wall clock pinned for a whole generation run
///
/// Every time-derived field comes from here so that fixtures are
/// byte-reproducible.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    /// Pin the clock at a unix timestamp
    pub fn from_unix(seconds: i64) -> Result<Self> {
        let now = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .ok_or_else(|| FixtureError::InvalidConfig(format!("epoch out of range: {seconds}")))?;
        Ok(Self { now })
    }

    /// The pinned time
    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    /// Expiration for a document of the given kind written now
    pub fn expires_for(&self, kind: RoleKind) -> String {
        (self.now + kind.lifetime()).format(EXPIRES_FORMAT).to_string()
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        let pinned = std::time::UNIX_EPOCH + std::time::Duration::from_secs(DEFAULT_EPOCH as u64);
        Self {
            now: DateTime::<Utc>::from(pinned),
        }
    }
}

/// A target file owned by a role
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Path relative to the targets directory
    pub path: String,
    /// File content
    pub content: Vec<u8>,
    /// Content length in bytes
    pub length: u64,
    /// Content digests
    pub hashes: Hashes,
}

impl Target {
    /// Create a target, deriving length and hashes from the content
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let content = content.into();
        Self {
            path: path.into(),
            length: content.len() as u64,
            hashes: Hashes::of(&content),
            content,
        }
    }

    /// Default content for a target created without explicit content
    pub fn default_content(path: &str) -> Vec<u8> {
        format!("Contents: {path}").into_bytes()
    }
}
