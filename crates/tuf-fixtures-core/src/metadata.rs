//! Typed metadata documents
//!
//! A document on disk is `{signatures, signed}` where `signed` is one of the
//! four role bodies, discriminated by its `_type` field. Maps are `BTreeMap`s
//! so pretty-printed output has a stable key order.

use crate::canonical::Hashes;
use crate::crypto::{KeyMetadata, KeyPair, SignatureEntry};
use crate::error::{ConsistencyWarning, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Keys and threshold of one role as listed in root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleKeys {
    pub keyids: Vec<String>,
    pub threshold: u32,
}

/// Signed body of root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootMetadata {
    pub consistent_snapshot: bool,
    pub expires: String,
    pub keys: BTreeMap<String, KeyMetadata>,
    pub roles: BTreeMap<String, RoleKeys>,
    pub spec_version: String,
    pub version: u32,
}

/// Length and digests of one target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFileInfo {
    pub hashes: Hashes,
    pub length: u64,
    /// Empty object on targets listed by delegated roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<BTreeMap<String, serde_json::Value>>,
}

/// One outgoing delegation of a targets-like role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegatedRoleEntry {
    pub name: String,
    pub keyids: Vec<String>,
    pub threshold: u32,
    pub terminating: bool,
    pub paths: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_hash_prefixes: Option<Vec<String>>,
}

/// Delegation block of a targets-like role, in priority order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delegations {
    pub keys: BTreeMap<String, KeyMetadata>,
    pub roles: Vec<DelegatedRoleEntry>,
}

/// Signed body of targets and every delegated role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetsMetadata {
    pub delegations: Delegations,
    pub expires: String,
    pub spec_version: String,
    pub targets: BTreeMap<String, TargetFileInfo>,
    pub version: u32,
}

/// Reference from snapshot or timestamp to another document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaFileInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hashes: Option<Hashes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    pub version: u32,
}

/// Signed body of snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub expires: String,
    pub meta: BTreeMap<String, MetaFileInfo>,
    pub spec_version: String,
    pub version: u32,
}

/// Signed body of timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampMetadata {
    pub expires: String,
    pub meta: BTreeMap<String, MetaFileInfo>,
    pub spec_version: String,
    pub version: u32,
}

/// Role-specific signed body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "_type", rename_all = "lowercase")]
pub enum Signed {
    Root(RootMetadata),
    Targets(TargetsMetadata),
    Snapshot(SnapshotMetadata),
    Timestamp(TimestampMetadata),
}

impl Signed {
    /// Document version
    pub fn version(&self) -> u32 {
        match self {
            Signed::Root(m) => m.version,
            Signed::Targets(m) => m.version,
            Signed::Snapshot(m) => m.version,
            Signed::Timestamp(m) => m.version,
        }
    }

    /// Document expiration
    pub fn expires(&self) -> &str {
        match self {
            Signed::Root(m) => &m.expires,
            Signed::Targets(m) => &m.expires,
            Signed::Snapshot(m) => &m.expires,
            Signed::Timestamp(m) => &m.expires,
        }
    }

    /// `meta` map of snapshot and timestamp documents
    pub fn meta(&self) -> Option<&BTreeMap<String, MetaFileInfo>> {
        match self {
            Signed::Snapshot(m) => Some(&m.meta),
            Signed::Timestamp(m) => Some(&m.meta),
            _ => None,
        }
    }
}

/// A complete document: signatures over a signed body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedMetadata {
    pub signatures: Vec<SignatureEntry>,
    pub signed: Signed,
}

impl SignedMetadata {
    /// Sign a body with every given key
    ///
    /// No threshold is enforced here: documents signed by fewer keys than
    /// their role requires are valid output.
    pub fn sign<'a>(signed: Signed, keys: impl IntoIterator<Item = &'a KeyPair>) -> Result<Self> {
        let signatures = keys
            .into_iter()
            .map(|key| key.sign(&signed))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { signatures, signed })
    }

    /// Pretty-printed JSON as written to disk
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a persisted document
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Distinct key ids among the signatures
    pub fn distinct_keyids(&self) -> BTreeSet<&str> {
        self.signatures.iter().map(|s| s.keyid.as_str()).collect()
    }

    /// Count signatures against a role's key configuration
    pub fn threshold_status(&self, authorized: &[String], threshold: u32) -> ThresholdStatus {
        let distinct_authorized = self
            .distinct_keyids()
            .into_iter()
            .filter(|keyid| authorized.iter().any(|a| a.as_str() == *keyid))
            .count();

        ThresholdStatus {
            raw_signatures: self.signatures.len(),
            distinct_authorized,
            threshold,
        }
    }
}

/// Result of counting a document's signatures against its threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ThresholdStatus {
    /// Every signature entry, duplicates included
    pub raw_signatures: usize,
    /// Distinct key ids that the role currently trusts
    pub distinct_authorized: usize,
    pub threshold: u32,
}

impl ThresholdStatus {
    /// Whether enough distinct trusted keys signed
    pub fn is_met(&self) -> bool {
        self.distinct_authorized >= self.threshold as usize
    }

    /// Warning describing an unmet threshold
    pub fn warning(&self, role: &str, version: u32) -> Option<ConsistencyWarning> {
        (!self.is_met()).then(|| ConsistencyWarning::UnderThresholdSignatures {
            role: role.to_string(),
            version,
            signatures: self.distinct_authorized,
            threshold: self.threshold,
        })
    }
}
