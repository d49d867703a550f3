//! # TUF Fixtures Core
//!
//! Key material, canonical encoding and the metadata document model used to
//! build TUF repository fixtures.
//!
//! ## Key Concepts
//!
//! - **Role**: a named signing authority with its own keys and threshold
//! - **Document**: a role's signed body plus one signature per signing key
//! - **KeyStore**: a seeded, deterministic source of Ed25519 keys
//! - **FixedClock**: the pinned time every expiration is derived from
//!
//! Nothing in this crate verifies trust. Documents may be signed by fewer
//! keys than their threshold; [`SignedMetadata::threshold_status`] only
//! reports it.

pub mod canonical;
pub mod crypto;
pub mod error;
pub mod metadata;
pub mod types;

pub use canonical::{canonical_bytes, Hashes};
pub use crypto::{KeyMetadata, KeyPair, KeyStore, PublicKey, SignatureEntry};
pub use error::{ConsistencyWarning, FixtureError, Result, UnsupportedFeature};
pub use metadata::{
    DelegatedRoleEntry, Delegations, MetaFileInfo, RoleKeys, RootMetadata, Signed,
    SignedMetadata, SnapshotMetadata, TargetFileInfo, TargetsMetadata, ThresholdStatus,
    TimestampMetadata,
};
pub use types::{FixedClock, RoleKind, Target};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
