//! Persistence for fixture repositories
//!
//! - `versioned`: the in-memory store of signed documents and their versions
//! - `fs`: the on-disk layout and the stage-then-swap primitives publishes use

pub mod fs;
pub mod versioned;

pub use fs::FixtureLayout;
pub use versioned::{metadata_file, versioned_file, RepositoryState, VersionedMetadataStore, WriteReport};
