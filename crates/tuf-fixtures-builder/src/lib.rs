//! TUF Fixture Builder
//!
//! Builds on-disk TUF repositories, legitimate and deliberately broken, for
//! testing update clients. Each fixture holds the server's published
//! metadata and targets plus a point-in-time client trust store.
//!
//! ## Layers
//!
//! - [`roles`]: roles, keys, thresholds and the ordered delegation graph
//! - [`storage`]: versioned signed documents and the on-disk layout
//! - [`FixtureBuilder`]: the publish session tying the two together
//! - [`AttackInjector`]: corruptions applied after a publish
//! - [`corpus`]: the named fixtures the generator binary emits
//!
//! ## Example
//!
//! ```no_run
//! use tuf_fixtures::{FixtureBuilder, PublishOptions};
//!
//! # fn main() -> tuf_fixtures_core::Result<()> {
//! let mut fixture = FixtureBuilder::with_defaults("Simple", "fixtures")?;
//! fixture
//!     .create_target("testtarget.txt", Some("targets"))?
//!     .publish(PublishOptions::with_client())?;
//! # Ok(())
//! # }
//! ```

pub mod attacks;
pub mod builder;
pub mod config;
pub mod corpus;
pub mod roles;
pub mod storage;

pub use attacks::AttackInjector;
pub use builder::FixtureBuilder;
pub use config::{DelegateOptions, GeneratorConfig, PublishOptions, RepositoryOptions};
pub use corpus::{catalogue, Corpus};
pub use roles::{Delegation, Role, RoleId, RoleRegistry};
pub use storage::{FixtureLayout, RepositoryState, VersionedMetadataStore, WriteReport};
