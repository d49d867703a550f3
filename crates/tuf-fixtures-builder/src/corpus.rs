//! Fixture Corpus
//!
//! The named fixtures the generator emits. Most come in a `consistent` and
//! an `inconsistent` variant, built by the same steps under each naming mode.
//!
//! Every fixture gets its own key store seeded by the run seed and the
//! fixture's path, so fixtures are independent of build order and of which
//! subset is built.

use std::path::{Path, PathBuf};
use tracing::info;
use tuf_fixtures_core::types::{ROOT, SNAPSHOT, TARGETS, TIMESTAMP};
use tuf_fixtures_core::{FixedClock, FixtureError, KeyStore, Result};

use crate::builder::FixtureBuilder;
use crate::config::{DelegateOptions, PublishOptions, RepositoryOptions};

type BuildFn = fn(&Corpus) -> Result<()>;

/// A named entry of the catalogue
#[derive(Clone, Copy)]
pub struct CatalogueEntry {
    pub name: &'static str,
    build: BuildFn,
}

impl std::fmt::Debug for CatalogueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogueEntry").field("name", &self.name).finish()
    }
}

const fn entry(name: &'static str, build: BuildFn) -> CatalogueEntry {
    CatalogueEntry { name, build }
}

const CATALOGUE: &[CatalogueEntry] = &[
    entry("Simple", simple),
    entry("Simple_WithHashes", simple_with_hashes),
    entry("NoLengths", no_lengths),
    entry("KnownLengths", known_lengths),
    entry("TargetsLengthNoSnapshotLength", targets_length_no_snapshot_length),
    entry("PublishedTwice", published_twice),
    entry("PublishedTwiceWithRotatedKeys_snapshot", rotated_snapshot_key),
    entry("PublishedTwiceWithRotatedKeys_timestamp", rotated_timestamp_key),
    entry("RotatedKeys", rotated_keys),
    entry("Delegated", delegated),
    entry("NestedDelegated", nested_delegated),
    entry("NestedDelegatedErrors", nested_delegated_errors),
    entry("NestedTerminatingNonDelegatingDelegation", nested_terminating_non_delegating),
    entry("TerminatingDelegation", terminating_delegation),
    entry("ThreeLevelDelegation", three_level_delegation),
    entry("TopLevelTerminating", top_level_terminating),
    entry("UnsupportedDelegation", unsupported_delegation),
    entry("HashedBins", hashed_bins),
    entry("ThresholdTwo", threshold_two),
    entry("ThresholdTwoAttack", threshold_two_attack),
    entry("AttackRollback", attack_rollback),
    entry("MetadataFileTooBig_snapshot", snapshot_too_big),
    entry("MetadataFileTooBig_targets", targets_too_big),
];

/// Every fixture the generator knows, in build order
pub fn catalogue() -> &'static [CatalogueEntry] {
    CATALOGUE
}

/// Shared settings for building fixtures under one directory
#[derive(Debug, Clone)]
pub struct Corpus {
    base_dir: PathBuf,
    seed: String,
    clock: FixedClock,
}

impl Corpus {
    pub fn new(base_dir: impl Into<PathBuf>, seed: impl Into<String>, clock: FixedClock) -> Self {
        Self {
            base_dir: base_dir.into(),
            seed: seed.into(),
            clock,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Start a fixture at `<base_dir>/<name>`
    pub fn builder(&self, name: &str, options: RepositoryOptions) -> Result<FixtureBuilder> {
        let keys = KeyStore::new(format!("{}:{}", self.seed, name));
        FixtureBuilder::create(name, &self.base_dir, options, keys, self.clock)
    }

    /// Build `<name>/consistent` and `<name>/inconsistent` with the same steps
    fn variants(
        &self,
        name: &str,
        options: RepositoryOptions,
        steps: impl Fn(&mut FixtureBuilder) -> Result<()>,
    ) -> Result<()> {
        for (suffix, consistent) in [("consistent", true), ("inconsistent", false)] {
            let mut fixture = self.builder(&format!("{name}/{suffix}"), options.consistent(consistent))?;
            steps(&mut fixture)?;
        }
        Ok(())
    }

    /// Build one catalogue fixture by name
    pub fn build(&self, name: &str) -> Result<()> {
        let entry = CATALOGUE
            .iter()
            .find(|e| e.name == name)
            .ok_or_else(|| FixtureError::InvalidConfig(format!("unknown fixture: {name}")))?;

        (entry.build)(self)?;
        info!(fixture = name, "Built fixture");
        Ok(())
    }

    /// Build the whole catalogue, or only the named fixtures
    ///
    /// Names are checked before anything is built. Returns the names built.
    pub fn build_all(&self, only: Option<&[String]>) -> Result<Vec<&'static str>> {
        if let Some(names) = only {
            if let Some(unknown) = names.iter().find(|n| !CATALOGUE.iter().any(|e| e.name == n.as_str())) {
                return Err(FixtureError::InvalidConfig(format!("unknown fixture: {unknown}")));
            }
        }

        let selected: Vec<&'static str> = CATALOGUE
            .iter()
            .map(|e| e.name)
            .filter(|name| only.map_or(true, |names| names.iter().any(|n| n.as_str() == *name)))
            .collect();

        for name in &selected {
            self.build(name)?;
        }
        Ok(selected)
    }
}

// =============================================================================
// Basic Repositories
// =============================================================================

fn simple(corpus: &Corpus) -> Result<()> {
    let options = RepositoryOptions {
        use_snapshot_hashes: true,
        ..Default::default()
    };
    corpus.variants("Simple", options, |f| {
        f.create_target("testtarget.txt", Some(TARGETS))?
            .publish(PublishOptions::with_client())?;
        Ok(())
    })
}

fn simple_with_hashes(corpus: &Corpus) -> Result<()> {
    let options = RepositoryOptions::default().hashes(true, true);
    corpus.variants("Simple_WithHashes", options, |f| {
        f.create_target("testtarget.txt", Some(TARGETS))?
            .publish(PublishOptions::with_client())?;
        Ok(())
    })
}

/// Publish, then republish every top-level role
fn publish_twice(f: &mut FixtureBuilder) -> Result<()> {
    f.publish(PublishOptions::with_client())?
        .invalidate()?
        .publish(PublishOptions::default())?;
    Ok(())
}

fn no_lengths(corpus: &Corpus) -> Result<()> {
    let options = RepositoryOptions::default().lengths(false, false);
    corpus.variants("NoLengths", options, publish_twice)
}

fn known_lengths(corpus: &Corpus) -> Result<()> {
    let options = RepositoryOptions::default().lengths(true, true);
    corpus.variants("KnownLengths", options, publish_twice)
}

fn targets_length_no_snapshot_length(corpus: &Corpus) -> Result<()> {
    let options = RepositoryOptions::default().lengths(false, true);
    corpus.variants("TargetsLengthNoSnapshotLength", options, publish_twice)
}

/// Lengths and hashes everywhere
fn published_twice_options() -> RepositoryOptions {
    RepositoryOptions::default().lengths(true, true).hashes(true, true)
}

fn published_twice(corpus: &Corpus) -> Result<()> {
    corpus.variants("PublishedTwice", published_twice_options(), |f| {
        f.publish(PublishOptions::with_client())?
            .create_target("test.txt", Some(TARGETS))?
            .publish(PublishOptions::default())?;
        Ok(())
    })
}

// =============================================================================
// Key Rotation
// =============================================================================

/// Publish, rotate one role's key, publish again
fn rotate(f: &mut FixtureBuilder, role: &str) -> Result<()> {
    f.publish(PublishOptions::with_client())?
        .add_key(role)?
        .revoke_key(role, 0)?
        .create_target("test.txt", Some(TARGETS))?
        .publish(PublishOptions::default())?;
    Ok(())
}

fn rotated_snapshot_key(corpus: &Corpus) -> Result<()> {
    corpus.variants(
        "PublishedTwiceWithRotatedKeys_snapshot",
        published_twice_options(),
        |f| rotate(f, SNAPSHOT),
    )
}

fn rotated_timestamp_key(corpus: &Corpus) -> Result<()> {
    corpus.variants(
        "PublishedTwiceWithRotatedKeys_timestamp",
        published_twice_options(),
        |f| rotate(f, TIMESTAMP),
    )
}

fn rotated_keys(corpus: &Corpus) -> Result<()> {
    let mut f = corpus.builder("RotatedKeys", RepositoryOptions::default())?;
    f.publish(PublishOptions::with_client())?
        .add_key(TIMESTAMP)?
        .revoke_key(TIMESTAMP, 0)?
        .publish(PublishOptions::default())?;
    Ok(())
}

// =============================================================================
// Delegation
// =============================================================================

/// One delegated role published to the client
fn unclaimed_base(f: &mut FixtureBuilder) -> Result<()> {
    f.create_target("testtarget.txt", Some(TARGETS))?
        .publish(PublishOptions::with_client())?
        .delegate("unclaimed", &["level_1_*.txt"], DelegateOptions::default())?
        .create_target("level_1_target.txt", Some("unclaimed"))?
        .publish(PublishOptions::with_client())?;
    Ok(())
}

/// The client stops following from here on; two rounds of top-level key
/// churn are published to the server only
fn delegated_steps(f: &mut FixtureBuilder) -> Result<()> {
    unclaimed_base(f)?;
    f.add_key(TARGETS)?
        .add_key(SNAPSHOT)?
        .invalidate()?
        .publish(PublishOptions::default())?;
    f.revoke_key(TARGETS, 0)?
        .revoke_key(SNAPSHOT, 0)?
        .invalidate()?
        .publish(PublishOptions::default())?;
    Ok(())
}

fn delegated(corpus: &Corpus) -> Result<()> {
    let options = RepositoryOptions {
        use_timestamp_length: false,
        ..Default::default()
    };
    corpus.variants("Delegated", options, delegated_steps)
}

/// Give targets and snapshot a new key, publish, then revoke those newest
/// keys and publish again
fn churn_newest_keys(f: &mut FixtureBuilder) -> Result<()> {
    f.add_key(TARGETS)?
        .add_key(SNAPSHOT)?
        .publish(PublishOptions::default())?;

    let newest = |f: &FixtureBuilder, role: &str| -> Result<usize> {
        Ok(f.registry().role(role)?.keyids().len().saturating_sub(1))
    };
    let targets_key = newest(f, TARGETS)?;
    let snapshot_key = newest(f, SNAPSHOT)?;
    f.revoke_key(TARGETS, targets_key)?
        .revoke_key(SNAPSHOT, snapshot_key)?
        .publish(PublishOptions::default())?;
    Ok(())
}

/// `unclaimed` delegating onward to a plain, a terminating and two
/// third-level roles
fn nested_base(f: &mut FixtureBuilder) -> Result<()> {
    unclaimed_base(f)?;
    churn_newest_keys(f)?;

    let from_unclaimed = || DelegateOptions::default().parent("unclaimed");
    f.delegate("level_2", &["level_1_2_*.txt"], from_unclaimed())?
        .create_target("level_1_2_target.txt", Some("level_2"))?
        .delegate(
            "level_2_terminating",
            &["level_1_2_terminating_*.txt"],
            from_unclaimed().terminating(),
        )?
        .create_target("level_1_2_terminating_findable.txt", Some("level_2_terminating"))?
        .delegate(
            "level_3",
            &["level_1_2_3_*.txt"],
            DelegateOptions::default().parent("level_2"),
        )?
        .create_target("level_1_2_3_below_non_terminating_target.txt", Some("level_3"))?
        .delegate(
            "level_3_below_terminated",
            &["level_1_2_terminating_3_*.txt"],
            DelegateOptions::default().parent("level_2_terminating"),
        )?
        .create_target(
            "level_1_2_terminating_3_target.txt",
            Some("level_3_below_terminated"),
        )?;
    Ok(())
}

fn nested_delegated_steps(f: &mut FixtureBuilder) -> Result<()> {
    nested_base(f)?;
    f.delegate(
        "level_2_after_terminating_not_match_terminating_path",
        &["level_1_2a_terminating_plus_1_more_*.txt"],
        DelegateOptions::default().parent("unclaimed"),
    )?
    .create_target(
        "level_1_2a_terminating_plus_1_more_findable.txt",
        Some("level_2_after_terminating_not_match_terminating_path"),
    )?
    .publish(PublishOptions::default())?;
    Ok(())
}

fn nested_delegated(corpus: &Corpus) -> Result<()> {
    corpus.variants("NestedDelegated", RepositoryOptions::default(), nested_delegated_steps)
}

fn nested_delegated_errors(corpus: &Corpus) -> Result<()> {
    corpus.variants("NestedDelegatedErrors", RepositoryOptions::default(), |f| {
        nested_base(f)?;
        f.publish(PublishOptions::default())?;

        // Targets no client can reach, each behind a different kind of dead end
        f.create_target("level_a.txt", Some("unclaimed"))?
            .create_target("level_1_3_target.txt", Some("level_2"))?
            .create_target("level_2_unfindable.txt", Some("level_2_terminating"))?
            .delegate(
                "level_2_terminating_match_terminating_path",
                &["level_1_2_terminating_plus_1_more_*.txt"],
                DelegateOptions::default().parent("unclaimed"),
            )?
            .create_target(
                "level_1_2_terminating_plus_1_more_unfindable.txt",
                Some("level_2_terminating_match_terminating_path"),
            )?
            .publish(PublishOptions::default())?;
        Ok(())
    })
}

/// `a` and `d` under targets, `b` (terminating) and `c` under `a`
fn nested_terminating_non_delegating_steps(f: &mut FixtureBuilder) -> Result<()> {
    let from_a = || DelegateOptions::default().parent("a");
    f.publish(PublishOptions::with_client())?
        .create_target("targets.txt", Some(TARGETS))?
        .delegate("a", &["*.txt"], DelegateOptions::default())?
        .create_target("a.txt", Some("a"))?
        .delegate("b", &["*.txt"], from_a().terminating())?
        .create_target("b.txt", Some("b"))?
        .delegate("c", &["*.txt"], from_a())?
        .create_target("c.txt", Some("c"))?
        .delegate("d", &["*.txt"], DelegateOptions::default())?
        .create_target("d.txt", Some("d"))?
        .publish(PublishOptions::default())?;
    Ok(())
}

fn nested_terminating_non_delegating(corpus: &Corpus) -> Result<()> {
    corpus.variants(
        "NestedTerminatingNonDelegatingDelegation",
        RepositoryOptions::default(),
        nested_terminating_non_delegating_steps,
    )
}

/// Three levels below targets: `a` and `f` under targets, `b` and `e`
/// under `a`, `c` and `d` under `b`. Each role signs `<role>.txt`.
fn three_levels(f: &mut FixtureBuilder, b_terminating: bool) -> Result<()> {
    let from = |parent: &str| DelegateOptions::default().parent(parent);
    let mut b = from("a");
    b.terminating = b_terminating;

    f.publish(PublishOptions::with_client())?
        .create_target("targets.txt", Some(TARGETS))?
        .delegate("a", &["*.txt"], DelegateOptions::default())?
        .create_target("a.txt", Some("a"))?
        .delegate("b", &["*.txt"], b)?
        .create_target("b.txt", Some("b"))?
        .delegate("c", &["*.txt"], from("b"))?
        .create_target("c.txt", Some("c"))?
        .delegate("d", &["*.txt"], from("b"))?
        .create_target("d.txt", Some("d"))?
        .delegate("e", &["*.txt"], from("a"))?
        .create_target("e.txt", Some("e"))?
        .delegate("f", &["*.txt"], DelegateOptions::default())?
        .create_target("f.txt", Some("f"))?
        .publish(PublishOptions::default())?;
    Ok(())
}

fn terminating_delegation(corpus: &Corpus) -> Result<()> {
    corpus.variants("TerminatingDelegation", RepositoryOptions::default(), |f| {
        three_levels(f, true)
    })
}

fn three_level_delegation(corpus: &Corpus) -> Result<()> {
    corpus.variants("ThreeLevelDelegation", RepositoryOptions::default(), |f| {
        three_levels(f, false)
    })
}

fn top_level_terminating(corpus: &Corpus) -> Result<()> {
    corpus.variants("TopLevelTerminating", RepositoryOptions::default(), |f| {
        f.create_target("targets.txt", Some(TARGETS))?
            .publish(PublishOptions::with_client())?
            .delegate("a", &["*.txt"], DelegateOptions::default().terminating())?
            .create_target("a.txt", Some("a"))?
            .delegate("b", &["*.txt"], DelegateOptions::default())?
            .create_target("b.txt", Some("b"))?
            .publish(PublishOptions::default())?;
        Ok(())
    })
}

fn unsupported_delegation(corpus: &Corpus) -> Result<()> {
    let mut f = corpus.builder("UnsupportedDelegation", RepositoryOptions::default())?;
    f.create_target("testtarget.txt", Some(TARGETS))?
        .publish(PublishOptions::with_client())?
        .delegate(
            "unsupported_target",
            &["unsupported_*.txt"],
            DelegateOptions::default().path_hash_prefixes(["ab34df13"]),
        )?
        .create_target("unsupported_target.txt", Some("unsupported_target"))?
        .publish(PublishOptions::default())?;
    Ok(())
}

fn hashed_bins(corpus: &Corpus) -> Result<()> {
    let mut f = corpus.builder("HashedBins", RepositoryOptions::default())?;
    f.publish(PublishOptions::with_client())?
        .create_hash_bins(8, true)?;

    for letter in 'a'..='z' {
        let path = format!("{letter}.txt");
        f.create_unsigned_target(&path)?.add_to_hash_bin(&path)?;
    }

    f.invalidate()?.publish(PublishOptions::default())?;
    Ok(())
}

// =============================================================================
// Thresholds and Attacks
// =============================================================================

fn threshold_two(corpus: &Corpus) -> Result<()> {
    corpus.variants("ThresholdTwo", RepositoryOptions::default(), |f| {
        f.add_key(TIMESTAMP)?
            .set_threshold(TIMESTAMP, 2)?
            .publish(PublishOptions::with_client())?;
        Ok(())
    })
}

fn threshold_two_attack(corpus: &Corpus) -> Result<()> {
    corpus.variants("ThresholdTwoAttack", RepositoryOptions::default(), |f| {
        f.add_key(TIMESTAMP)?
            .set_threshold(TIMESTAMP, 2)?
            .publish(PublishOptions::with_client())?
            .mark_dirty(&[TIMESTAMP])?
            .publish(PublishOptions::with_client())?
            .mark_dirty(&[TIMESTAMP])?
            .publish(PublishOptions::default())?;
        f.attacks().duplicate_signature(TIMESTAMP)
    })
}

fn attack_rollback(corpus: &Corpus) -> Result<()> {
    corpus.variants("AttackRollback", RepositoryOptions::default(), |f| {
        f.create_target("testtarget.txt", Some(TARGETS))?
            .publish(PublishOptions::with_client())?
            .create_target("testtarget2.txt", Some(TARGETS))?;
        f.attacks().rollback_simulate()
    })
}

/// Publish twice, then inflate `file` past the length `authority` records
fn oversize(f: &mut FixtureBuilder, file: &str, authority: &str) -> Result<()> {
    publish_twice(f)?;
    f.attacks()
        .oversize_metadata(&format!("{file}.json"), &format!("{authority}.json"))?;
    Ok(())
}

fn snapshot_too_big(corpus: &Corpus) -> Result<()> {
    let options = RepositoryOptions::default().lengths(true, true);
    corpus.variants("MetadataFileTooBig_snapshot", options, |f| {
        oversize(f, SNAPSHOT, TIMESTAMP)
    })
}

fn targets_too_big(corpus: &Corpus) -> Result<()> {
    let options = RepositoryOptions::default().lengths(true, true);
    corpus.variants("MetadataFileTooBig_targets", options, |f| {
        oversize(f, TARGETS, SNAPSHOT)
    })
}
