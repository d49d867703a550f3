//! Attack Injection
//!
//! Mutators that turn a published repository into one a correct client must
//! reject. Each works on the files already on disk, after a publish, and
//! leaves the builder's own record of versions untouched.

use serde_json::Value;
use tracing::warn;
use tuf_fixtures_core::types::TIMESTAMP;
use tuf_fixtures_core::{FixtureError, Result};

use crate::builder::FixtureBuilder;
use crate::config::PublishOptions;
use crate::storage::{fs, metadata_file, versioned_file};

/// Byte pattern used to inflate a metadata file past its declared length
pub const FILLER: &str = "Garbage!";

/// Borrowed view of a builder that can corrupt its published state
pub struct AttackInjector<'a> {
    builder: &'a mut FixtureBuilder,
}

impl<'a> AttackInjector<'a> {
    pub(crate) fn new(builder: &'a mut FixtureBuilder) -> Self {
        Self { builder }
    }

    /// Leave the client trusting newer metadata than the server serves
    ///
    /// The current server tree is set aside, every top-level role is
    /// republished and exported to the client, and then the set-aside tree
    /// is restored as the live server.
    pub fn rollback_simulate(&mut self) -> Result<()> {
        let layout = self.builder.layout().clone();
        let server = layout.server_dir();
        let backup = layout.server_backup();

        let served = self.builder.server_version(TIMESTAMP)?;
        fs::remove_dir_if_exists(&backup)?;
        fs::copy_dir(&server, &backup)?;

        self.builder
            .invalidate()?
            .publish(PublishOptions::with_client())?;
        let trusted = self.builder.client_version(TIMESTAMP)?;

        fs::remove_dir_if_exists(&server)?;
        std::fs::rename(&backup, &server).map_err(|e| FixtureError::io(&backup, e))?;

        warn!(
            fixture = %self.builder.name(),
            served,
            trusted,
            "Rolled back server metadata"
        );
        Ok(())
    }

    /// Replace a role's signatures with two copies of its first signature
    ///
    /// Both the `<role>.json` alias and, if present, the matching
    /// `<version>.<role>.json` file are rewritten.
    pub fn duplicate_signature(&mut self, role: &str) -> Result<()> {
        let file = metadata_file(role);
        let mut doc = self.builder.read(&file)?;
        duplicate_first_signature(&mut doc, &file)?;
        self.builder.write(&file, &doc)?;

        let version = doc
            .pointer("/signed/version")
            .and_then(Value::as_u64)
            .and_then(|v| u32::try_from(v).ok());
        if let Some(version) = version {
            let versioned = versioned_file(role, version);
            if self.builder.server_file_exists(&versioned) {
                self.builder.write(&versioned, &doc)?;
            }
        }

        warn!(fixture = %self.builder.name(), role, "Duplicated signature");
        Ok(())
    }

    /// Overwrite `target_file` with [`FILLER`] repeated once per byte of the
    /// length `authority_file` declares for it
    ///
    /// Returns the number of bytes written.
    pub fn oversize_metadata(&mut self, target_file: &str, authority_file: &str) -> Result<usize> {
        let authority = self.builder.read(authority_file)?;
        let declared = authority
            .get("signed")
            .and_then(|s| s.get("meta"))
            .and_then(|m| m.get(target_file))
            .and_then(|e| e.get("length"))
            .and_then(Value::as_u64)
            .ok_or_else(|| {
                FixtureError::MissingField(format!("{authority_file}: signed.meta.{target_file}.length"))
            })?;
        let declared = usize::try_from(declared)
            .map_err(|_| FixtureError::InvalidDocument(format!("{authority_file}: length {declared}")))?;

        let filler = FILLER.repeat(declared);
        self.builder.write_raw(target_file, filler.as_bytes())?;

        warn!(
            fixture = %self.builder.name(),
            file = target_file,
            declared,
            written = filler.len(),
            "Oversized metadata file"
        );
        Ok(filler.len())
    }
}

fn duplicate_first_signature(doc: &mut Value, file: &str) -> Result<()> {
    let signatures = doc
        .get_mut("signatures")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| FixtureError::MissingField(format!("{file}: signatures")))?;
    let first = signatures
        .first()
        .cloned()
        .ok_or_else(|| FixtureError::InvalidDocument(format!("{file} has no signatures")))?;

    *signatures = vec![first.clone(), first];
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_duplicate_first_signature() {
        let mut doc = json!({
            "signatures": [{"keyid": "a", "sig": "01"}, {"keyid": "b", "sig": "02"}],
            "signed": {"version": 1}
        });
        duplicate_first_signature(&mut doc, "timestamp.json").unwrap();

        let signatures = doc["signatures"].as_array().unwrap();
        assert_eq!(signatures.len(), 2);
        assert_eq!(signatures[0], signatures[1]);
        assert_eq!(signatures[0]["keyid"], "a");
    }

    #[test]
    fn test_duplicate_without_signatures() {
        let mut doc = json!({"signatures": [], "signed": {}});
        assert!(matches!(
            duplicate_first_signature(&mut doc, "x.json"),
            Err(FixtureError::InvalidDocument(_))
        ));

        let mut doc = json!({"signed": {}});
        assert!(matches!(
            duplicate_first_signature(&mut doc, "x.json"),
            Err(FixtureError::MissingField(_))
        ));
    }
}
