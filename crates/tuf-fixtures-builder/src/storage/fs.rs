//! On-disk fixture layout
//!
//! ```text
//! <fixture>/
//!   fixture.json        manifest
//!   server/metadata/    published documents
//!   server/targets/     target content
//!   client/metadata/    exported trust snapshot
//! ```
//!
//! Metadata directories are never written in place. A complete replacement
//! is staged next to the live directory and swapped in with renames.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use tuf_fixtures_core::{FixtureError, Result};
use walkdir::WalkDir;

/// Paths of one fixture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureLayout {
    root: PathBuf,
}

impl FixtureLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn server_dir(&self) -> PathBuf {
        self.root.join("server")
    }

    pub fn server_metadata(&self) -> PathBuf {
        self.server_dir().join("metadata")
    }

    pub fn server_targets(&self) -> PathBuf {
        self.server_dir().join("targets")
    }

    pub fn client_metadata(&self) -> PathBuf {
        self.root.join("client").join("metadata")
    }

    /// Where the server directory is kept during a rollback
    pub fn server_backup(&self) -> PathBuf {
        self.root.join("server_backup")
    }

    pub fn manifest(&self) -> PathBuf {
        self.root.join("fixture.json")
    }
}

/// Sibling of `dir` with a suffix appended to its name
fn sibling(dir: &Path, suffix: &str) -> PathBuf {
    let mut name = dir.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    dir.with_file_name(name)
}

/// Directory a replacement for `dir` is staged in
pub fn staged_dir(dir: &Path) -> PathBuf {
    sibling(dir, ".staged")
}

/// Name the live directory is moved to during a swap
pub fn retired_dir(dir: &Path) -> PathBuf {
    sibling(dir, ".old")
}

/// Write a file via a temporary sibling and a rename
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FixtureError::io(parent, e))?;
    }

    let tmp = sibling(path, ".tmp");
    fs::write(&tmp, bytes).map_err(|e| FixtureError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| FixtureError::io(path, e))?;
    Ok(())
}

/// Read a whole file
pub fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| FixtureError::io(path, e))
}

/// Remove a directory tree if it exists
pub fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| FixtureError::io(dir, e))?;
    }
    Ok(())
}

/// Copy every file under `from` into `to`, creating directories as needed
pub fn copy_dir(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).map_err(|e| FixtureError::io(to, e))?;

    for entry in WalkDir::new(from).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(from).to_path_buf();
            FixtureError::io(path, e.into())
        })?;
        let relative = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| FixtureError::InvalidDocument(e.to_string()))?;
        let dest = to.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).map_err(|e| FixtureError::io(&dest, e))?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|e| FixtureError::io(&dest, e))?;
        }
    }
    Ok(())
}

/// Write a complete set of files into a fresh staging directory for `live`
pub fn stage_files<'a>(
    live: &Path,
    files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
) -> Result<PathBuf> {
    let staged = staged_dir(live);
    remove_dir_if_exists(&staged)?;
    fs::create_dir_all(&staged).map_err(|e| FixtureError::io(&staged, e))?;

    for (name, bytes) in files {
        let path = staged.join(name);
        fs::write(&path, bytes).map_err(|e| FixtureError::io(&path, e))?;
    }
    Ok(staged)
}

/// Copy a directory into a fresh staging directory for `live`
pub fn stage_copy(from: &Path, live: &Path) -> Result<PathBuf> {
    let staged = staged_dir(live);
    remove_dir_if_exists(&staged)?;
    copy_dir(from, &staged)?;
    Ok(staged)
}

/// Replace `live` with `staged`
///
/// The live directory is renamed aside, the staged one renamed into place,
/// and only then is the old one removed. A reader never sees a mix of old
/// and new files.
pub fn swap_dir(staged: &Path, live: &Path) -> Result<()> {
    let retired = retired_dir(live);
    remove_dir_if_exists(&retired)?;

    if live.exists() {
        fs::rename(live, &retired).map_err(|e| FixtureError::io(live, e))?;
    } else if let Some(parent) = live.parent() {
        fs::create_dir_all(parent).map_err(|e| FixtureError::io(parent, e))?;
    }

    fs::rename(staged, live).map_err(|e| FixtureError::io(staged, e))?;
    remove_dir_if_exists(&retired)?;

    debug!(dir = %live.display(), "Swapped in staged directory");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let layout = FixtureLayout::new("/fx/Simple");
        assert_eq!(layout.server_metadata(), PathBuf::from("/fx/Simple/server/metadata"));
        assert_eq!(layout.server_targets(), PathBuf::from("/fx/Simple/server/targets"));
        assert_eq!(layout.client_metadata(), PathBuf::from("/fx/Simple/client/metadata"));
        assert_eq!(layout.manifest(), PathBuf::from("/fx/Simple/fixture.json"));
        assert_eq!(
            staged_dir(&layout.server_metadata()),
            PathBuf::from("/fx/Simple/server/metadata.staged")
        );
    }

    #[test]
    fn test_write_atomic_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.json");

        write_atomic(&path, b"{}").unwrap();
        assert_eq!(read(&path).unwrap(), b"{}");
        assert!(!dir.path().join("a/b/c.json.tmp").exists());
    }

    #[test]
    fn test_swap_replaces_whole_directory() {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("metadata");

        let staged = stage_files(&live, [("old.json", &b"1"[..])]).unwrap();
        swap_dir(&staged, &live).unwrap();
        assert!(live.join("old.json").exists());

        let staged = stage_files(&live, [("new.json", &b"2"[..])]).unwrap();
        swap_dir(&staged, &live).unwrap();

        assert!(live.join("new.json").exists());
        assert!(!live.join("old.json").exists());
        assert!(!staged_dir(&live).exists());
        assert!(!retired_dir(&live).exists());
    }

    #[test]
    fn test_copy_dir_recurses() {
        let dir = tempfile::tempdir().unwrap();
        let from = dir.path().join("from");
        write_atomic(&from.join("x/y.txt"), b"y").unwrap();
        write_atomic(&from.join("z.txt"), b"z").unwrap();

        let to = dir.path().join("to");
        copy_dir(&from, &to).unwrap();

        assert_eq!(read(&to.join("x/y.txt")).unwrap(), b"y");
        assert_eq!(read(&to.join("z.txt")).unwrap(), b"z");
    }

    #[test]
    fn test_missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = read(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, FixtureError::Io { .. }));
        assert!(err.to_string().contains("missing.json"));
    }
}
