//! Snapshot persistence across restarts
//!
//! The `Bootstrapper` keeps one serialized copy of the mirror on disk so a
//! restarted client has data to show before the live connection establishes.
//! Uses atomic writes (write to temp file, then rename) to prevent
//! corruption. The in-memory store stays authoritative regardless of
//! persistence outcomes: a failed load degrades to the empty snapshot and a
//! failed save is the caller's to log and swallow.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Config;
use crate::patch::Revision;

/// A full point-in-time copy of the tree plus its revision counter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub revision: Revision,
    pub data: Value,
    /// When this snapshot was taken
    pub saved_at: DateTime<Utc>,
}

impl Snapshot {
    /// The empty tree at revision 0
    pub fn empty() -> Self {
        Self::at(0, Value::Object(Default::default()))
    }

    /// A snapshot of `data` at `revision`, stamped now
    pub fn at(revision: Revision, data: Value) -> Self {
        Self {
            revision,
            data,
            saved_at: Utc::now(),
        }
    }
}

/// Persists and restores store snapshots
pub struct Bootstrapper {
    path: PathBuf,
}

impl Bootstrapper {
    /// Create a bootstrapper storing under the configured data directory
    pub fn new(config: &Config) -> Self {
        Self::with_path(config.snapshot_path())
    }

    /// Create a bootstrapper storing at a specific file path
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Whether a persisted snapshot exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the last-persisted snapshot
    ///
    /// Never fatal: a missing, unreadable, or undecodable file degrades to
    /// the empty snapshot so the client starts with a blank mirror.
    pub fn init(&self) -> Snapshot {
        match self.load() {
            Ok(Some(snapshot)) => {
                debug!(
                    revision = snapshot.revision,
                    path = %self.path.display(),
                    "restored persisted snapshot"
                );
                snapshot
            }
            Ok(None) => Snapshot::empty(),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    "failed to restore snapshot, starting empty: {e:#}"
                );
                Snapshot::empty()
            }
        }
    }

    /// Persist `snapshot`, overwriting the previous one
    pub fn update(&self, snapshot: &Snapshot) -> Result<()> {
        let mut bytes = Vec::new();
        ciborium::into_writer(snapshot, &mut bytes).context("Failed to encode snapshot")?;

        atomic_write(&self.path, &bytes)
            .with_context(|| format!("Failed to save snapshot to {:?}", self.path))?;

        debug!(revision = snapshot.revision, "snapshot persisted");
        Ok(())
    }

    fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let bytes = fs::read(&self.path)
            .with_context(|| format!("Failed to read snapshot from {:?}", self.path))?;

        let snapshot = ciborium::from_reader(bytes.as_slice())
            .with_context(|| format!("Failed to decode snapshot from {:?}", self.path))?;

        Ok(Some(snapshot))
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
///
/// This ensures the target file is never left in a partially-written state.
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

    file.write_all(data)
        .with_context(|| format!("Failed to write to temp file {:?}", temp_path))?;

    file.sync_all()
        .with_context(|| format!("Failed to sync temp file {:?}", temp_path))?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn bootstrapper(temp_dir: &TempDir) -> Bootstrapper {
        Bootstrapper::with_path(temp_dir.path().join("snapshot.cbor"))
    }

    #[test]
    fn test_init_without_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let boot = bootstrapper(&temp_dir);

        assert!(!boot.exists());
        let snapshot = boot.init();
        assert_eq!(snapshot.revision, 0);
        assert_eq!(snapshot.data, json!({}));
    }

    #[test]
    fn test_update_then_init_round_trips() {
        let temp_dir = TempDir::new().unwrap();
        let boot = bootstrapper(&temp_dir);

        let snapshot = Snapshot::at(17, json!({ "ui": { "name": "kept" } }));
        boot.update(&snapshot).unwrap();
        assert!(boot.exists());

        let restored = boot.init();
        assert_eq!(restored.revision, 17);
        assert_eq!(restored.data, json!({ "ui": { "name": "kept" } }));
    }

    #[test]
    fn test_corrupt_file_degrades_to_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("snapshot.cbor");
        fs::write(&path, b"definitely not cbor").unwrap();

        let boot = Bootstrapper::with_path(path);
        let snapshot = boot.init();
        assert_eq!(snapshot.revision, 0);
        assert_eq!(snapshot.data, json!({}));
    }

    #[test]
    fn test_update_overwrites_previous() {
        let temp_dir = TempDir::new().unwrap();
        let boot = bootstrapper(&temp_dir);

        boot.update(&Snapshot::at(1, json!({ "a": 1 }))).unwrap();
        boot.update(&Snapshot::at(2, json!({ "a": 2 }))).unwrap();

        let restored = boot.init();
        assert_eq!(restored.revision, 2);
        assert_eq!(restored.data, json!({ "a": 2 }));
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("a").join("b").join("snapshot.cbor");

        let boot = Bootstrapper::with_path(nested.clone());
        boot.update(&Snapshot::empty()).unwrap();
        assert!(nested.exists());
    }
}
