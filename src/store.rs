//! Snapshot persistence
//!
//! The registry itself never touches disk. A [`SnapshotStore`] reads and
//! writes the two JSON documents that describe its state:
//!
//! ```text
//! <dir>/
//! ├── proto_sources.json   [SchemaSource, ...]
//! └── type_mappings.json   [TypeMapping, ...]
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::schema::{SchemaSource, TypeMapping};

pub const SOURCES_FILE: &str = "proto_sources.json";
pub const MAPPINGS_FILE: &str = "type_mappings.json";

/// Everything needed to rebuild a registry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    #[serde(default)]
    pub sources: Vec<SchemaSource>,
    #[serde(default)]
    pub mappings: Vec<TypeMapping>,
}

/// Directory-backed snapshot storage
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load both documents. Missing files load as empty lists.
    pub fn load(&self) -> Result<RegistrySnapshot> {
        Ok(RegistrySnapshot {
            sources: read_list(&self.dir.join(SOURCES_FILE))?,
            mappings: read_list(&self.dir.join(MAPPINGS_FILE))?,
        })
    }

    /// Write both documents, creating the directory if needed
    pub fn save(&self, snapshot: &RegistrySnapshot) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(
            self.dir.join(SOURCES_FILE),
            serde_json::to_string_pretty(&snapshot.sources)?,
        )?;
        fs::write(
            self.dir.join(MAPPINGS_FILE),
            serde_json::to_string_pretty(&snapshot.mappings)?,
        )?;
        Ok(())
    }
}

fn read_list<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Direction;
    use tempfile::tempdir;

    #[test]
    fn test_missing_dir_loads_empty() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("nope"));
        assert_eq!(store.load().unwrap(), RegistrySnapshot::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("state"));
        let snapshot = RegistrySnapshot {
            sources: vec![SchemaSource::with_id("s1", "user.proto", "message User {}")],
            mappings: vec![TypeMapping::new("https://h/*", "User", Direction::Response)
                .with_id("m1")
                .with_description("users")],
        };
        store.save(&snapshot).unwrap();
        assert!(dir.path().join("state").join(SOURCES_FILE).exists());
        assert_eq!(store.load().unwrap(), snapshot);
    }

    #[test]
    fn test_camel_case_on_disk() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::new(dir.path());
        let snapshot = RegistrySnapshot {
            sources: vec![],
            mappings: vec![TypeMapping::new("*", "p.T", Direction::Both).with_id("m1")],
        };
        store.save(&snapshot).unwrap();
        let raw = fs::read_to_string(dir.path().join(MAPPINGS_FILE)).unwrap();
        assert!(raw.contains("\"urlPattern\""));
        assert!(raw.contains("\"messageType\""));
        assert!(raw.contains("\"both\""));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(SOURCES_FILE), "{not json").unwrap();
        assert!(SnapshotStore::new(dir.path()).load().is_err());
    }
}
