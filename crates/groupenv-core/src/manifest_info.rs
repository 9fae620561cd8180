//! Stored content hash of a group's dependency manifest.
//!
//! The coordination store itself lives outside this workspace; callers plug
//! in an implementation of [`CoordinationStore`].

use anyhow::{Context, Result};
use serde::Deserialize;

/// Prefix of every group record in the coordination store.
pub const GROUP_PATH: &str = "/groupenv/group";

/// Read-only view of the distributed key-value store.
pub trait CoordinationStore: Send + Sync {
    /// Raw bytes stored at `path`, or `None` when the key does not exist.
    fn get(&self, path: &str) -> Result<Option<Vec<u8>>>;
}

/// File record as published to the coordination store.
#[derive(Debug, Clone, Deserialize)]
pub struct FileInfo {
    #[serde(default)]
    pub md5: String,
    #[serde(default)]
    pub length: Option<u64>,
    #[serde(default, rename = "lastModified")]
    pub last_modified: Option<i64>,
}

/// Store key of the manifest record for `group`.
pub fn manifest_record_path(group: &str, manifest_file: &str) -> String {
    format!("{}/{}/file/lib/{}", GROUP_PATH, group, manifest_file)
}

/// Content hash recorded for the group's manifest; empty when the key is missing.
pub fn manifest_digest(
    store: &dyn CoordinationStore,
    group: &str,
    manifest_file: &str,
) -> Result<String> {
    let path = manifest_record_path(group, manifest_file);
    let Some(bytes) = store.get(&path)? else {
        return Ok(String::new());
    };
    let info: FileInfo = serde_json::from_slice(&bytes)
        .with_context(|| format!("Parse file record at {}", path))?;
    Ok(info.md5)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapStore(HashMap<String, Vec<u8>>);

    impl CoordinationStore for MapStore {
        fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.get(path).cloned())
        }
    }

    #[test]
    fn test_missing_key_yields_empty_digest() {
        let store = MapStore(HashMap::new());
        assert_eq!(manifest_digest(&store, "alpha", "pom.xml").unwrap(), "");
    }

    #[test]
    fn test_reads_md5_field() {
        let mut map = HashMap::new();
        map.insert(
            "/groupenv/group/alpha/file/lib/pom.xml".to_string(),
            br#"{"md5":"9e107d9d372bb6826bd81d3542a419d6","length":12}"#.to_vec(),
        );
        let store = MapStore(map);
        assert_eq!(
            manifest_digest(&store, "alpha", "pom.xml").unwrap(),
            "9e107d9d372bb6826bd81d3542a419d6"
        );
    }

    #[test]
    fn test_malformed_record_is_an_error() {
        let mut map = HashMap::new();
        map.insert(manifest_record_path("alpha", "pom.xml"), b"not json".to_vec());
        let store = MapStore(map);
        assert!(manifest_digest(&store, "alpha", "pom.xml").is_err());
    }
}
