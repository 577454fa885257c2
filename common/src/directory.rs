//! Device directory – maps (server address, camera id) to the label and
//! direction written into each report.
//!
//! The table is a small TOML file loaded once at startup:
//!
//! ```toml
//! [[camera]]
//! server = "172.16.10.115"
//! camera_id = 10
//! id = "30403"
//! direction = "backward"
//! ```

use std::net::IpAddr;
use std::path::Path;

use serde::Deserialize;
use tracing::info;

use crate::error::DirectoryError;

/// A resolved directory row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub server: IpAddr,
    pub camera_id: u32,
    /// Human-readable label, used as the report `id`.
    pub id: String,
    pub direction: String,
}

/// Anything able to resolve a camera to its report label and direction.
pub trait DirectoryLookup {
    fn resolve(&self, server: IpAddr, camera_id: u32) -> Option<&DirectoryEntry>;
}

#[derive(Debug, Deserialize)]
struct DirectoryFile {
    #[serde(default)]
    camera: Vec<Row>,
}

#[derive(Debug, Deserialize)]
struct Row {
    server: String,
    camera_id: u32,
    #[serde(default)]
    id: String,
    #[serde(default)]
    direction: String,
}

/// In-memory directory table. The first row matching a lookup wins.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn new(entries: Vec<DirectoryEntry>) -> Self {
        Directory { entries }
    }

    /// Load the table from a TOML file.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let text = std::fs::read_to_string(path).map_err(|source| DirectoryError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let directory = Self::parse(&text).map_err(|e| match e {
            DirectoryError::Parse { source, .. } => DirectoryError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        info!(
            "Loaded {} directory row(s) from {}",
            directory.len(),
            path.display()
        );
        Ok(directory)
    }

    /// Parse the TOML text of a directory file.
    pub fn parse(text: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = toml::from_str(text).map_err(|source| DirectoryError::Parse {
            path: Default::default(),
            source,
        })?;

        let entries = file
            .camera
            .into_iter()
            .enumerate()
            .map(|(i, row)| -> Result<DirectoryEntry, DirectoryError> {
                let server = row
                    .server
                    .trim()
                    .parse()
                    .map_err(|_| DirectoryError::BadAddress {
                        row: i + 1,
                        value: row.server.clone(),
                    })?;
                Ok(DirectoryEntry {
                    server,
                    camera_id: row.camera_id,
                    id: row.id.trim().to_string(),
                    direction: row.direction.trim().to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Directory { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DirectoryLookup for Directory {
    /// Rows with an empty id or direction never resolve.
    fn resolve(&self, server: IpAddr, camera_id: u32) -> Option<&DirectoryEntry> {
        self.entries
            .iter()
            .find(|e| e.server == server && e.camera_id == camera_id)
            .filter(|e| !e.id.is_empty() && !e.direction.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"
[[camera]]
server = "172.16.10.115"
camera_id = 10
id = "30403"
direction = "backward"

[[camera]]
server = "172.16.10.115"
camera_id = 10
id = "30404"
direction = "forward"

[[camera]]
server = "172.16.10.115"
camera_id = 11
id = "30405"

[[camera]]
server = "127.0.0.1"
camera_id = 3
id = "40001"
direction = "forward"
"#;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_first_match_wins() {
        let d = Directory::parse(TABLE).unwrap();
        assert_eq!(d.len(), 4);
        let e = d.resolve(ip("172.16.10.115"), 10).unwrap();
        assert_eq!(e.id, "30403");
        assert_eq!(e.direction, "backward");
    }

    #[test]
    fn test_keyed_by_server() {
        let d = Directory::parse(TABLE).unwrap();
        assert!(d.resolve(ip("127.0.0.1"), 10).is_none());
        assert_eq!(d.resolve(ip("127.0.0.1"), 3).unwrap().id, "40001");
    }

    #[test]
    fn test_missing_direction_does_not_resolve() {
        let d = Directory::parse(TABLE).unwrap();
        assert!(d.resolve(ip("172.16.10.115"), 11).is_none());
    }

    #[test]
    fn test_demo_table_parses() {
        let d = Directory::parse(include_str!("../../demos/directory.toml")).unwrap();
        assert_eq!(d.resolve(ip("172.16.10.115"), 10).unwrap().id, "30403");
    }

    #[test]
    fn test_bad_address_is_rejected() {
        let text = "[[camera]]\nserver = \"not-an-ip\"\ncamera_id = 1\nid = \"1\"\ndirection = \"forward\"\n";
        match Directory::parse(text) {
            Err(DirectoryError::BadAddress { row, value }) => {
                assert_eq!(row, 1);
                assert_eq!(value, "not-an-ip");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Directory::load(&dir.path().join("directory.toml")).unwrap_err();
        assert!(matches!(err, DirectoryError::Read { .. }));
    }

    #[test]
    fn test_load_malformed_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("directory.toml");
        std::fs::write(&path, "[[camera]]\ncamera_id = \"ten\"\n").unwrap();
        match Directory::load(&path) {
            Err(DirectoryError::Parse { path: p, .. }) => assert_eq!(p, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
