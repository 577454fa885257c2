//! Per-server `.finished` sentinel that makes repeated runs no-ops.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

#[derive(Debug, Clone)]
pub struct CompletionMarker {
    path: PathBuf,
}

impl CompletionMarker {
    /// `<dir>/<address without separators>.finished`, e.g.
    /// `172.16.10.115` → `1721610115.finished`.
    pub fn for_server(dir: &Path, address: IpAddr) -> Self {
        let key = address.to_string().replace(['.', ':'], "");
        CompletionMarker {
            path: dir.join(format!("{key}.finished")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Create the empty marker file. Creating an already present marker is
    /// not an error.
    pub fn create(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }

        match OpenOptions::new().write(true).create_new(true).open(&self.path) {
            Ok(file) => {
                file.sync_all()
                    .with_context(|| format!("Cannot flush {}", self.path.display()))?;
                info!("Run marked finished: {}", self.path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Cannot create marker {}", self.path.display()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_name_strips_dots() {
        let m = CompletionMarker::for_server(Path::new("/srv/video"), "172.16.10.115".parse().unwrap());
        assert_eq!(m.path(), Path::new("/srv/video/1721610115.finished"));
    }

    #[test]
    fn test_marker_name_for_ipv6() {
        let m = CompletionMarker::for_server(Path::new("v"), "fe80::1".parse().unwrap());
        assert_eq!(m.path(), Path::new("v/fe801.finished"));
    }

    #[test]
    fn test_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let m = CompletionMarker::for_server(&dir.path().join("video"), "10.0.0.1".parse().unwrap());
        assert!(!m.exists());

        m.create().unwrap();
        assert!(m.exists());
        assert_eq!(std::fs::metadata(m.path()).unwrap().len(), 0);

        m.create().unwrap();
        assert!(m.exists());
    }
}
