//! Error types shared by the registry seam, the frame acquirer and the
//! device directory.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by a [`Registry`](crate::registry::Registry)
/// implementation.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry rejected the request: {0}")]
    Rejected(String),
    #[error("login refused with result code {0}")]
    Login(i32),
    #[error("unexpected HTTP status {status} from {url}")]
    Status { url: String, status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
}

/// Per-device failure while pulling a single frame.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("cannot open live stream: {0}")]
    Open(#[source] RegistryError),
    #[error("live stream failed: {0}")]
    Stream(#[source] RegistryError),
    #[error("no frame within {0:?}")]
    Timeout(Duration),
    #[error("stream returned an empty frame")]
    EmptyFrame,
}

/// Failures loading the device directory table.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("cannot read directory file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed directory file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("directory row {row}: invalid server address {value:?}")]
    BadAddress { row: usize, value: String },
}
