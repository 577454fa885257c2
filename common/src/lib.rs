//! Types shared by the snapshot binary: configuration, the registry seam,
//! the device directory and the XML report writer.

pub mod config;
pub mod directory;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod report;
