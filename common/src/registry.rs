//! The registry seam: the remote NVR, its authenticated session, the
//! cameras it exposes and a live stream against one camera.
//!
//! The session controller only ever talks to these traits, so it runs
//! against the HTTP gateway in production and against in-memory fakes in
//! tests.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use crate::error::RegistryError;

/// User name and password for the NVR login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// One remote registry instance. Immutable for the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub address: IpAddr,
    pub port: u16,
    pub credentials: Credentials,
}

impl ServerTarget {
    pub fn endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }
}

/// A physical device (camera) reported by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub name: String,
    pub connected: bool,
    /// Logical ids of the entities hosted by the device; the first one is
    /// the primary entity.
    pub logical_ids: Vec<u32>,
}

impl DeviceRecord {
    pub fn primary_logical_id(&self) -> Option<u32> {
        self.logical_ids.first().copied()
    }
}

/// On-image overlays requested from the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Overlay {
    None,
    ImageTime,
}

/// Output configuration of a single-shot live stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    pub width: u32,
    pub height: u32,
    pub overlay: Overlay,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            width: 2048,
            height: 1536,
            overlay: Overlay::ImageTime,
        }
    }
}

/// Device registry (the NVR client). Owns the session for one address.
pub trait Registry {
    type Session: Session;

    /// Ask the registry to connect to `endpoint` ("add NVR").
    fn add_server(&mut self, endpoint: SocketAddr) -> Result<(), RegistryError>;

    /// The established session for `address`, if it exists yet. The call
    /// must return within `budget`.
    fn find_session(
        &mut self,
        address: IpAddr,
        budget: Duration,
    ) -> Result<Option<Self::Session>, RegistryError>;

    /// Release every resource held by the registry. Must be idempotent.
    fn shutdown(&mut self);
}

/// An established (possibly not yet authenticated) connection to one NVR.
pub trait Session {
    type Camera: Camera;

    fn login(&mut self, credentials: &Credentials) -> Result<(), RegistryError>;

    /// Devices currently known to the NVR. May be empty right after login.
    /// The call must return within `budget`.
    fn devices(&mut self, budget: Duration) -> Result<Vec<DeviceRecord>, RegistryError>;

    /// The capturable video entity with `logical_id`, if the NVR has one.
    fn camera(&mut self, logical_id: u32) -> Result<Option<Self::Camera>, RegistryError>;
}

/// Any entity that can be opened as a live image stream.
pub trait Camera {
    type Stream: LiveStream;

    fn logical_id(&self) -> u32;

    /// Create a live stream configured with `options`. The stream starts
    /// disabled.
    fn open_stream(&self, options: &StreamOptions) -> Result<Self::Stream, RegistryError>;
}

/// A live stream owned by one caller. Dropping it releases it.
pub trait LiveStream {
    fn set_enabled(&mut self, enabled: bool) -> Result<(), RegistryError>;

    /// Block up to `max_wait` for the next frame. `Ok(None)` means no frame
    /// arrived in time.
    fn next_frame(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>, RegistryError>;
}
