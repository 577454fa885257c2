//! Single-shot frame acquisition.
//!
//! Opens a live stream against one camera, waits for one frame and tears
//! the stream down again. The stream is disabled and released on every
//! path, including timeouts and errors.

use std::ops::{Deref, DerefMut};
use std::time::Duration;

use tracing::{debug, warn};

use nvr_snapshot_common::error::CaptureError;
use nvr_snapshot_common::registry::{Camera, LiveStream, StreamOptions};

/// Owns an enabled stream; disables it when dropped.
struct EnabledStream<S: LiveStream> {
    stream: S,
    logical_id: u32,
}

impl<S: LiveStream> EnabledStream<S> {
    fn enable(mut stream: S, logical_id: u32) -> Result<Self, CaptureError> {
        stream.set_enabled(true).map_err(CaptureError::Stream)?;
        Ok(EnabledStream { stream, logical_id })
    }
}

impl<S: LiveStream> Deref for EnabledStream<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.stream
    }
}

impl<S: LiveStream> DerefMut for EnabledStream<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

impl<S: LiveStream> Drop for EnabledStream<S> {
    fn drop(&mut self) {
        if let Err(e) = self.stream.set_enabled(false) {
            warn!("Cannot disable stream for camera {}: {e}", self.logical_id);
        }
        debug!("Stream for camera {} released", self.logical_id);
    }
}

/// Pull exactly one frame from `camera`, waiting at most `max_wait`.
pub fn acquire_frame<C: Camera>(
    camera: &C,
    options: &StreamOptions,
    max_wait: Duration,
) -> Result<Vec<u8>, CaptureError> {
    let logical_id = camera.logical_id();
    let stream = camera.open_stream(options).map_err(CaptureError::Open)?;
    let mut stream = EnabledStream::enable(stream, logical_id)?;

    debug!(
        "Waiting up to {:?} for a {}x{} frame from camera {logical_id}",
        max_wait, options.width, options.height
    );

    match stream.next_frame(max_wait).map_err(CaptureError::Stream)? {
        Some(frame) if frame.is_empty() => Err(CaptureError::EmptyFrame),
        Some(frame) => Ok(frame),
        None => Err(CaptureError::Timeout(max_wait)),
    }
}
