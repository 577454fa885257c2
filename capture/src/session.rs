//! Session controller – drives one capture run against one NVR.
//!
//! ```text
//! INIT → CONNECTING → AUTHENTICATING → ENUMERATING → CAPTURING → FINALIZED
//!            │               │
//!            └──── FAILED ───┘
//! ```
//!
//! Only connecting and logging in can fail the run. Enumeration falls
//! through with whatever it has at the deadline; capture errors are per
//! device.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{debug, error, info, warn};

use nvr_snapshot_common::config::{Config, Timeouts};
use nvr_snapshot_common::directory::DirectoryLookup;
use nvr_snapshot_common::registry::{DeviceRecord, Registry, ServerTarget, Session, StreamOptions};
use nvr_snapshot_common::report::{CaptureResult, ReportWriter};

use crate::frame;
use crate::marker::CompletionMarker;

/// Everything one run needs. Nothing here is global, so several runs
/// against different servers can share a process.
pub struct RunContext<'a> {
    pub target: ServerTarget,
    pub directory: &'a dyn DirectoryLookup,
    pub reports: ReportWriter,
    pub marker: CompletionMarker,
    pub timeouts: Timeouts,
    pub stream: StreamOptions,
}

impl<'a> RunContext<'a> {
    pub fn new(target: ServerTarget, config: &Config, directory: &'a dyn DirectoryLookup) -> Self {
        let marker = CompletionMarker::for_server(&config.output_dir, target.address);
        RunContext {
            target,
            directory,
            reports: ReportWriter::new(&config.output_dir, config.timestamp_suffix.clone()),
            marker,
            timeouts: config.timeouts(),
            stream: config.stream_options(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Login,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => f.write_str("connect"),
            Stage::Login => f.write_str("login"),
        }
    }
}

/// Counters for a completed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Devices reporting themselves connected.
    pub connected: usize,
    /// Frames successfully pulled.
    pub captured: usize,
    /// Report files written.
    pub reports: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The server's completion marker already existed.
    Skipped,
    Failed { stage: Stage, reason: String },
    Completed(RunSummary),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Init,
    Connecting,
    Authenticating,
    Enumerating,
    Capturing,
    Finalized,
    Failed,
}

fn transition(state: &mut RunState, next: RunState) {
    debug!("Run state {:?} → {:?}", state, next);
    *state = next;
}

/// Shuts the registry down on every exit path.
struct Teardown<'r, R: Registry>(&'r mut R);

impl<R: Registry> Deref for Teardown<'_, R> {
    type Target = R;

    fn deref(&self) -> &R {
        &*self.0
    }
}

impl<R: Registry> DerefMut for Teardown<'_, R> {
    fn deref_mut(&mut self) -> &mut R {
        &mut *self.0
    }
}

impl<R: Registry> Drop for Teardown<'_, R> {
    fn drop(&mut self) {
        self.0.shutdown();
        debug!("Registry released");
    }
}

/// Run one capture pass against `ctx.target`.
pub fn run_capture<R: Registry>(ctx: &RunContext<'_>, registry: &mut R) -> RunOutcome {
    let address = ctx.target.address;
    let mut state = RunState::Init;

    if ctx.marker.exists() {
        info!(
            "{address}: already finished ({}), nothing to do",
            ctx.marker.path().display()
        );
        return RunOutcome::Skipped;
    }

    let mut registry = Teardown(registry);

    // Duplicate-add errors are common and a session may still come up, so
    // registration failures only get logged.
    if let Err(e) = registry.add_server(ctx.target.endpoint()) {
        warn!("An error occurred while adding the NVR {}: {e}", ctx.target.endpoint());
    }

    transition(&mut state, RunState::Connecting);
    let session = poll_until(ctx.timeouts.connect, ctx.timeouts.poll_interval, |budget| {
        match registry.find_session(address, budget) {
            Ok(found) => found,
            Err(e) => {
                debug!("{address}: session not available yet: {e}");
                None
            }
        }
    });
    let Some(mut session) = session else {
        transition(&mut state, RunState::Failed);
        error!("An error occurred while connecting to the NVR {address}");
        return RunOutcome::Failed {
            stage: Stage::Connect,
            reason: format!("no session within {:?}", ctx.timeouts.connect),
        };
    };

    transition(&mut state, RunState::Authenticating);
    if let Err(e) = session.login(&ctx.target.credentials) {
        transition(&mut state, RunState::Failed);
        error!("Failed to login to NVR {address}: {e}");
        return RunOutcome::Failed {
            stage: Stage::Login,
            reason: e.to_string(),
        };
    }

    transition(&mut state, RunState::Enumerating);
    let devices = wait_for_devices(&mut session, &ctx.timeouts);
    info!("{address}: {} device(s) listed", devices.len());

    transition(&mut state, RunState::Capturing);
    let mut summary = RunSummary::default();
    for device in devices.iter().filter(|d| d.connected) {
        summary.connected += 1;
        let Some(capture) = capture_device(ctx, &mut session, device) else {
            continue;
        };
        summary.captured += 1;
        if write_report(ctx, &capture).is_some() {
            summary.reports += 1;
        }
    }

    if summary.connected > 0 {
        if let Err(e) = ctx.marker.create() {
            error!("{address}: {e:#}");
        }
    } else {
        info!("{address}: no connected devices, run left unmarked");
    }

    transition(&mut state, RunState::Finalized);
    info!(
        "{address}: capture finished ({} connected, {} captured, {} report(s))",
        summary.connected, summary.captured, summary.reports
    );
    RunOutcome::Completed(summary)
}

/// Poll the device list until it is non-empty or the deadline passes.
fn wait_for_devices<S: Session>(session: &mut S, timeouts: &Timeouts) -> Vec<DeviceRecord> {
    poll_until(timeouts.devices, timeouts.poll_interval, |budget| {
        match session.devices(budget) {
            Ok(list) if !list.is_empty() => Some(list),
            Ok(_) => None,
            Err(e) => {
                warn!("Cannot list devices: {e}");
                None
            }
        }
    })
    .unwrap_or_else(|| {
        warn!("Device list still empty after {:?}", timeouts.devices);
        Vec::new()
    })
}

fn capture_device<S: Session>(
    ctx: &RunContext<'_>,
    session: &mut S,
    device: &DeviceRecord,
) -> Option<CaptureResult> {
    let Some(logical_id) = device.primary_logical_id() else {
        warn!("Device {:?} exposes no entities, skipping", device.name);
        return None;
    };

    let camera = match session.camera(logical_id) {
        Ok(Some(camera)) => camera,
        Ok(None) => {
            warn!("The camera with LogicalId {logical_id} is not connected to the NVR");
            return None;
        }
        Err(e) => {
            warn!("Cannot resolve camera {logical_id}: {e}");
            return None;
        }
    };

    match frame::acquire_frame(&camera, &ctx.stream, ctx.timeouts.frame) {
        Ok(image) => Some(CaptureResult {
            logical_id,
            image,
            captured_at: Local::now().naive_local(),
        }),
        Err(e) => {
            warn!("Camera {logical_id}: {e}");
            None
        }
    }
}

fn write_report(ctx: &RunContext<'_>, capture: &CaptureResult) -> Option<PathBuf> {
    let Some(entry) = ctx.directory.resolve(ctx.target.address, capture.logical_id) else {
        info!(
            "No directory entry for {} camera {}, report skipped",
            ctx.target.address, capture.logical_id
        );
        return None;
    };

    match ctx
        .reports
        .write(&capture.image, &entry.id, &entry.direction, capture.captured_at)
    {
        Ok(path) => Some(path),
        Err(e) => {
            warn!("Camera {}: {e:#}", capture.logical_id);
            None
        }
    }
}

/// Call `attempt` until it yields a value or `deadline` elapses, sleeping
/// `interval` between attempts. Always tries at least once. Each attempt is
/// handed the time left in the window and must not block longer.
fn poll_until<T>(
    deadline: Duration,
    interval: Duration,
    mut attempt: impl FnMut(Duration) -> Option<T>,
) -> Option<T> {
    let end = Instant::now() + deadline;
    loop {
        let remaining = end.saturating_duration_since(Instant::now());
        if let Some(value) = attempt(remaining) {
            return Some(value);
        }
        let now = Instant::now();
        if now >= end {
            return None;
        }
        std::thread::sleep(interval.min(end - now));
    }
}
