//! NVR snapshot – grabs one still frame from every connected camera of an
//! NVR and writes each as an XML report.
//!
//! This binary:
//! 1. Parses `-s<ip> -u<user> -p<password>` (no address → silent exit)
//! 2. Reads `snapshot.conf` and the device directory
//! 3. Runs one capture pass through the NVR web gateway
//!
//! A `.finished` marker per server makes later invocations no-ops.

mod args;
mod frame;
mod gateway;
mod marker;
mod session;

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info};

use nvr_snapshot_common::config;
use nvr_snapshot_common::directory::Directory;
use nvr_snapshot_common::registry::{Credentials, ServerTarget};

use crate::gateway::GatewayRegistry;
use crate::session::{RunContext, RunOutcome};

fn main() -> Result<()> {
    let args = args::parse(std::env::args().skip(1));
    let Some(address) = args.address else {
        return Ok(());
    };

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    // ── load config ──────────────────────────────────────────────────
    let config = config::load_or_default(args.config.as_deref()).context("Config load failed")?;
    let directory_path = args
        .directory
        .clone()
        .unwrap_or_else(|| config.directory_file.clone());
    let directory = Directory::load(&directory_path).context("Directory load failed")?;

    let target = ServerTarget {
        address,
        port: config.nvr_port,
        credentials: Credentials {
            username: args.username,
            password: args.password,
        },
    };
    info!(
        "NVR snapshot starting (server={}, gateway={}, output={})",
        target.endpoint(),
        config.gateway_url,
        config.output_dir.display()
    );

    // ── run ──────────────────────────────────────────────────────────
    let ctx = RunContext::new(target, &config, &directory);
    let mut registry =
        GatewayRegistry::new(&config.gateway_url, Duration::from_secs(config.http_timeout_secs))?;

    match session::run_capture(&ctx, &mut registry) {
        RunOutcome::Skipped => info!("{address}: skipped, run already finished"),
        RunOutcome::Failed { stage, reason } => error!("{address}: {stage} failed: {reason}"),
        RunOutcome::Completed(summary) => info!(
            "{address}: done, {} of {} connected camera(s) reported",
            summary.reports, summary.connected
        ),
    }

    Ok(())
}
