//! Configuration parsing – reads a KEY=VALUE file (`snapshot.conf`).
//!
//! Every key is optional; a missing file means built-in defaults.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use crate::registry::StreamOptions;

/// Application configuration for one capture run.
#[derive(Debug, Clone)]
pub struct Config {
    // ── filesystem ───────────────────────────────────────────────────
    /// Where reports and `.finished` markers are written.
    pub output_dir: PathBuf,
    /// TOML table mapping (server, camera id) → (label, direction).
    pub directory_file: PathBuf,

    // ── registry ─────────────────────────────────────────────────────
    /// Base URL of the NVR web gateway.
    pub gateway_url: String,
    /// Port the NVR itself listens on (sent with the add-NVR request).
    pub nvr_port: u16,
    pub http_timeout_secs: u64,

    // ── wait budgets ─────────────────────────────────────────────────
    pub connect_timeout_secs: u64,
    pub device_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub frame_timeout_secs: u64,

    // ── frame / report ───────────────────────────────────────────────
    pub frame_width: u32,
    pub frame_height: u32,
    /// Fixed UTC-offset suffix appended to the report timestamp.
    pub timestamp_suffix: String,
}

impl Default for Config {
    fn default() -> Self {
        let base = exe_dir();
        Config {
            output_dir: base.join("video"),
            directory_file: base.join("directory.toml"),
            gateway_url: "http://127.0.0.1:8380".into(),
            nvr_port: 38880,
            http_timeout_secs: 90,
            connect_timeout_secs: 10,
            device_timeout_secs: 10,
            poll_interval_ms: 500,
            frame_timeout_secs: 60,
            frame_width: 2048,
            frame_height: 1536,
            timestamp_suffix: "+04".into(),
        }
    }
}

impl Config {
    /// Default config path: `snapshot.conf` next to the executable.
    pub fn default_path() -> PathBuf {
        exe_dir().join("snapshot.conf")
    }

    /// Polling and frame-wait budgets.
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            connect: Duration::from_secs(self.connect_timeout_secs),
            devices: Duration::from_secs(self.device_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            frame: Duration::from_secs(self.frame_timeout_secs),
        }
    }

    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            width: self.frame_width,
            height: self.frame_height,
            ..StreamOptions::default()
        }
    }
}

/// Bounded wait windows used by the session controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// How long to wait for the session to appear after adding the NVR.
    pub connect: Duration,
    /// How long to wait for a non-empty device list after login.
    pub devices: Duration,
    /// Sleep between two polls of either wait.
    pub poll_interval: Duration,
    /// Maximum wait for a single frame per camera.
    pub frame: Duration,
}

/// Directory containing the running executable, or `.` if unknown.
pub fn exe_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Load the config at `path`, or defaults when `path` is `None` and the
/// default file does not exist.
pub fn load_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => load(p),
        None => {
            let p = Config::default_path();
            if p.exists() {
                load(&p)
            } else {
                info!("No config at {}, using defaults", p.display());
                Ok(Config::default())
            }
        }
    }
}

/// Parse a `KEY=VALUE` configuration file.
///
/// Lines starting with `#` are comments.  Values may be optionally
/// double-quoted.  Unknown keys are silently ignored.
pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config: {}", path.display()))?;

    let config = from_map(&parse_conf(&text));
    info!("Loaded config from {}", path.display());
    Ok(config)
}

fn from_map(map: &HashMap<String, String>) -> Config {
    let defaults = Config::default();

    let get = |key: &str| -> Option<String> { map.get(key).cloned().filter(|s| !s.is_empty()) };
    let get_u64 = |key: &str, default: u64| -> u64 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };
    let get_u32 = |key: &str, default: u32| -> u32 {
        get(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    };

    Config {
        output_dir: get("OUTPUT_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.output_dir),
        directory_file: get("DIRECTORY_FILE")
            .map(PathBuf::from)
            .unwrap_or(defaults.directory_file),
        gateway_url: get("GATEWAY_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.gateway_url),
        nvr_port: get("NVR_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.nvr_port),
        http_timeout_secs: get_u64("HTTP_TIMEOUT_SECS", defaults.http_timeout_secs),
        connect_timeout_secs: get_u64("CONNECT_TIMEOUT_SECS", defaults.connect_timeout_secs),
        device_timeout_secs: get_u64("DEVICE_TIMEOUT_SECS", defaults.device_timeout_secs),
        poll_interval_ms: get_u64("POLL_INTERVAL_MS", defaults.poll_interval_ms),
        frame_timeout_secs: get_u64("FRAME_TIMEOUT_SECS", defaults.frame_timeout_secs),
        frame_width: get_u32("FRAME_WIDTH", defaults.frame_width),
        frame_height: get_u32("FRAME_HEIGHT", defaults.frame_height),
        timestamp_suffix: map
            .get("TIMESTAMP_SUFFIX")
            .cloned()
            .unwrap_or(defaults.timestamp_suffix),
    }
}

/// Parse `KEY=VALUE` lines into a map, stripping optional double-quotes.
fn parse_conf(text: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, val)) = line.split_once('=') {
            let key = key.trim();
            let val = val.trim().trim_matches('"');
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

// ─── tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conf() {
        let text = r#"
# comment
OUTPUT_DIR=/srv/video
GATEWAY_URL="http://10.0.0.5:8380/"
TIMESTAMP_SUFFIX="+03"
"#;
        let map = parse_conf(text);
        assert_eq!(map["OUTPUT_DIR"], "/srv/video");
        assert_eq!(map["GATEWAY_URL"], "http://10.0.0.5:8380/");
        assert_eq!(map["TIMESTAMP_SUFFIX"], "+03");
    }

    #[test]
    fn test_defaults_match_wait_budgets() {
        let t = Config::default().timeouts();
        assert_eq!(t.connect, Duration::from_secs(10));
        assert_eq!(t.devices, Duration::from_secs(10));
        assert_eq!(t.poll_interval, Duration::from_millis(500));
        assert_eq!(t.frame, Duration::from_secs(60));
    }

    #[test]
    fn test_load_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshot.conf");
        std::fs::write(
            &path,
            "GATEWAY_URL=http://gw:9000/\nPOLL_INTERVAL_MS=250\nFRAME_WIDTH=640\nNVR_PORT=bogus\n",
        )
        .unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.gateway_url, "http://gw:9000");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.stream_options().width, 640);
        assert_eq!(config.stream_options().height, 1536);
        // unparseable values fall back to the default
        assert_eq!(config.nvr_port, 38880);
    }

    #[test]
    fn test_missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_or_default(Some(&dir.path().join("nope.conf"))).is_err());
    }
}
