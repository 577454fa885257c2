//! `Registry` implementation backed by the NVR web gateway.
//!
//! The gateway fronts the vendor SDK and exposes NVR sessions, device
//! lists and single-shot live streams over HTTP/JSON.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use nvr_snapshot_common::error::RegistryError;
use nvr_snapshot_common::protocol::{
    AddNvrRequest, CreateStreamRequest, CreateStreamResponse, DeviceInfo, LoginRequest,
    LoginResponse, NvrInfo, StreamState,
};
use nvr_snapshot_common::registry::{
    Camera, Credentials, DeviceRecord, LiveStream, Registry, Session, StreamOptions,
};

/// Extra time granted to the HTTP request on top of the frame wait.
const FRAME_SLACK: Duration = Duration::from_secs(5);

/// Shortest timeout given to a poll request, even when its window is spent.
const MIN_POLL_TIMEOUT: Duration = Duration::from_millis(100);

fn poll_timeout(budget: Duration) -> Duration {
    budget.max(MIN_POLL_TIMEOUT)
}

fn transport(e: reqwest::Error) -> RegistryError {
    RegistryError::Transport(e.to_string())
}

/// Shared HTTP plumbing. `Client` is reference counted, so clones are cheap.
#[derive(Debug, Clone)]
struct Http {
    client: Client,
    base_url: String,
}

impl Http {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Turn a non-success status into `RegistryError::Status`.
    fn check(url: &str, resp: Response) -> Result<Response, RegistryError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(RegistryError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            })
        }
    }
}

#[derive(Debug)]
pub struct GatewayRegistry {
    http: Http,
    /// NVR registered by `add_server`, removed again on shutdown.
    registered: Option<String>,
}

impl GatewayRegistry {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Cannot create HTTP client")?;
        Ok(GatewayRegistry {
            http: Http {
                client,
                base_url: base_url.trim_end_matches('/').to_string(),
            },
            registered: None,
        })
    }
}

impl Registry for GatewayRegistry {
    type Session = GatewaySession;

    fn add_server(&mut self, endpoint: SocketAddr) -> Result<(), RegistryError> {
        let url = self.http.url("/api/nvrs");
        let resp = self
            .http
            .client
            .post(&url)
            .json(&AddNvrRequest {
                address: endpoint.ip().to_string(),
                port: endpoint.port(),
            })
            .send()
            .map_err(transport)?;

        if resp.status() == StatusCode::CONFLICT {
            return Err(RegistryError::Rejected(format!("{endpoint} already added")));
        }
        Http::check(&url, resp)?;
        self.registered = Some(endpoint.ip().to_string());
        info!("NVR {endpoint} submitted to gateway");
        Ok(())
    }

    fn find_session(
        &mut self,
        address: IpAddr,
        budget: Duration,
    ) -> Result<Option<GatewaySession>, RegistryError> {
        let url = self.http.url(&format!("/api/nvrs/{address}"));
        let resp = self
            .http
            .client
            .get(&url)
            .timeout(poll_timeout(budget))
            .send()
            .map_err(transport)?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: NvrInfo = Http::check(&url, resp)?.json().map_err(transport)?;
        debug!("Session to {} ({:?}) established", info.address, info.name);
        Ok(Some(GatewaySession {
            http: self.http.clone(),
            address: address.to_string(),
            devices: Vec::new(),
        }))
    }

    fn shutdown(&mut self) {
        let Some(address) = self.registered.take() else {
            return;
        };
        let url = self.http.url(&format!("/api/nvrs/{address}"));
        match self.http.client.delete(&url).send() {
            Ok(r) if r.status().is_success() || r.status() == StatusCode::NOT_FOUND => {
                debug!("NVR {address} removed from gateway");
            }
            Ok(r) => warn!("Gateway DELETE {url}: {}", r.status()),
            Err(e) => warn!("Cannot reach gateway for DELETE {url}: {e}"),
        }
    }
}

#[derive(Debug)]
pub struct GatewaySession {
    http: Http,
    address: String,
    /// Last device list fetched, used to resolve cameras.
    devices: Vec<DeviceInfo>,
}

impl GatewaySession {
    fn fetch_devices(&mut self, timeout: Option<Duration>) -> Result<(), RegistryError> {
        let url = self.http.url(&format!("/api/nvrs/{}/devices", self.address));
        let mut req = self.http.client.get(&url);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }
        let resp = req.send().map_err(transport)?;
        self.devices = Http::check(&url, resp)?.json().map_err(transport)?;
        Ok(())
    }
}

impl Session for GatewaySession {
    type Camera = GatewayCamera;

    fn login(&mut self, credentials: &Credentials) -> Result<(), RegistryError> {
        let url = self.http.url(&format!("/api/nvrs/{}/login", self.address));
        let resp = self
            .http
            .client
            .post(&url)
            .json(&LoginRequest {
                username: credentials.username.clone(),
                password: credentials.password.clone(),
            })
            .send()
            .map_err(transport)?;

        let body: LoginResponse = Http::check(&url, resp)?.json().map_err(transport)?;
        if body.result != 0 {
            return Err(RegistryError::Login(body.result));
        }
        info!("Logged in to NVR {} as {:?}", self.address, credentials.username);
        Ok(())
    }

    fn devices(&mut self, budget: Duration) -> Result<Vec<DeviceRecord>, RegistryError> {
        self.fetch_devices(Some(poll_timeout(budget)))?;
        Ok(self.devices.iter().cloned().map(DeviceRecord::from).collect())
    }

    fn camera(&mut self, logical_id: u32) -> Result<Option<GatewayCamera>, RegistryError> {
        if self.devices.is_empty() {
            self.fetch_devices(None)?;
        }
        let found = self
            .devices
            .iter()
            .flat_map(|d| &d.entities)
            .any(|e| e.logical_id == logical_id && e.is_camera());

        Ok(found.then(|| GatewayCamera {
            http: self.http.clone(),
            logical_id,
        }))
    }
}

#[derive(Debug)]
pub struct GatewayCamera {
    http: Http,
    logical_id: u32,
}

impl Camera for GatewayCamera {
    type Stream = GatewayStream;

    fn logical_id(&self) -> u32 {
        self.logical_id
    }

    fn open_stream(&self, options: &StreamOptions) -> Result<GatewayStream, RegistryError> {
        let url = self
            .http
            .url(&format!("/api/cameras/{}/streams", self.logical_id));
        let resp = self
            .http
            .client
            .post(&url)
            .json(&CreateStreamRequest::from(options))
            .send()
            .map_err(transport)?;

        let body: CreateStreamResponse = Http::check(&url, resp)?.json().map_err(transport)?;
        debug!("Stream {} opened for camera {}", body.stream_id, self.logical_id);
        Ok(GatewayStream {
            http: self.http.clone(),
            id: body.stream_id,
        })
    }
}

#[derive(Debug)]
pub struct GatewayStream {
    http: Http,
    id: String,
}

impl LiveStream for GatewayStream {
    fn set_enabled(&mut self, enabled: bool) -> Result<(), RegistryError> {
        let url = self.http.url(&format!("/api/streams/{}", self.id));
        let resp = self
            .http
            .client
            .put(&url)
            .json(&StreamState { enabled })
            .send()
            .map_err(transport)?;
        Http::check(&url, resp)?;
        Ok(())
    }

    fn next_frame(&mut self, max_wait: Duration) -> Result<Option<Vec<u8>>, RegistryError> {
        let url = self.http.url(&format!(
            "/api/streams/{}/frame?wait_ms={}",
            self.id,
            max_wait.as_millis()
        ));
        let resp = self
            .http
            .client
            .get(&url)
            .timeout(max_wait + FRAME_SLACK)
            .send()
            .map_err(transport)?;

        if resp.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        let bytes = Http::check(&url, resp)?.bytes().map_err(transport)?;
        Ok(Some(bytes.to_vec()))
    }
}

impl Drop for GatewayStream {
    fn drop(&mut self) {
        let url = self.http.url(&format!("/api/streams/{}", self.id));
        if let Err(e) = self.http.client.delete(&url).send() {
            warn!("Cannot release stream {}: {e}", self.id);
        }
    }
}
