//! JSON bodies exchanged with the NVR web gateway.

use serde::{Deserialize, Serialize};

use crate::registry::{DeviceRecord, Overlay, StreamOptions};

/// `POST /api/nvrs`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddNvrRequest {
    pub address: String,
    pub port: u16,
}

/// `GET /api/nvrs/{address}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NvrInfo {
    pub address: String,
    #[serde(default)]
    pub name: String,
}

/// `POST /api/nvrs/{address}/login`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    /// `0` on success, a vendor result code otherwise.
    pub result: i32,
}

/// One element of `GET /api/nvrs/{address}/devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default)]
    pub name: String,
    pub connected: bool,
    #[serde(default)]
    pub entities: Vec<EntityInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityInfo {
    pub logical_id: u32,
    /// e.g. `camera`, `io`, `audio`.
    #[serde(default = "default_kind")]
    pub kind: String,
}

impl EntityInfo {
    pub fn is_camera(&self) -> bool {
        self.kind.eq_ignore_ascii_case("camera")
    }
}

fn default_kind() -> String {
    "camera".to_string()
}

impl From<DeviceInfo> for DeviceRecord {
    fn from(d: DeviceInfo) -> Self {
        DeviceRecord {
            name: d.name,
            connected: d.connected,
            logical_ids: d.entities.iter().map(|e| e.logical_id).collect(),
        }
    }
}

/// `POST /api/cameras/{logical_id}/streams`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStreamRequest {
    pub coding: String,
    pub mode: String,
    pub width: u32,
    pub height: u32,
    pub overlays: Vec<String>,
}

impl From<&StreamOptions> for CreateStreamRequest {
    fn from(o: &StreamOptions) -> Self {
        let overlays = match o.overlay {
            Overlay::None => vec![],
            Overlay::ImageTime => vec!["image_time".to_string()],
        };
        CreateStreamRequest {
            coding: "jpeg".into(),
            mode: "live".into(),
            width: o.width,
            height: o.height,
            overlays,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateStreamResponse {
    pub stream_id: String,
}

/// `PUT /api/streams/{id}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamState {
    pub enabled: bool,
}
