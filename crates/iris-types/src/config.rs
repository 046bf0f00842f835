use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{IrisError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraConfig {
    pub device: String,
    pub fixed_resolution: Option<(u32, u32)>,
    pub ffmpeg_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// JPEG quality factor in the 0.0..=1.0 range used by the wire contract.
    pub jpeg_quality: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    pub server_url: String,
    pub connect_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cadence between outbound frames while recording.
    pub frame_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpsConfig {
    pub log_level: String,
    pub journal_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IrisConfig {
    pub camera: CameraConfig,
    pub encoder: EncoderConfig,
    pub transport: TransportConfig,
    pub session: SessionConfig,
    pub ops: OpsConfig,
}

impl IrisConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            IrisError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            IrisError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.camera.device.trim().is_empty() {
            return Err(IrisError::Configuration(
                "camera.device must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.encoder.jpeg_quality) || self.encoder.jpeg_quality == 0.0 {
            return Err(IrisError::Configuration(
                "encoder.jpeg_quality must be within (0.0, 1.0]".into(),
            ));
        }
        if !self.transport.server_url.starts_with("ws://")
            && !self.transport.server_url.starts_with("wss://")
        {
            return Err(IrisError::Configuration(
                "transport.server_url must use the ws:// or wss:// scheme".into(),
            ));
        }
        if self.transport.connect_timeout_ms == 0 {
            return Err(IrisError::Configuration(
                "transport.connect_timeout_ms must be greater than zero".into(),
            ));
        }
        if self.session.frame_interval_ms == 0 {
            return Err(IrisError::Configuration(
                "session.frame_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
