//! Camera device abstraction layer.

mod ffmpeg;

pub use ffmpeg::FfmpegCamera;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use iris_types::{config::CameraConfig, frame::CameraFrame, IrisError, Result};
use tokio::time::{sleep, Duration};
use tracing::info;

/// Aggregated capture performance counters.
#[derive(Debug, Default, Clone)]
pub struct CameraMetrics {
    pub frames_grabbed: u64,
    pub failed_grabs: u64,
    pub last_grab_at: Option<DateTime<Utc>>,
}

/// A live camera feed handle.
///
/// `acquire` may fail (device missing, permission denied); `release` must be
/// safe to call on every path back to idle, including paths where no frame
/// was ever grabbed.
#[async_trait]
pub trait CameraSource: Send + Sync {
    async fn acquire(&mut self) -> Result<()>;
    async fn grab(&self) -> Result<CameraFrame>;
    async fn release(&mut self) -> Result<()>;
    fn metrics(&self) -> CameraMetrics;
}

/// Synthetic camera used for development and integration testing.
pub struct MockCamera {
    config: CameraConfig,
    acquired: bool,
    metrics: Arc<Mutex<CameraMetrics>>,
}

impl MockCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            acquired: false,
            metrics: Arc::new(Mutex::new(CameraMetrics::default())),
        }
    }

    fn resolution(&self) -> (u32, u32) {
        self.config.fixed_resolution.unwrap_or((640, 480))
    }
}

#[async_trait]
impl CameraSource for MockCamera {
    async fn acquire(&mut self) -> Result<()> {
        info!("Acquiring mock camera for {}", self.config.device);
        sleep(Duration::from_millis(20)).await;
        self.acquired = true;
        Ok(())
    }

    async fn grab(&self) -> Result<CameraFrame> {
        if !self.acquired {
            return Err(camera_error("mock camera grabbed before acquire"));
        }
        sleep(Duration::from_millis(5)).await;
        let (width, height) = self.resolution();
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push((x % 256) as u8);
                data.push((y % 256) as u8);
                data.push(128);
            }
        }
        record_grab(&self.metrics);
        Ok(CameraFrame::from_rgb(width, height, data))
    }

    async fn release(&mut self) -> Result<()> {
        if self.acquired {
            info!("Releasing mock camera");
        }
        self.acquired = false;
        Ok(())
    }

    fn metrics(&self) -> CameraMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

/// Generate an error aligned with camera semantics.
pub fn camera_error(message: impl Into<String>) -> IrisError {
    IrisError::Camera(message.into())
}

pub(crate) fn record_grab(metrics: &Arc<Mutex<CameraMetrics>>) {
    if let Ok(mut guard) = metrics.lock() {
        guard.frames_grabbed += 1;
        guard.last_grab_at = Some(Utc::now());
    }
}

pub(crate) fn record_failure(metrics: &Arc<Mutex<CameraMetrics>>) {
    if let Ok(mut guard) = metrics.lock() {
        guard.failed_grabs += 1;
    }
}
