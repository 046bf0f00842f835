use std::{
    path::PathBuf,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use image::ImageFormat;
use iris_types::{config::CameraConfig, frame::CameraFrame, Result};
use tokio::process::Command;

use crate::{camera_error, record_failure, record_grab, CameraMetrics, CameraSource};

const DEFAULT_FFMPEG: &str = "ffmpeg";

/// Capture source backed by an external `ffmpeg` process.
///
/// Each grab spawns one short-lived process that pulls a single still from
/// the V4L2 device and pipes it back as PNG, so nothing holds the device
/// between grabs and the frame always carries the feed's native resolution.
pub struct FfmpegCamera {
    config: CameraConfig,
    ffmpeg_path: PathBuf,
    metrics: Arc<Mutex<CameraMetrics>>,
}

impl FfmpegCamera {
    pub fn new(config: CameraConfig) -> Self {
        let ffmpeg_path = config
            .ffmpeg_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_FFMPEG));

        Self {
            config,
            ffmpeg_path,
            metrics: Arc::new(Mutex::new(CameraMetrics::default())),
        }
    }

    fn grab_args(&self) -> Vec<String> {
        let mut args = vec![
            "-hide_banner".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-f".to_string(),
            "v4l2".to_string(),
        ];
        if let Some((width, height)) = self.config.fixed_resolution {
            args.push("-video_size".to_string());
            args.push(format!("{width}x{height}"));
        }
        args.extend([
            "-i".to_string(),
            self.config.device.clone(),
            "-frames:v".to_string(),
            "1".to_string(),
            "-f".to_string(),
            "image2pipe".to_string(),
            "-vcodec".to_string(),
            "png".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<Vec<u8>> {
        let mut command = Command::new(&self.ffmpeg_path);
        command.args(args);
        let output = command.output().await.map_err(|err| {
            camera_error(format!(
                "failed to spawn {}: {err}",
                self.ffmpeg_path.display()
            ))
        })?;

        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(camera_error(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }

    async fn grab_once(&self) -> Result<CameraFrame> {
        let raw = self.run_ffmpeg(&self.grab_args()).await?;
        let img = image::load_from_memory_with_format(&raw, ImageFormat::Png)
            .map_err(|err| camera_error(format!("failed to decode grabbed still: {err}")))?;
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Ok(CameraFrame::from_rgb(width, height, rgb.into_raw()))
    }
}

#[async_trait]
impl CameraSource for FfmpegCamera {
    async fn acquire(&mut self) -> Result<()> {
        tracing::info!("Probing camera device {}", self.config.device);
        // A throwaway grab verifies the device exists and is readable.
        self.grab_once().await.map(|_| ())
    }

    async fn grab(&self) -> Result<CameraFrame> {
        match self.grab_once().await {
            Ok(frame) => {
                record_grab(&self.metrics);
                Ok(frame)
            }
            Err(err) => {
                record_failure(&self.metrics);
                Err(err)
            }
        }
    }

    async fn release(&mut self) -> Result<()> {
        // Process-per-grab holds no device handle between grabs.
        tracing::debug!("Releasing camera device {}", self.config.device);
        Ok(())
    }

    fn metrics(&self) -> CameraMetrics {
        self.metrics.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(resolution: Option<(u32, u32)>) -> CameraConfig {
        CameraConfig {
            device: "/dev/video0".into(),
            fixed_resolution: resolution,
            ffmpeg_path: None,
        }
    }

    #[test]
    fn grab_args_request_one_png_still() {
        let camera = FfmpegCamera::new(config(None));
        let args = camera.grab_args();
        assert!(args.windows(2).any(|w| w == ["-i", "/dev/video0"]));
        assert!(args.windows(2).any(|w| w == ["-frames:v", "1"]));
        assert!(args.windows(2).any(|w| w == ["-vcodec", "png"]));
        assert!(!args.iter().any(|a| a == "-video_size"));
    }

    #[test]
    fn grab_args_honor_fixed_resolution() {
        let camera = FfmpegCamera::new(config(Some((1280, 720))));
        let args = camera.grab_args();
        assert!(args.windows(2).any(|w| w == ["-video_size", "1280x720"]));
    }
}
