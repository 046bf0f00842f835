use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One raw frame as produced by a capture source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGB8 pixel buffer.
    pub data: Vec<u8>,
    pub captured_at: DateTime<Utc>,
}

impl CameraFrame {
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            data,
            captured_at: Utc::now(),
        }
    }

    pub fn empty() -> Self {
        Self::from_rgb(0, 0, Vec::new())
    }
}
