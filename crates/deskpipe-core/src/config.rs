use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CaptureError, CaptureResult};
use crate::frame::FrameFormat;
use crate::types::Region;

/// Capture session configuration.
///
/// A zero `width`/`height` means "capture the whole output"; otherwise the
/// rectangle `(offset_x, offset_y, width, height)` is read from the output
/// selected by `monitor_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenCaptureConfig {
    #[serde(alias = "frameRate")]
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    #[serde(alias = "offsetX")]
    pub offset_x: u32,
    #[serde(alias = "offsetY")]
    pub offset_y: u32,
    #[serde(alias = "monitorIndex")]
    pub monitor_index: u32,
    #[serde(alias = "captureCursor")]
    pub capture_cursor: bool,
    #[serde(alias = "useHardwareAcceleration")]
    pub use_hardware_acceleration: bool,
    #[serde(alias = "pixelFormat")]
    pub pixel_format: String,
}

impl Default for ScreenCaptureConfig {
    fn default() -> Self {
        Self {
            frame_rate: 30,
            width: 0,
            height: 0,
            offset_x: 0,
            offset_y: 0,
            monitor_index: 0,
            capture_cursor: true,
            use_hardware_acceleration: true,
            pixel_format: "BGRA".into(),
        }
    }
}

impl ScreenCaptureConfig {
    pub fn validate(&self) -> CaptureResult {
        if self.frame_rate == 0 {
            return Err(CaptureError::invalid_config("frame_rate must be greater than zero"));
        }
        if (self.width == 0) != (self.height == 0) {
            return Err(CaptureError::invalid_config(format!(
                "capture region {}x{} must set both width and height, or neither",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Tick interval of the capture loop: `1000ms / frame_rate`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1000 / self.frame_rate.max(1) as u64)
    }

    pub fn is_full_screen(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// The explicit capture rectangle, or `None` for the full output.
    pub fn region(&self) -> Option<Region> {
        if self.is_full_screen() {
            return None;
        }
        Some(Region { x: self.offset_x, y: self.offset_y, width: self.width, height: self.height })
    }

    pub fn preferred_format(&self) -> Option<FrameFormat> {
        FrameFormat::from_hint(&self.pixel_format)
    }
}

// MARK: - Processor configs

/// Output selection for the pixel format converter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixelFormatConverterConfig {
    #[serde(alias = "outputFormat")]
    pub output_format: FrameFormat,
    #[serde(alias = "useHardwareAcceleration")]
    pub use_hardware_acceleration: bool,
}

impl Default for PixelFormatConverterConfig {
    fn default() -> Self {
        Self { output_format: FrameFormat::I420, use_hardware_acceleration: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoScalerConfig {
    #[serde(alias = "targetWidth")]
    pub target_width: u32,
    #[serde(alias = "targetHeight")]
    pub target_height: u32,
    #[serde(alias = "maintainAspectRatio")]
    pub maintain_aspect_ratio: bool,
    pub algorithm: ScalingAlgorithm,
}

impl Default for VideoScalerConfig {
    fn default() -> Self {
        Self {
            target_width: 1920,
            target_height: 1080,
            maintain_aspect_ratio: true,
            algorithm: ScalingAlgorithm::Bilinear,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalingAlgorithm {
    #[default]
    Bilinear,
    Nearest,
}
