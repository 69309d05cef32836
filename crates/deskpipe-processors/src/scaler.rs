//! `VideoScaler`: resizes BGRA32/RGBA32 video frames toward a target resolution.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use deskpipe_core::{
    Frame, FrameFormat, FrameSink, FrameSource, Lifecycle, Node, NodeError, NodeId, Outlet,
    ScalingAlgorithm, VideoInfo, VideoScalerConfig,
};
use tracing::{debug, info};

use crate::errors::ConvertError;
use crate::resample;
use crate::stats::ScalerStats;

/// Scaled frames between two statistics log lines.
const STATS_LOG_EVERY: u64 = 100;

const BYTES_PER_PIXEL: usize = 4;

pub struct VideoScaler {
    id:      NodeId,
    outlet:  Outlet,
    config:  Mutex<VideoScalerConfig>,
    stats:   Mutex<ScalerStats>,
    running: AtomicBool,
}

impl VideoScaler {
    pub fn new(config: VideoScalerConfig) -> Self {
        debug!(
            target_width = config.target_width,
            target_height = config.target_height,
            algorithm = ?config.algorithm,
            maintain_aspect_ratio = config.maintain_aspect_ratio,
            "video scaler created"
        );
        Self {
            id: NodeId::next(),
            outlet: Outlet::new(),
            config: Mutex::new(config),
            stats: Mutex::new(ScalerStats::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> VideoScalerConfig {
        self.config.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_target_resolution(&self, width: u32, height: u32) -> Result<(), ConvertError> {
        if width == 0 || height == 0 {
            return Err(ConvertError::InvalidResolution { width, height });
        }
        let mut config = self.config.lock().unwrap_or_else(PoisonError::into_inner);
        config.target_width = width;
        config.target_height = height;
        Ok(())
    }

    pub fn set_algorithm(&self, algorithm: ScalingAlgorithm) {
        self.config.lock().unwrap_or_else(PoisonError::into_inner).algorithm = algorithm;
    }

    pub fn set_maintain_aspect_ratio(&self, maintain: bool) {
        self.config.lock().unwrap_or_else(PoisonError::into_inner).maintain_aspect_ratio = maintain;
    }

    /// Dimensions a `width x height` input would be scaled to.
    pub fn target_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let config = self.config();
        resample::target_dimensions(
            width,
            height,
            config.target_width,
            config.target_height,
            config.maintain_aspect_ratio,
        )
    }

    pub fn stats(&self) -> ScalerStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resample `frame` to its target dimensions. Only 32-bit BGRA/RGBA
    /// input is accepted.
    pub fn scale_frame(&self, frame: &Frame) -> Result<Frame, ConvertError> {
        let info = *frame.video_info().ok_or(ConvertError::NotVideo)?;
        let format = frame.format();
        let bpp = match format {
            FrameFormat::Bgra32 | FrameFormat::Rgba32 => BYTES_PER_PIXEL,
            other => return Err(ConvertError::UnsupportedFormat(other)),
        };
        if info.width == 0 || info.height == 0 {
            return Err(ConvertError::ZeroDimensions);
        }

        let expected = info.width as usize * info.height as usize * bpp;
        if frame.size() < expected {
            return Err(ConvertError::ShortInput { expected, actual: frame.size() });
        }

        let config = self.config();
        let (width, height) = resample::target_dimensions(
            info.width,
            info.height,
            config.target_width,
            config.target_height,
            config.maintain_aspect_ratio,
        );
        if width == 0 || height == 0 {
            return Err(ConvertError::InvalidResolution { width, height });
        }

        let src = &frame.data()[..expected];
        let data = match config.algorithm {
            ScalingAlgorithm::Bilinear => resample::bilinear(src, info.width, info.height, width, height, bpp),
            ScalingAlgorithm::Nearest => resample::nearest(src, info.width, info.height, width, height, bpp),
        };

        let info = VideoInfo { width, height, ..info };
        Frame::video(format, info, data, frame.timestamp_us()).map_err(|_| ConvertError::UnsupportedFormat(format))
    }
}

impl Node for VideoScaler {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        "video-scaler"
    }
}

impl FrameSource for VideoScaler {
    fn outlet(&self) -> &Outlet {
        &self.outlet
    }
}

impl FrameSink for VideoScaler {
    fn on_frame(&self, frame: Arc<Frame>) {
        let dims = match frame.dimensions() {
            Some(dims) if frame.is_valid() => dims,
            _ => {
                debug!(format = %frame.format(), size = frame.size(), "scaler dropping invalid frame");
                self.stats.lock().unwrap_or_else(PoisonError::into_inner).frames_dropped += 1;
                return;
            }
        };

        if self.target_dimensions(dims.0, dims.1) == dims {
            self.stats.lock().unwrap_or_else(PoisonError::into_inner).frames_forwarded += 1;
            self.outlet.deliver(frame);
            return;
        }

        let started = Instant::now();
        let scaled = match self.scale_frame(&frame) {
            Ok(scaled) => scaled,
            Err(e) => {
                debug!(width = dims.0, height = dims.1, error = %e, "frame scaling failed");
                self.stats.lock().unwrap_or_else(PoisonError::into_inner).frames_dropped += 1;
                return;
            }
        };
        let out_dims = scaled.dimensions().unwrap_or_default();

        let snapshot = {
            let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
            stats.record_scaled(dims, out_dims, started.elapsed());
            *stats
        };
        if snapshot.frames_processed % STATS_LOG_EVERY == 0 {
            info!(
                processed = snapshot.frames_processed,
                dropped = snapshot.frames_dropped,
                avg_us = snapshot.avg_scale_time_us,
                input = %format!("{}x{}", snapshot.input_width, snapshot.input_height),
                output = %format!("{}x{}", snapshot.output_width, snapshot.output_height),
                "video scaler stats"
            );
        }

        self.outlet.deliver(Arc::new(scaled));
    }
}

impl Lifecycle for VideoScaler {
    fn initialize(&self) -> Result<(), NodeError> {
        let config = self.config();
        if config.target_width == 0 || config.target_height == 0 {
            return Err(NodeError::ConfigurationInvalid {
                reason: format!(
                    "target resolution {}x{} is invalid",
                    config.target_width, config.target_height
                ),
            });
        }
        info!(
            target_width = config.target_width,
            target_height = config.target_height,
            algorithm = ?config.algorithm,
            "video scaler initialized"
        );
        Ok(())
    }

    fn start(&self) -> Result<(), NodeError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
