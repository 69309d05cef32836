//! `PixelFormatConverter`: converts packed RGB video frames to a configured
//! output format.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use deskpipe_core::{
    Frame, FrameFormat, FrameSink, FrameSource, Lifecycle, Node, NodeError, NodeId, Outlet,
    PixelFormatConverterConfig,
};
use tracing::{debug, info};

use crate::convert;
use crate::errors::ConvertError;
use crate::stats::ConverterStats;

pub struct PixelFormatConverter {
    id:      NodeId,
    outlet:  Outlet,
    config:  Mutex<PixelFormatConverterConfig>,
    stats:   Mutex<ConverterStats>,
    running: AtomicBool,
}

impl PixelFormatConverter {
    pub fn new(config: PixelFormatConverterConfig) -> Self {
        Self {
            id: NodeId::next(),
            outlet: Outlet::new(),
            config: Mutex::new(config),
            stats: Mutex::new(ConverterStats::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn output_format(&self) -> FrameFormat {
        self.config.lock().unwrap_or_else(PoisonError::into_inner).output_format
    }

    /// Switch the output format; frames already in flight finish with the
    /// previous one.
    pub fn set_output_format(&self, format: FrameFormat) -> Result<(), ConvertError> {
        if !convert::is_supported_output(format) {
            return Err(ConvertError::UnsupportedFormat(format));
        }
        self.config.lock().unwrap_or_else(PoisonError::into_inner).output_format = format;
        debug!(format = %format, "converter output format changed");
        Ok(())
    }

    pub fn stats(&self) -> ConverterStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the converted counterpart of `frame`. Dimensions, frame rate,
    /// keyframe flag and timestamp carry over unchanged.
    pub fn convert_frame(&self, frame: &Frame, to: FrameFormat) -> Result<Frame, ConvertError> {
        let info = *frame.video_info().ok_or(ConvertError::NotVideo)?;
        let data = convert::convert(frame.data(), frame.format(), to, info.width, info.height)?;
        Frame::video(to, info, data, frame.timestamp_us()).map_err(|_| ConvertError::UnsupportedFormat(to))
    }

    fn count(&self, update: impl FnOnce(&mut ConverterStats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

impl Node for PixelFormatConverter {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        "pixel-format-converter"
    }
}

impl FrameSource for PixelFormatConverter {
    fn outlet(&self) -> &Outlet {
        &self.outlet
    }
}

impl FrameSink for PixelFormatConverter {
    fn on_frame(&self, frame: Arc<Frame>) {
        if !frame.is_valid() || !frame.is_video() {
            self.count(|s| s.frames_dropped += 1);
            return;
        }

        let target = self.output_format();
        if frame.format() == target {
            self.count(|s| s.frames_forwarded += 1);
            self.outlet.deliver(frame);
            return;
        }

        match self.convert_frame(&frame, target) {
            Ok(converted) => {
                self.count(|s| s.frames_converted += 1);
                self.outlet.deliver(Arc::new(converted));
            }
            Err(e) => {
                self.count(|s| s.frames_dropped += 1);
                debug!(from = %frame.format(), to = %target, error = %e, "frame conversion failed");
            }
        }
    }
}

impl Lifecycle for PixelFormatConverter {
    fn initialize(&self) -> Result<(), NodeError> {
        let config = self.config.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if !convert::is_supported_output(config.output_format) {
            return Err(NodeError::ConfigurationInvalid {
                reason: format!("unsupported converter output format {}", config.output_format),
            });
        }
        if config.use_hardware_acceleration {
            debug!("hardware conversion requested; using the software path");
        }
        info!(output = %config.output_format, "pixel format converter initialized");
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
