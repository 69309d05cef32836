pub mod config;
pub mod errors;
pub mod frame;
pub mod graph;
pub mod pipeline;
pub mod types;

pub use config::{PixelFormatConverterConfig, ScalingAlgorithm, ScreenCaptureConfig, VideoScalerConfig};
pub use errors::{CaptureError, CaptureResult, FrameError, NodeError, PipelineError};
pub use frame::{monotonic_timestamp_us, AudioInfo, Frame, FrameFamily, FrameFormat, FrameInfo, VideoInfo};
pub use graph::{FrameSink, FrameSource, Lifecycle, Node, NodeId, Outlet};
pub use pipeline::Pipeline;
pub use types::*;
