//! deskpipe-processors — software processing stages for the capture graph.
//!
//! # Pipeline
//! ```text
//! ScreenCapturer ─► VideoScaler ─► PixelFormatConverter ─► sink
//!      BGRA32        BGRA32 (resized)    I420 / RGB24 / …
//! ```
//!
//! The kernels in [`convert`] and [`resample`] are pure functions over byte
//! slices; [`PixelFormatConverter`] and [`VideoScaler`] wrap them as graph
//! nodes and keep per-node statistics.

pub mod convert;
pub mod converter;
pub mod errors;
pub mod resample;
pub mod scaler;
pub mod stats;

pub use converter::PixelFormatConverter;
pub use errors::ConvertError;
pub use scaler::VideoScaler;
pub use stats::{ConverterStats, ScalerStats};
