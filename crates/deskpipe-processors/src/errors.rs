use deskpipe_core::FrameFormat;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("Unsupported conversion: {from} -> {to}")]
    UnsupportedConversion { from: FrameFormat, to: FrameFormat },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(FrameFormat),

    #[error("Input too short: expected {expected} bytes, got {actual}")]
    ShortInput { expected: usize, actual: usize },

    #[error("Zero frame dimensions")]
    ZeroDimensions,

    #[error("Invalid target resolution {width}x{height}")]
    InvalidResolution { width: u32, height: u32 },

    #[error("Not a video frame")]
    NotVideo,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_both_formats() {
        let err = ConvertError::UnsupportedConversion { from: FrameFormat::Nv12, to: FrameFormat::I420 };
        assert_eq!(err.to_string(), "Unsupported conversion: NV12 -> I420");
    }
}
