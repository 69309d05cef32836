//! The unit of media data exchanged across the pipeline graph.
//!
//! A [`Frame`] is an immutable byte payload plus format, timing and a
//! family-specific descriptor. Frames are created once (by a capture engine
//! or a processor) and then shared as `Arc<Frame>`; no stage mutates a frame
//! in place.

use std::sync::OnceLock;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::FrameError;

// ── FrameFormat ───────────────────────────────────────────────────────────────

/// Media format tag. Codes are partitioned by family in blocks of 100, so the
/// family of any format is `code / 100 * 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(u16)]
pub enum FrameFormat {
    Unknown = 0,

    VideoBase = 100,
    I420 = 101,
    Nv12 = 102,
    Rgb24 = 103,
    Bgr24 = 104,
    Rgba32 = 105,
    Bgra32 = 106,
    H264 = 107,
    H265 = 108,
    Vp8 = 109,
    Vp9 = 110,

    AudioBase = 200,
    PcmS16le = 201,
    PcmF32le = 202,
    Aac = 203,
    Mp3 = 204,
    Opus = 205,
    G711Pcmu = 206,
    G711Pcma = 207,
}

/// Format family derived from the numeric range of a [`FrameFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameFamily {
    Unknown,
    Video,
    Audio,
}

impl FrameFormat {
    const ALL: [FrameFormat; 20] = [
        Self::Unknown,
        Self::VideoBase,
        Self::I420,
        Self::Nv12,
        Self::Rgb24,
        Self::Bgr24,
        Self::Rgba32,
        Self::Bgra32,
        Self::H264,
        Self::H265,
        Self::Vp8,
        Self::Vp9,
        Self::AudioBase,
        Self::PcmS16le,
        Self::PcmF32le,
        Self::Aac,
        Self::Mp3,
        Self::Opus,
        Self::G711Pcmu,
        Self::G711Pcma,
    ];

    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn family(self) -> FrameFamily {
        match self.code() / 100 * 100 {
            100 => FrameFamily::Video,
            200 => FrameFamily::Audio,
            _ => FrameFamily::Unknown,
        }
    }

    pub fn is_video(self) -> bool {
        self.family() == FrameFamily::Video
    }

    pub fn is_audio(self) -> bool {
        self.family() == FrameFamily::Audio
    }

    /// Bytes per pixel of the packed RGB families; `None` for planar,
    /// compressed and non-video formats.
    pub fn packed_bytes_per_pixel(self) -> Option<usize> {
        match self {
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Rgba32 | Self::Bgra32 => Some(4),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "UNKNOWN",
            Self::VideoBase => "VIDEO",
            Self::I420 => "I420",
            Self::Nv12 => "NV12",
            Self::Rgb24 => "RGB24",
            Self::Bgr24 => "BGR24",
            Self::Rgba32 => "RGBA32",
            Self::Bgra32 => "BGRA32",
            Self::H264 => "H264",
            Self::H265 => "H265",
            Self::Vp8 => "VP8",
            Self::Vp9 => "VP9",
            Self::AudioBase => "AUDIO",
            Self::PcmS16le => "PCM_S16LE",
            Self::PcmF32le => "PCM_F32LE",
            Self::Aac => "AAC",
            Self::Mp3 => "MP3",
            Self::Opus => "OPUS",
            Self::G711Pcmu => "G711_PCMU",
            Self::G711Pcma => "G711_PCMA",
        }
    }

    /// Parse a pixel-format hint such as `"BGRA"`, `"rgba32"` or `"yuv420p"`.
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint.trim().to_ascii_uppercase().as_str() {
            "BGRA" | "BGRA32" | "BGRX" => Some(Self::Bgra32),
            "RGBA" | "RGBA32" | "RGBX" => Some(Self::Rgba32),
            "RGB" | "RGB24" => Some(Self::Rgb24),
            "BGR" | "BGR24" => Some(Self::Bgr24),
            "I420" | "YUV420" | "YUV420P" => Some(Self::I420),
            "NV12" => Some(Self::Nv12),
            _ => None,
        }
    }
}

impl TryFrom<u16> for FrameFormat {
    type Error = FrameError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::ALL
            .iter()
            .copied()
            .find(|f| f.code() == code)
            .ok_or(FrameError::UnknownFormat(code))
    }
}

impl std::fmt::Display for FrameFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ── Payload descriptors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    pub is_keyframe: bool,
}

impl VideoInfo {
    pub fn new(width: u32, height: u32, framerate: u32) -> Self {
        Self { width, height, framerate, is_keyframe: false }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AudioInfo {
    pub channels: u8,
    pub sample_rate: u32,
    pub nb_samples: u32,
    pub bytes_per_sample: u32,
}

/// Family-specific frame descriptor, keyed by the frame's format family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameInfo {
    Video(VideoInfo),
    Audio(AudioInfo),
}

// ── Frame ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Frame {
    data: Bytes,
    format: FrameFormat,
    /// Capture time in microseconds on the process monotonic clock.
    timestamp_us: u64,
    info: FrameInfo,
}

impl Frame {
    /// Build a video frame. Fails if `format` is not a video-family format.
    pub fn video(
        format: FrameFormat,
        info: VideoInfo,
        data: impl Into<Bytes>,
        timestamp_us: u64,
    ) -> Result<Self, FrameError> {
        if !format.is_video() {
            return Err(FrameError::FamilyMismatch { format, payload: "video" });
        }
        Ok(Self { data: data.into(), format, timestamp_us, info: FrameInfo::Video(info) })
    }

    /// Build an audio frame. Fails if `format` is not an audio-family format.
    pub fn audio(
        format: FrameFormat,
        info: AudioInfo,
        data: impl Into<Bytes>,
        timestamp_us: u64,
    ) -> Result<Self, FrameError> {
        if !format.is_audio() {
            return Err(FrameError::FamilyMismatch { format, payload: "audio" });
        }
        Ok(Self { data: data.into(), format, timestamp_us, info: FrameInfo::Audio(info) })
    }

    /// A frame is valid iff it carries a non-empty payload.
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn is_video(&self) -> bool {
        matches!(self.info, FrameInfo::Video(_))
    }

    pub fn is_audio(&self) -> bool {
        matches!(self.info, FrameInfo::Audio(_))
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Cheap reference-counted handle to the payload.
    pub fn bytes(&self) -> Bytes {
        self.data.clone()
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn format(&self) -> FrameFormat {
        self.format
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn info(&self) -> &FrameInfo {
        &self.info
    }

    pub fn video_info(&self) -> Option<&VideoInfo> {
        match &self.info {
            FrameInfo::Video(v) => Some(v),
            FrameInfo::Audio(_) => None,
        }
    }

    pub fn audio_info(&self) -> Option<&AudioInfo> {
        match &self.info {
            FrameInfo::Audio(a) => Some(a),
            FrameInfo::Video(_) => None,
        }
    }

    /// `(width, height)` of a video frame.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.video_info().map(|v| (v.width, v.height))
    }
}

/// Microseconds elapsed on the monotonic clock since the first call in this
/// process. All capture backends stamp frames with this clock.
pub fn monotonic_timestamp_us() -> u64 {
    static EPOCH: OnceLock<Instant> = OnceLock::new();
    EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64
}
