//! `Y4mRecorder`: terminal sink writing I420 frames as a YUV4MPEG2 stream.
//!
//! The stream header is written on the first accepted frame and fixes the
//! dimensions; later frames with other dimensions are skipped. Y4M readers
//! expect rounded-up chroma planes, so frames with an odd side are skipped.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use deskpipe_core::{Frame, FrameFormat, FrameSink, Lifecycle, Node, NodeError, NodeId};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecorderStats {
    pub frames_written: u64,
    pub bytes_written:  u64,
    pub frames_skipped: u64,
    pub write_errors:   u64,
}

struct Stream<W> {
    writer: W,
    /// `(width, height)` announced in the header, once written.
    header: Option<(u32, u32)>,
    stats:  RecorderStats,
}

pub struct Y4mRecorder<W: Write + Send> {
    id:           NodeId,
    fallback_fps: u32,
    stream:       Mutex<Stream<W>>,
    running:      AtomicBool,
}

impl<W: Write + Send> Y4mRecorder<W> {
    /// `fallback_fps` is used in the header when the first frame carries no
    /// frame rate.
    pub fn new(writer: W, fallback_fps: u32) -> Self {
        Self {
            id: NodeId::next(),
            fallback_fps: fallback_fps.max(1),
            stream: Mutex::new(Stream { writer, header: None, stats: RecorderStats::default() }),
            running: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> RecorderStats {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner).stats
    }

    pub fn flush(&self) -> io::Result<()> {
        self.stream.lock().unwrap_or_else(PoisonError::into_inner).writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.stream.into_inner().unwrap_or_else(PoisonError::into_inner).writer
    }

    fn write_frame(&self, stream: &mut Stream<W>, frame: &Frame, width: u32, height: u32) -> io::Result<()> {
        if stream.header.is_none() {
            let fps = frame.video_info().map(|v| v.framerate).filter(|&f| f > 0).unwrap_or(self.fallback_fps);
            writeln!(stream.writer, "YUV4MPEG2 W{width} H{height} F{fps}:1 Ip A1:1 C420jpeg")?;
            stream.header = Some((width, height));
            info!(width, height, fps, "y4m stream header written");
        }
        stream.writer.write_all(b"FRAME\n")?;
        stream.writer.write_all(frame.data())?;
        Ok(())
    }
}

/// Payload size of one I420 frame.
fn i420_size(width: u32, height: u32) -> usize {
    let luma = width as usize * height as usize;
    luma + luma / 2
}

impl<W: Write + Send> Node for Y4mRecorder<W> {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        "y4m-recorder"
    }
}

impl<W: Write + Send> FrameSink for Y4mRecorder<W> {
    fn on_frame(&self, frame: Arc<Frame>) {
        let mut stream = self.stream.lock().unwrap_or_else(PoisonError::into_inner);

        let Some((width, height)) = frame.dimensions().filter(|_| frame.format() == FrameFormat::I420) else {
            warn!(format = %frame.format(), "recorder skipping non-I420 frame");
            stream.stats.frames_skipped += 1;
            return;
        };
        if width % 2 != 0 || height % 2 != 0 {
            warn!(width, height, "recorder skipping I420 frame with odd dimensions");
            stream.stats.frames_skipped += 1;
            return;
        }
        if frame.size() != i420_size(width, height) {
            warn!(width, height, size = frame.size(), "recorder skipping truncated I420 frame");
            stream.stats.frames_skipped += 1;
            return;
        }
        if let Some(expected) = stream.header.filter(|&dims| dims != (width, height)) {
            debug!(?expected, got = ?(width, height), "recorder skipping frame with changed dimensions");
            stream.stats.frames_skipped += 1;
            return;
        }

        match self.write_frame(&mut stream, &frame, width, height) {
            Ok(()) => {
                stream.stats.frames_written += 1;
                stream.stats.bytes_written += frame.size() as u64;
            }
            Err(e) => {
                stream.stats.write_errors += 1;
                error!(error = %e, "y4m write failed");
            }
        }
    }
}

impl<W: Write + Send> Lifecycle for Y4mRecorder<W> {
    fn start(&self) -> Result<(), NodeError> {
        self.running.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.flush() {
            error!(error = %e, "y4m flush failed");
        }
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpipe_core::VideoInfo;

    fn i420(width: u32, height: u32, fill: u8, fps: u32) -> Arc<Frame> {
        let data = vec![fill; i420_size(width, height)];
        Arc::new(Frame::video(FrameFormat::I420, VideoInfo::new(width, height, fps), data, 0).expect("i420 frame"))
    }

    #[test]
    fn writes_header_once_then_frames() {
        let recorder = Y4mRecorder::new(Vec::new(), 30);
        recorder.on_frame(i420(4, 2, 1, 25));
        recorder.on_frame(i420(4, 2, 2, 25));

        let stats = recorder.stats();
        assert_eq!(stats.frames_written, 2);
        assert_eq!(stats.bytes_written, 24);

        let out = recorder.into_inner();
        let header = b"YUV4MPEG2 W4 H2 F25:1 Ip A1:1 C420jpeg\n";
        assert!(out.starts_with(header));
        let body = &out[header.len()..];
        assert_eq!(&body[..6], b"FRAME\n");
        assert_eq!(&body[6..18], &[1u8; 12]);
        assert_eq!(&body[18..24], b"FRAME\n");
        assert_eq!(body.len(), 2 * (6 + 12));
    }

    #[test]
    fn missing_frame_rate_uses_fallback() {
        let recorder = Y4mRecorder::new(Vec::new(), 15);
        recorder.on_frame(i420(2, 2, 0, 0));
        let out = recorder.into_inner();
        assert!(out.starts_with(b"YUV4MPEG2 W2 H2 F15:1"));
    }

    #[test]
    fn non_i420_frames_are_skipped() {
        let recorder = Y4mRecorder::new(Vec::new(), 30);
        let bgra = Frame::video(FrameFormat::Bgra32, VideoInfo::new(2, 2, 30), vec![0u8; 16], 0).expect("bgra");
        recorder.on_frame(Arc::new(bgra));

        assert_eq!(recorder.stats().frames_skipped, 1);
        assert!(recorder.into_inner().is_empty());
    }

    #[test]
    fn odd_dimensions_are_skipped() {
        let recorder = Y4mRecorder::new(Vec::new(), 30);
        let frame = i420(3, 3, 0, 30);
        assert_eq!(frame.size(), 13);
        recorder.on_frame(frame);
        recorder.on_frame(i420(4, 3, 0, 30));

        let stats = recorder.stats();
        assert_eq!((stats.frames_written, stats.frames_skipped), (0, 2));
        assert!(recorder.into_inner().is_empty());
    }

    #[test]
    fn dimension_change_is_skipped() {
        let recorder = Y4mRecorder::new(Vec::new(), 30);
        recorder.on_frame(i420(4, 4, 0, 30));
        recorder.on_frame(i420(2, 2, 0, 30));

        let stats = recorder.stats();
        assert_eq!((stats.frames_written, stats.frames_skipped), (1, 1));
    }
}
