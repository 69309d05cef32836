//! Scaler and converter wired through a `Pipeline`, fed by a hand-driven source.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use deskpipe_core::{
    Frame, FrameFormat, FrameSink, FrameSource, Lifecycle, Node, NodeError, NodeId, Outlet, Pipeline,
    PixelFormatConverterConfig, VideoInfo, VideoScalerConfig,
};
use deskpipe_processors::{ConverterStats, PixelFormatConverter, VideoScaler};

struct ManualSource {
    id: NodeId,
    outlet: Outlet,
    running: AtomicBool,
}

impl ManualSource {
    fn new() -> Arc<Self> {
        Arc::new(Self { id: NodeId::next(), outlet: Outlet::new(), running: AtomicBool::new(false) })
    }

    fn push(&self, frame: Frame) {
        if self.running.load(Ordering::SeqCst) {
            self.outlet.deliver(Arc::new(frame));
        }
    }
}

impl Node for ManualSource {
    fn id(&self) -> NodeId {
        self.id
    }
    fn name(&self) -> &str {
        "manual-source"
    }
}

impl FrameSource for ManualSource {
    fn outlet(&self) -> &Outlet {
        &self.outlet
    }
}

impl Lifecycle for ManualSource {
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

struct Collector {
    id: NodeId,
    frames: Mutex<Vec<Arc<Frame>>>,
    running: AtomicBool,
}

impl Collector {
    fn new() -> Arc<Self> {
        Arc::new(Self { id: NodeId::next(), frames: Mutex::new(Vec::new()), running: AtomicBool::new(false) })
    }
}

impl Node for Collector {
    fn id(&self) -> NodeId {
        self.id
    }
    fn name(&self) -> &str {
        "collector"
    }
}

impl FrameSink for Collector {
    fn on_frame(&self, frame: Arc<Frame>) {
        self.frames.lock().expect("collector lock").push(frame);
    }
}

impl Lifecycle for Collector {
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

fn gradient_bgra(width: u32, height: u32, ts: u64) -> Frame {
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x % 256) as u8, (y % 256) as u8, 0x80, 0xFF]);
        }
    }
    Frame::video(FrameFormat::Bgra32, VideoInfo::new(width, height, 30), data, ts).expect("bgra frame")
}

struct Chain {
    pipeline: Pipeline,
    source: Arc<ManualSource>,
    scaler: Arc<VideoScaler>,
    converter: Arc<PixelFormatConverter>,
    sink: Arc<Collector>,
}

fn chain(target: (u32, u32)) -> Chain {
    let source = ManualSource::new();
    let scaler = Arc::new(VideoScaler::new(VideoScalerConfig {
        target_width: target.0,
        target_height: target.1,
        ..Default::default()
    }));
    let converter = Arc::new(PixelFormatConverter::new(PixelFormatConverterConfig::default()));
    let sink = Collector::new();

    let mut pipeline = Pipeline::new();
    pipeline.set_source(Arc::clone(&source));
    pipeline.add_processor(Arc::clone(&scaler));
    pipeline.add_processor(Arc::clone(&converter));
    pipeline.set_sink(Arc::clone(&sink));
    pipeline.link_all().expect("link");
    pipeline.initialize().expect("initialize");

    Chain { pipeline, source, scaler, converter, sink }
}

#[test]
fn capture_sized_frames_come_out_scaled_i420() {
    let c = chain((320, 180));
    c.pipeline.start().expect("start");

    for ts in [100, 200, 300] {
        c.source.push(gradient_bgra(640, 360, ts));
    }

    let frames = c.sink.frames.lock().expect("collector lock").clone();
    assert_eq!(frames.len(), 3);
    for (frame, ts) in frames.iter().zip([100, 200, 300]) {
        assert_eq!(frame.format(), FrameFormat::I420);
        assert_eq!(frame.dimensions(), Some((320, 180)));
        assert_eq!(frame.size(), 320 * 180 * 3 / 2);
        assert_eq!(frame.timestamp_us(), ts);
    }
    assert_eq!(c.scaler.stats().frames_processed, 3);
    assert_eq!(c.converter.stats().frames_converted, 3);
}

#[test]
fn pipeline_summary_lists_nodes_in_order() {
    let c = chain((320, 180));
    assert_eq!(
        c.pipeline.pipeline_info(),
        "Pipeline: manual-source -> video-scaler -> pixel-format-converter -> collector"
    );
    assert_eq!(c.pipeline.component_count(), 4);
}

#[test]
fn stopped_pipeline_delivers_nothing() {
    let c = chain((320, 180));
    c.pipeline.start().expect("start");
    c.pipeline.stop();
    assert!(!c.pipeline.is_running());
    assert!(!c.scaler.is_running());

    c.source.push(gradient_bgra(640, 360, 1));
    assert!(c.sink.frames.lock().expect("collector lock").is_empty());
}

#[test]
fn unsupported_input_is_dropped_mid_chain() {
    let c = chain((320, 180));
    c.pipeline.start().expect("start");

    let nv12 = Frame::video(FrameFormat::Nv12, VideoInfo::new(640, 360, 30), vec![0u8; 640 * 360 * 3 / 2], 5)
        .expect("nv12 frame");
    c.source.push(nv12);

    assert!(c.sink.frames.lock().expect("collector lock").is_empty());
    assert_eq!(c.scaler.stats().frames_dropped, 1);
    assert_eq!(c.converter.stats(), ConverterStats::default());
}
