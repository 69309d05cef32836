//! `Pipeline`: assembles `source → processors… → sink` and drives lifecycle.
//!
//! Ordering rules:
//! - `initialize`: source, processors, sink.
//! - `start`: processors, sink, then source, so that nothing is produced
//!   before every downstream stage is ready.
//! - `stop`: source first, then processors, then sink.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::errors::PipelineError;
use crate::graph::{FrameSink, FrameSource, Lifecycle, Node};

struct SourceSlot {
    source: Arc<dyn FrameSource>,
    control: Arc<dyn Lifecycle>,
}

struct ProcessorSlot {
    source: Arc<dyn FrameSource>,
    sink: Arc<dyn FrameSink>,
    control: Arc<dyn Lifecycle>,
}

struct SinkSlot {
    sink: Arc<dyn FrameSink>,
    control: Arc<dyn Lifecycle>,
}

#[derive(Default)]
pub struct Pipeline {
    source: Option<SourceSlot>,
    processors: Vec<ProcessorSlot>,
    sink: Option<SinkSlot>,
    linked: bool,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_source<S>(&mut self, source: Arc<S>)
    where
        S: FrameSource + Lifecycle + 'static,
    {
        self.linked = false;
        self.source = Some(SourceSlot { source: source.clone(), control: source });
    }

    /// Append a processor; chain order is insertion order.
    pub fn add_processor<P>(&mut self, processor: Arc<P>)
    where
        P: FrameSource + FrameSink + Lifecycle + 'static,
    {
        self.linked = false;
        self.processors.push(ProcessorSlot {
            source: processor.clone(),
            sink: processor.clone(),
            control: processor,
        });
    }

    pub fn set_sink<S>(&mut self, sink: Arc<S>)
    where
        S: FrameSink + Lifecycle + 'static,
    {
        self.linked = false;
        self.sink = Some(SinkSlot { sink: sink.clone(), control: sink });
    }

    /// Wire every stage's outlet to the next stage.
    pub fn link_all(&mut self) -> Result<(), PipelineError> {
        let source = self.source.as_ref().ok_or(PipelineError::MissingSource)?;
        let sink = self.sink.as_ref().ok_or(PipelineError::MissingSink)?;

        let mut upstream: &Arc<dyn FrameSource> = &source.source;
        for processor in &self.processors {
            upstream.add_sink(processor.sink.clone());
            upstream = &processor.source;
        }
        upstream.add_sink(sink.sink.clone());

        self.linked = true;
        info!("{}", self.pipeline_info());
        Ok(())
    }

    /// Remove every downstream link this pipeline created.
    pub fn unlink_all(&mut self) {
        if let Some(source) = &self.source {
            source.source.clear_sinks();
        }
        for processor in &self.processors {
            processor.source.clear_sinks();
        }
        self.linked = false;
    }

    pub fn is_connected(&self) -> bool {
        self.linked
    }

    pub fn initialize(&self) -> Result<(), PipelineError> {
        for (name, control) in self.controls_upstream_first() {
            control.initialize().map_err(|source| {
                warn!(component = %name, error = %source, "initialize failed");
                PipelineError::InitializeFailed { component: name.to_string(), source }
            })?;
        }
        Ok(())
    }

    /// Start processors, then the sink, then the source. On failure the
    /// components already started are stopped again. Without a source
    /// nothing is started.
    pub fn start(&self) -> Result<(), PipelineError> {
        let source = self.source.as_ref().ok_or(PipelineError::MissingSource)?;
        let mut order: Vec<(&str, &Arc<dyn Lifecycle>)> = self
            .processors
            .iter()
            .map(|p| (p.source.name(), &p.control))
            .collect();
        if let Some(sink) = &self.sink {
            order.push((sink.sink.name(), &sink.control));
        }
        order.push((source.source.name(), &source.control));

        for (i, (name, control)) in order.iter().enumerate() {
            if let Err(source) = control.start() {
                warn!(component = %name, error = %source, "start failed, rolling back");
                for (_, started) in order[..i].iter().rev() {
                    started.stop();
                }
                return Err(PipelineError::StartFailed { component: name.to_string(), source });
            }
            debug!(component = %name, "started");
        }
        info!(components = self.component_count(), "pipeline started");
        Ok(())
    }

    /// Stop the source first, then processors, then the sink.
    pub fn stop(&self) {
        for (name, control) in self.controls_upstream_first() {
            control.stop();
            debug!(component = %name, "stopped");
        }
        info!("pipeline stopped");
    }

    pub fn is_running(&self) -> bool {
        self.source.as_ref().map(|s| s.control.is_running()).unwrap_or(false)
    }

    /// Unlink and forget every component.
    pub fn clear(&mut self) {
        self.unlink_all();
        self.source = None;
        self.processors.clear();
        self.sink = None;
    }

    pub fn component_count(&self) -> usize {
        self.source.is_some() as usize + self.processors.len() + self.sink.is_some() as usize
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    /// `Pipeline: <source> -> <p1> -> … -> <sink>`.
    pub fn pipeline_info(&self) -> String {
        let mut names: Vec<&str> = Vec::with_capacity(self.component_count());
        if let Some(source) = &self.source {
            names.push(source.source.name());
        }
        names.extend(self.processors.iter().map(|p| p.source.name()));
        if let Some(sink) = &self.sink {
            names.push(sink.sink.name());
        }
        format!("Pipeline: {}", names.join(" -> "))
    }

    fn controls_upstream_first(&self) -> Vec<(&str, &Arc<dyn Lifecycle>)> {
        let mut order = Vec::with_capacity(self.component_count());
        if let Some(source) = &self.source {
            order.push((source.source.name(), &source.control));
        }
        order.extend(self.processors.iter().map(|p| (p.source.name(), &p.control)));
        if let Some(sink) = &self.sink {
            order.push((sink.sink.name(), &sink.control));
        }
        order
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("info", &self.pipeline_info())
            .field("linked", &self.linked)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::NodeError;
    use crate::frame::{Frame, FrameFormat, VideoInfo};
    use crate::graph::{NodeId, Outlet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    type Journal = Arc<Mutex<Vec<String>>>;

    struct Stage {
        id: NodeId,
        name: &'static str,
        outlet: Outlet,
        running: AtomicBool,
        fail_start: bool,
        journal: Journal,
        received: Mutex<usize>,
    }

    impl Stage {
        fn new(name: &'static str, journal: &Journal) -> Arc<Self> {
            Self::with_failure(name, journal, false)
        }

        fn with_failure(name: &'static str, journal: &Journal, fail_start: bool) -> Arc<Self> {
            Arc::new(Self {
                id: NodeId::next(),
                name,
                outlet: Outlet::new(),
                running: AtomicBool::new(false),
                fail_start,
                journal: journal.clone(),
                received: Mutex::new(0),
            })
        }

        fn emit(&self) {
            let frame = Frame::video(FrameFormat::Bgra32, VideoInfo::new(1, 1, 30), vec![1u8; 4], 0)
                .expect("video frame");
            self.outlet.deliver(Arc::new(frame));
        }

        fn received(&self) -> usize {
            *self.received.lock().expect("received lock")
        }
    }

    impl Node for Stage {
        fn id(&self) -> NodeId {
            self.id
        }
        fn name(&self) -> &str {
            self.name
        }
    }

    impl FrameSource for Stage {
        fn outlet(&self) -> &Outlet {
            &self.outlet
        }
    }

    impl FrameSink for Stage {
        fn on_frame(&self, frame: Arc<Frame>) {
            *self.received.lock().expect("received lock") += 1;
            self.outlet.deliver(frame);
        }
    }

    impl Lifecycle for Stage {
        fn start(&self) -> Result<(), NodeError> {
            if self.fail_start {
                return Err(NodeError::NotInitialized);
            }
            self.journal.lock().expect("journal").push(format!("start {}", self.name));
            self.running.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn stop(&self) {
            self.journal.lock().expect("journal").push(format!("stop {}", self.name));
            self.running.store(false, Ordering::SeqCst);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::SeqCst)
        }
    }

    fn assembled(journal: &Journal) -> (Pipeline, Arc<Stage>, Arc<Stage>) {
        let source = Stage::new("capture", journal);
        let sink = Stage::new("writer", journal);
        let mut pipeline = Pipeline::new();
        pipeline.set_source(source.clone());
        pipeline.add_processor(Stage::new("scaler", journal));
        pipeline.add_processor(Stage::new("converter", journal));
        pipeline.set_sink(sink.clone());
        (pipeline, source, sink)
    }

    #[test]
    fn link_all_requires_both_ends() {
        let journal = Journal::default();
        let mut pipeline = Pipeline::new();
        assert_eq!(pipeline.link_all(), Err(PipelineError::MissingSource));
        pipeline.set_source(Stage::new("capture", &journal));
        assert_eq!(pipeline.link_all(), Err(PipelineError::MissingSink));
    }

    #[test]
    fn linked_chain_delivers_source_to_sink() {
        let journal = Journal::default();
        let (mut pipeline, source, sink) = assembled(&journal);
        pipeline.link_all().expect("link");
        assert!(pipeline.is_connected());

        source.emit();
        assert_eq!(sink.received(), 1);
        assert_eq!(pipeline.component_count(), 4);
        assert_eq!(pipeline.pipeline_info(), "Pipeline: capture -> scaler -> converter -> writer");
    }

    #[test]
    fn start_and_stop_follow_ordering_rules() {
        let journal = Journal::default();
        let (mut pipeline, _source, _sink) = assembled(&journal);
        pipeline.link_all().expect("link");
        pipeline.start().expect("start");
        assert!(pipeline.is_running());
        pipeline.stop();

        let log = journal.lock().expect("journal").clone();
        assert_eq!(
            log,
            vec![
                "start scaler", "start converter", "start writer", "start capture",
                "stop capture", "stop scaler", "stop converter", "stop writer",
            ]
        );
    }

    #[test]
    fn failed_start_rolls_back_started_components() {
        let journal = Journal::default();
        let mut pipeline = Pipeline::new();
        pipeline.set_source(Stage::new("capture", &journal));
        pipeline.add_processor(Stage::new("scaler", &journal));
        pipeline.set_sink(Stage::with_failure("writer", &journal, true));

        let err = pipeline.start().expect_err("sink refuses to start");
        assert!(matches!(err, PipelineError::StartFailed { ref component, .. } if component == "writer"));
        assert_eq!(*journal.lock().expect("journal"), vec!["start scaler", "stop scaler"]);
    }

    #[test]
    fn start_without_source_starts_nothing() {
        let journal = Journal::default();
        let mut pipeline = Pipeline::new();
        pipeline.add_processor(Stage::new("scaler", &journal));
        pipeline.set_sink(Stage::new("writer", &journal));

        assert_eq!(pipeline.start(), Err(PipelineError::MissingSource));
        assert!(journal.lock().expect("journal").is_empty());
        assert!(!pipeline.is_running());
    }

    #[test]
    fn unlink_and_clear() {
        let journal = Journal::default();
        let (mut pipeline, source, sink) = assembled(&journal);
        pipeline.link_all().expect("link");
        pipeline.unlink_all();
        source.emit();
        assert_eq!(sink.received(), 0);
        assert!(!source.has_sinks());

        pipeline.clear();
        assert_eq!(pipeline.component_count(), 0);
        assert_eq!(pipeline.pipeline_info(), "Pipeline: ");
    }
}
