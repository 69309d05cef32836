//! `ScreenCapturer`: adapts a [`CaptureEngine`] to the pipeline source role.
//!
//! Frames handed to the engine callback are pushed straight into the
//! capturer's [`Outlet`], on the capture thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use deskpipe_core::{
    CaptureError, CaptureResult, Frame, FrameSource, Lifecycle, Node, NodeError, NodeId, Outlet,
    ScreenCaptureConfig, ScreenInfo,
};
use tracing::{info, warn};

use crate::engine::{CaptureEngine, FrameCallback};
use crate::factory::{EngineFactory, Technology};

pub struct ScreenCapturer {
    id: NodeId,
    technology: Technology,
    engine: Box<dyn CaptureEngine>,
    outlet: Arc<Outlet>,
    config: Mutex<ScreenCaptureConfig>,
    initialized: AtomicBool,
}

impl ScreenCapturer {
    /// Build a capturer backed by the engine for `technology`. Fails when no
    /// engine can be produced for it.
    pub fn new(config: ScreenCaptureConfig, technology: Technology) -> CaptureResult<Self> {
        let engine = EngineFactory::create(technology).ok_or_else(|| CaptureError::NotSupported {
            feature: format!(
                "no screen capture engine for technology: {}",
                EngineFactory::technology_name(technology)
            ),
        })?;
        Ok(Self::with_engine(config, technology, engine))
    }

    pub fn with_engine(
        config: ScreenCaptureConfig,
        technology: Technology,
        engine: Box<dyn CaptureEngine>,
    ) -> Self {
        Self {
            id: NodeId::next(),
            technology,
            engine,
            outlet: Arc::new(Outlet::new()),
            config: Mutex::new(config),
            initialized: AtomicBool::new(false),
        }
    }

    pub fn available_screens(&self) -> Vec<ScreenInfo> {
        self.engine.available_screens()
    }

    pub fn config(&self) -> ScreenCaptureConfig {
        self.config.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Store `config` and apply it to the engine (restarting if running).
    pub fn update_config(&self, config: ScreenCaptureConfig) -> CaptureResult {
        *self.config.lock().unwrap_or_else(PoisonError::into_inner) = config.clone();
        self.engine.update_config(&config)
    }

    pub fn technology(&self) -> Technology {
        self.technology
    }

    pub fn technology_name(&self) -> String {
        EngineFactory::technology_name(self.technology)
    }

    pub fn frame_interval(&self) -> Duration {
        self.engine.frame_interval()
    }

    pub fn last_error(&self) -> Option<CaptureError> {
        self.engine.last_error()
    }
}

impl Node for ScreenCapturer {
    fn id(&self) -> NodeId {
        self.id
    }

    fn name(&self) -> &str {
        "screen-capture"
    }
}

impl FrameSource for ScreenCapturer {
    fn outlet(&self) -> &Outlet {
        &self.outlet
    }
}

impl Lifecycle for ScreenCapturer {
    fn initialize(&self) -> Result<(), NodeError> {
        let config = self.config();
        if let Err(e) = self.engine.initialize(&config) {
            self.initialized.store(false, Ordering::SeqCst);
            warn!(technology = %self.technology_name(), error = %e, "screen capturer initialize failed");
            return Err(e.into());
        }

        let outlet = Arc::clone(&self.outlet);
        let callback: FrameCallback = Arc::new(move |frame: Arc<Frame>| outlet.deliver(frame));
        self.engine.set_frame_callback(Some(callback));
        self.initialized.store(true, Ordering::SeqCst);
        info!(technology = %self.technology_name(), backend = self.engine.backend_name(), "screen capturer initialized");
        Ok(())
    }

    fn start(&self) -> Result<(), NodeError> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(NodeError::NotInitialized);
        }
        self.engine.start()?;
        Ok(())
    }

    fn stop(&self) {
        if let Err(e) = self.engine.stop() {
            warn!(error = %e, "screen capturer stop failed");
        }
    }

    fn is_running(&self) -> bool {
        self.engine.is_running()
    }
}

impl Drop for ScreenCapturer {
    fn drop(&mut self) {
        Lifecycle::stop(&*self);
    }
}
