//! Capture engine contract and the shared threaded engine.
//!
//! # State machine
//!
//! ```text
//! Uninitialized ──initialize──► Initialized ──start──► Running
//!                                    ▲                    │
//!                                    └───────stop─────────┘
//! ```
//!
//! Platform backends implement [`NativeCapture`] (open a session, grab one
//! surface, enumerate screens). [`ThreadedEngine`] owns everything else: the
//! lock-protected lifecycle, the cancellable tick loop, callback delivery
//! and error bookkeeping.
//!
//! Lifecycle transitions are serialized by their own lock. The capture
//! thread is joined while holding only that lock, so a frame callback may
//! read the engine (`config`, `frame_interval`, `available_screens`) while
//! `stop` waits for it. A callback must not stop or reconfigure the engine
//! that calls it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use deskpipe_core::{CaptureError, CaptureResult, Frame, ScreenCaptureConfig, ScreenInfo};
use tracing::{debug, error, info, trace, warn};

use crate::worker::CaptureWorker;

/// Receives every captured frame, on the capture thread.
pub type FrameCallback = Arc<dyn Fn(Arc<Frame>) + Send + Sync>;

/// Platform-neutral capture engine.
pub trait CaptureEngine: Send + Sync {
    /// Acquire native capture resources for `config`. Fails with
    /// `Initialization` while running, leaving current resources untouched.
    fn initialize(&self, config: &ScreenCaptureConfig) -> CaptureResult;

    /// Spawn the capture thread. Idempotent while running.
    fn start(&self) -> CaptureResult;

    /// Cancel and join the capture thread. Idempotent; keeps resources.
    fn stop(&self) -> CaptureResult;

    fn is_running(&self) -> bool;

    /// Displays visible to the open session; empty when nothing is open.
    fn available_screens(&self) -> Vec<ScreenInfo>;

    /// Replace the delivery callback; applies from the next captured frame.
    fn set_frame_callback(&self, callback: Option<FrameCallback>);

    fn config(&self) -> ScreenCaptureConfig;

    /// Stop, re-initialize with `config`, and restart if it was running.
    fn update_config(&self, config: &ScreenCaptureConfig) -> CaptureResult;

    fn frame_interval(&self) -> Duration;

    /// Most recent capture failure, if any.
    fn last_error(&self) -> Option<CaptureError>;

    fn backend_name(&self) -> &'static str;
}

/// One native capture session.
///
/// Dropping the value must release every native resource it holds, so a
/// failed `open` that returns early leaks nothing.
pub trait NativeCapture: Send + 'static {
    const NAME: &'static str;

    fn open(config: &ScreenCaptureConfig) -> CaptureResult<Self>
    where
        Self: Sized;

    /// Grab one surface. `Ok(None)` means no new surface this tick.
    fn capture(&mut self) -> CaptureResult<Option<Frame>>;

    fn screens(&self) -> Vec<ScreenInfo>;
}

type Opener<B> = Box<dyn Fn(&ScreenCaptureConfig) -> CaptureResult<B> + Send + Sync>;

// ── Shared state (engine ↔ capture thread) ────────────────────────────────────

#[derive(Default)]
struct Delivery {
    callback: RwLock<Option<FrameCallback>>,
    last_error: Mutex<Option<CaptureError>>,
    running: AtomicBool,
}

impl Delivery {
    fn on_result(&self, backend: &'static str, result: CaptureResult<Option<Frame>>) {
        match result {
            Ok(Some(frame)) => {
                let callback = self
                    .callback
                    .read()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone();
                if let Some(callback) = callback {
                    callback(Arc::new(frame));
                }
            }
            Ok(None) => trace!(backend, "no new surface"),
            Err(e) if e.is_timeout() => trace!(backend, "acquire timed out"),
            Err(e) => self.record(backend, e),
        }
    }

    fn record(&self, backend: &'static str, err: CaptureError) {
        let mut last = self.last_error.lock().unwrap_or_else(PoisonError::into_inner);
        if err.requires_reinitialize() {
            let already_lost = last.as_ref().map(CaptureError::requires_reinitialize).unwrap_or(false);
            if !already_lost {
                error!(backend, error = %err, "capture resource lost, re-initialize required");
            }
        } else if last.as_ref().map(CaptureError::requires_reinitialize).unwrap_or(false) {
            // Keep device loss visible until the next successful initialize.
            warn!(backend, error = %err, "capture failed");
            return;
        } else {
            warn!(backend, error = %err, "capture failed");
        }
        *last = Some(err);
    }

    fn last_error(&self) -> Option<CaptureError> {
        self.last_error.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn clear_error(&self) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

// ── ThreadedEngine ────────────────────────────────────────────────────────────

struct EngineState<B> {
    config: ScreenCaptureConfig,
    interval: Duration,
    backend: Option<Arc<Mutex<B>>>,
    worker: Option<CaptureWorker>,
}

/// Capture engine running backend `B` on a dedicated tick thread.
pub struct ThreadedEngine<B: NativeCapture> {
    transition: Mutex<()>,
    state: Mutex<EngineState<B>>,
    delivery: Arc<Delivery>,
    opener: Opener<B>,
}

impl<B: NativeCapture> ThreadedEngine<B> {
    pub fn new() -> Self {
        Self::with_opener(B::open)
    }

    /// Build an engine that opens sessions through `opener` instead of
    /// [`NativeCapture::open`].
    pub fn with_opener<F>(opener: F) -> Self
    where
        F: Fn(&ScreenCaptureConfig) -> CaptureResult<B> + Send + Sync + 'static,
    {
        let config = ScreenCaptureConfig::default();
        Self {
            transition: Mutex::new(()),
            state: Mutex::new(EngineState {
                interval: config.frame_interval(),
                config,
                backend: None,
                worker: None,
            }),
            delivery: Arc::new(Delivery::default()),
            opener: Box::new(opener),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.lock_state().backend.is_some()
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState<B>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin_transition(&self) -> MutexGuard<'_, ()> {
        self.transition.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn initialize_locked(&self, state: &mut EngineState<B>, config: &ScreenCaptureConfig) -> CaptureResult {
        if state.worker.is_some() {
            error!(backend = B::NAME, "cannot initialize while capture is running");
            return Err(CaptureError::initialization("capture is running"));
        }
        config.validate()?;
        if config.capture_cursor {
            debug!(backend = B::NAME, "cursor compositing is not supported, capturing without cursor");
        }

        // Release the previous session before opening a new one.
        state.backend = None;

        let backend = (self.opener)(config).map_err(|e| {
            error!(backend = B::NAME, error = %e, "initialize failed");
            e
        })?;

        state.backend = Some(Arc::new(Mutex::new(backend)));
        state.config = config.clone();
        state.interval = config.frame_interval();
        self.delivery.clear_error();

        info!(
            backend = B::NAME,
            fps = config.frame_rate,
            monitor = config.monitor_index,
            interval_ms = state.interval.as_millis() as u64,
            "capture engine initialized"
        );
        Ok(())
    }

    fn start_locked(&self, state: &mut EngineState<B>) -> CaptureResult {
        if state.worker.is_some() {
            return Ok(());
        }
        let backend = state
            .backend
            .clone()
            .ok_or_else(|| CaptureError::initialization("engine not initialized"))?;

        let delivery = Arc::clone(&self.delivery);
        let worker = CaptureWorker::spawn(B::NAME, state.interval, move || {
            let result = backend.lock().unwrap_or_else(PoisonError::into_inner).capture();
            delivery.on_result(B::NAME, result);
        })?;

        state.worker = Some(worker);
        self.delivery.running.store(true, Ordering::SeqCst);
        info!(backend = B::NAME, "capture started");
        Ok(())
    }

    /// Detach the worker under the state lock, then join it with the state
    /// lock released. Callers hold the transition lock.
    fn halt_worker(&self) {
        let worker = self.lock_state().worker.take();
        if let Some(worker) = worker {
            worker.stop();
            self.delivery.running.store(false, Ordering::SeqCst);
            info!(backend = B::NAME, "capture stopped");
        }
    }
}

impl<B: NativeCapture> Default for ThreadedEngine<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: NativeCapture> CaptureEngine for ThreadedEngine<B> {
    fn initialize(&self, config: &ScreenCaptureConfig) -> CaptureResult {
        let _transition = self.begin_transition();
        let mut state = self.lock_state();
        self.initialize_locked(&mut state, config)
    }

    fn start(&self) -> CaptureResult {
        let _transition = self.begin_transition();
        let mut state = self.lock_state();
        self.start_locked(&mut state)
    }

    fn stop(&self) -> CaptureResult {
        let _transition = self.begin_transition();
        self.halt_worker();
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.delivery.running.load(Ordering::SeqCst)
    }

    fn available_screens(&self) -> Vec<ScreenInfo> {
        let backend = self.lock_state().backend.clone();
        match backend {
            Some(backend) => backend.lock().unwrap_or_else(PoisonError::into_inner).screens(),
            None => Vec::new(),
        }
    }

    fn set_frame_callback(&self, callback: Option<FrameCallback>) {
        let _state = self.lock_state();
        *self.delivery.callback.write().unwrap_or_else(PoisonError::into_inner) = callback;
    }

    fn config(&self) -> ScreenCaptureConfig {
        self.lock_state().config.clone()
    }

    fn update_config(&self, config: &ScreenCaptureConfig) -> CaptureResult {
        let _transition = self.begin_transition();
        let was_running = self.lock_state().worker.is_some();
        self.halt_worker();

        let mut state = self.lock_state();
        self.initialize_locked(&mut state, config)?;
        if was_running {
            self.start_locked(&mut state)?;
        }
        Ok(())
    }

    fn frame_interval(&self) -> Duration {
        self.lock_state().interval
    }

    fn last_error(&self) -> Option<CaptureError> {
        self.delivery.last_error()
    }

    fn backend_name(&self) -> &'static str {
        B::NAME
    }
}

impl<B: NativeCapture> Drop for ThreadedEngine<B> {
    fn drop(&mut self) {
        self.halt_worker();
        self.lock_state().backend = None;
        debug!(backend = B::NAME, "capture engine torn down");
    }
}
