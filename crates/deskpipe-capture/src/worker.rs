//! Dedicated capture thread with explicit cancellation.
//!
//! The tick loop self-paces: it wakes every [`IDLE_QUANTUM`], and once at
//! least one tick interval has elapsed since the previous attempt it runs a
//! single capture attempt. Cancellation is cooperative; a capture attempt in
//! progress always completes before the thread exits.

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use deskpipe_core::{CaptureError, CaptureResult};
use tokio::sync::watch;
use tracing::{debug, error};

pub const IDLE_QUANTUM: Duration = Duration::from_millis(1);

pub struct CaptureWorker {
    cancel: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    /// Spawn `name`d thread calling `tick` once per `interval`.
    pub fn spawn<F>(name: &str, interval: Duration, mut tick: F) -> CaptureResult<Self>
    where
        F: FnMut() + Send + 'static,
    {
        let (cancel, cancelled) = watch::channel(false);
        let thread_name = format!("capture-{name}");

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                debug!(thread = %thread_name, ?interval, "capture loop started");
                let mut last_frame = Instant::now();
                while !*cancelled.borrow() {
                    let now = Instant::now();
                    if now.duration_since(last_frame) >= interval {
                        tick();
                        last_frame = now;
                    } else {
                        thread::sleep(IDLE_QUANTUM);
                    }
                }
                debug!(thread = %thread_name, "capture loop ended");
            })
            .map_err(|e| CaptureError::initialization(format!("spawn capture thread: {e}")))?;

        Ok(Self { cancel, handle: Some(handle) })
    }

    /// Signal the loop to exit and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.cancel.send(true);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("capture thread panicked");
            }
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn ticks_until_stopped_then_joins() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let worker = CaptureWorker::spawn("test", Duration::from_millis(2), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn worker");

        thread::sleep(Duration::from_millis(60));
        worker.stop();

        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop > 0, "loop never ticked");
        thread::sleep(Duration::from_millis(20));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop, "ticked after join");
    }

    #[test]
    fn first_tick_waits_one_interval() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let worker = CaptureWorker::spawn("slow", Duration::from_secs(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .expect("spawn worker");

        thread::sleep(Duration::from_millis(20));
        drop(worker);
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
    }
}
