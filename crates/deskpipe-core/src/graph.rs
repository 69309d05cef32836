//! Push-based pipeline graph.
//!
//! Three roles take part in a graph:
//!
//! ```text
//! FrameSource ──deliver──► FrameSink        (pure producer → pure consumer)
//!             └─────────► processor         (FrameSink + FrameSource)
//! ```
//!
//! Every producer owns an [`Outlet`]: an ordered, de-duplicated list of
//! downstream sinks. A sink knows nothing of its sources, so the chain is
//! only the emergent result of wiring outlets together.
//!
//! Delivery is synchronous. `Outlet::deliver` calls each sink's
//! [`FrameSink::on_frame`] on the producer's thread while holding the read
//! side of the outlet lock; topology changes take the write side, so they
//! never interleave with a delivery in progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::trace;

use crate::errors::NodeError;
use crate::frame::Frame;

// ── Identity ──────────────────────────────────────────────────────────────────

/// Stable, process-unique identity of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

// ── Roles ─────────────────────────────────────────────────────────────────────

pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    /// Human-readable name used in logs and pipeline summaries.
    fn name(&self) -> &str;
}

/// Consumer of frames. Implementations must contain their own failures:
/// nothing upstream catches a panic raised inside `on_frame`.
pub trait FrameSink: Node {
    fn on_frame(&self, frame: Arc<Frame>);
}

/// Producer of frames with registrable downstream sinks.
pub trait FrameSource: Node {
    fn outlet(&self) -> &Outlet;

    /// Register `sink`; returns `false` if it was already registered.
    fn add_sink(&self, sink: Arc<dyn FrameSink>) -> bool {
        self.outlet().add_sink(sink)
    }

    fn remove_sink(&self, id: NodeId) -> bool {
        self.outlet().remove_sink(id)
    }

    fn clear_sinks(&self) {
        self.outlet().clear_sinks()
    }

    fn sink_count(&self) -> usize {
        self.outlet().sink_count()
    }

    fn has_sinks(&self) -> bool {
        self.outlet().has_sinks()
    }
}

/// Start/stop control, independent of the data-flow role.
pub trait Lifecycle: Send + Sync {
    fn initialize(&self) -> Result<(), NodeError> {
        Ok(())
    }

    fn start(&self) -> Result<(), NodeError>;

    fn stop(&self);

    fn is_running(&self) -> bool;
}

// ── Outlet ────────────────────────────────────────────────────────────────────

/// Fan-out list of downstream sinks.
#[derive(Default)]
pub struct Outlet {
    sinks: RwLock<Vec<Arc<dyn FrameSink>>>,
}

impl Outlet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&self, sink: Arc<dyn FrameSink>) -> bool {
        let mut sinks = self.write();
        if sinks.iter().any(|s| s.id() == sink.id()) {
            return false;
        }
        sinks.push(sink);
        true
    }

    pub fn remove_sink(&self, id: NodeId) -> bool {
        let mut sinks = self.write();
        let before = sinks.len();
        sinks.retain(|s| s.id() != id);
        sinks.len() != before
    }

    pub fn clear_sinks(&self) {
        self.write().clear();
    }

    pub fn sink_count(&self) -> usize {
        self.read().len()
    }

    pub fn has_sinks(&self) -> bool {
        !self.read().is_empty()
    }

    /// Push `frame` to every registered sink, in registration order.
    /// Invalid (empty) frames are dropped here.
    pub fn deliver(&self, frame: Arc<Frame>) {
        if !frame.is_valid() {
            trace!("dropping invalid frame");
            return;
        }
        let sinks = self.read();
        for sink in sinks.iter() {
            sink.on_frame(Arc::clone(&frame));
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn FrameSink>>> {
        self.sinks.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn FrameSink>>> {
        self.sinks.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Outlet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outlet").field("sinks", &self.sink_count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FrameFormat, VideoInfo};
    use std::sync::Mutex;

    struct Recorder {
        id: NodeId,
        seen: Mutex<Vec<u64>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self { id: NodeId::next(), seen: Mutex::new(Vec::new()) })
        }

        fn seen(&self) -> Vec<u64> {
            self.seen.lock().expect("recorder lock").clone()
        }
    }

    impl Node for Recorder {
        fn id(&self) -> NodeId {
            self.id
        }
        fn name(&self) -> &str {
            "recorder"
        }
    }

    impl FrameSink for Recorder {
        fn on_frame(&self, frame: Arc<Frame>) {
            self.seen.lock().expect("recorder lock").push(frame.timestamp_us());
        }
    }

    fn frame(ts: u64, len: usize) -> Arc<Frame> {
        Arc::new(
            Frame::video(FrameFormat::Bgra32, VideoInfo::new(1, 1, 30), vec![0u8; len], ts)
                .expect("video frame"),
        )
    }

    #[test]
    fn node_ids_are_unique() {
        assert_ne!(NodeId::next(), NodeId::next());
    }

    #[test]
    fn add_sink_is_idempotent() {
        let outlet = Outlet::new();
        let sink = Recorder::new();
        assert!(outlet.add_sink(sink.clone()));
        assert!(!outlet.add_sink(sink.clone()));
        assert_eq!(outlet.sink_count(), 1);

        outlet.deliver(frame(7, 4));
        assert_eq!(sink.seen(), vec![7]);
    }

    #[test]
    fn deliver_preserves_registration_order() {
        let outlet = Outlet::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        struct Tagged(NodeId, &'static str, Arc<Mutex<Vec<&'static str>>>);
        impl Node for Tagged {
            fn id(&self) -> NodeId {
                self.0
            }
            fn name(&self) -> &str {
                self.1
            }
        }
        impl FrameSink for Tagged {
            fn on_frame(&self, _frame: Arc<Frame>) {
                self.2.lock().expect("order lock").push(self.1);
            }
        }

        outlet.add_sink(Arc::new(Tagged(NodeId::next(), "a", order.clone())));
        outlet.add_sink(Arc::new(Tagged(NodeId::next(), "b", order.clone())));
        outlet.add_sink(Arc::new(Tagged(NodeId::next(), "c", order.clone())));
        outlet.deliver(frame(1, 4));

        assert_eq!(*order.lock().expect("order lock"), vec!["a", "b", "c"]);
    }

    #[test]
    fn invalid_frames_are_not_delivered() {
        let outlet = Outlet::new();
        let sink = Recorder::new();
        outlet.add_sink(sink.clone());
        outlet.deliver(frame(1, 0));
        assert!(sink.seen().is_empty());
    }

    #[test]
    fn remove_and_clear_sinks() {
        let outlet = Outlet::new();
        let a = Recorder::new();
        let b = Recorder::new();
        outlet.add_sink(a.clone());
        outlet.add_sink(b.clone());

        assert!(outlet.remove_sink(a.id()));
        assert!(!outlet.remove_sink(a.id()));
        assert_eq!(outlet.sink_count(), 1);

        outlet.clear_sinks();
        assert!(!outlet.has_sinks());
    }

    #[test]
    fn sinks_change_while_another_thread_delivers() {
        const FRAMES: u64 = 2_000;
        let outlet = Arc::new(Outlet::new());
        let stable = Recorder::new();
        outlet.add_sink(stable.clone());
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let deliverer = {
            let outlet = Arc::clone(&outlet);
            std::thread::spawn(move || {
                for ts in 0..FRAMES {
                    outlet.deliver(frame(ts, 4));
                }
            })
        };
        let churner = {
            let outlet = Arc::clone(&outlet);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                let mut cycles = 0u64;
                while !done.load(std::sync::atomic::Ordering::SeqCst) {
                    let extra = Recorder::new();
                    assert!(outlet.add_sink(extra.clone()));
                    assert!(outlet.remove_sink(extra.id()));
                    cycles += 1;
                }
                cycles
            })
        };

        deliverer.join().expect("deliverer thread");
        done.store(true, std::sync::atomic::Ordering::SeqCst);
        churner.join().expect("churner thread");

        assert_eq!(stable.seen(), (0..FRAMES).collect::<Vec<u64>>());
        assert_eq!(outlet.sink_count(), 1);
    }
}
