//! deskpipe-capture — screen capture engines and the capture source node.
//!
//! | Backend | Platform | Mechanism |
//! |---------|----------|-----------|
//! | [`x11::X11Capture`] | Linux | synchronous `GetImage` on the root window |
//! | [`dxgi::DxgiCapture`] | Windows | desktop duplication + staging readback |
//!
//! Both run inside a [`ThreadedEngine`], which provides the lifecycle state
//! machine and the self-pacing capture thread. [`EngineFactory`] picks the
//! backend for the running platform, and [`ScreenCapturer`] exposes the
//! engine as a pipeline source.

pub mod capturer;
pub mod engine;
pub mod factory;
pub mod worker;

#[cfg(target_os = "linux")]
pub mod x11;

#[cfg(target_os = "windows")]
pub mod dxgi;

pub use capturer::ScreenCapturer;
pub use engine::{CaptureEngine, FrameCallback, NativeCapture, ThreadedEngine};
pub use factory::{DisplayEnvironment, EngineFactory, Platform, Technology};
