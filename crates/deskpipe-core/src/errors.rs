use thiserror::Error;

use crate::frame::FrameFormat;

/// Result of every capture-engine entry point. `Ok(())` is success.
pub type CaptureResult<T = ()> = Result<T, CaptureError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Native resource acquisition failed, or the call came in the wrong
    /// lifecycle state (e.g. `initialize` while running).
    #[error("Initialization failed: {reason}")]
    Initialization { reason: String },

    #[error("Configuration invalid: {reason}")]
    InvalidConfig { reason: String },

    #[error("No display available: {reason}")]
    NoDisplay { reason: String },

    /// The capture resource is unavailable or was revoked. A full
    /// re-initialization is required before capture can resume.
    #[error("Access denied: {reason}")]
    AccessDenied { reason: String },

    #[error("Timed out waiting for a new surface")]
    Timeout,

    #[error("Unknown capture failure: {reason}")]
    Unknown { reason: String },

    #[error("Not supported: {feature}")]
    NotSupported { feature: String },

    #[error("Capture already started")]
    AlreadyStarted,

    #[error("Capture engine already initialized")]
    AlreadyInitialized,
}

impl CaptureError {
    pub fn initialization(reason: impl Into<String>) -> Self {
        Self::Initialization { reason: reason.into() }
    }

    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig { reason: reason.into() }
    }

    pub fn access_denied(reason: impl Into<String>) -> Self {
        Self::AccessDenied { reason: reason.into() }
    }

    pub fn unknown(reason: impl Into<String>) -> Self {
        Self::Unknown { reason: reason.into() }
    }

    /// Device lost or access revoked: the engine must be re-initialized.
    pub fn requires_reinitialize(&self) -> bool {
        matches!(self, Self::AccessDenied { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Payload family {payload} does not match format {format}")]
    FamilyMismatch { format: FrameFormat, payload: &'static str },

    #[error("Unknown frame format code {0}")]
    UnknownFormat(u16),
}

/// Lifecycle failure of a single graph node.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Configuration invalid: {reason}")]
    ConfigurationInvalid { reason: String },

    #[error("Node not initialized")]
    NotInitialized,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Pipeline has no source")]
    MissingSource,

    #[error("Pipeline has no sink")]
    MissingSink,

    #[error("Failed to initialize {component}: {source}")]
    InitializeFailed { component: String, source: NodeError },

    #[error("Failed to start {component}: {source}")]
    StartFailed { component: String, source: NodeError },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_access_denied_requires_reinitialize() {
        assert!(CaptureError::access_denied("lost").requires_reinitialize());
        assert!(!CaptureError::Timeout.requires_reinitialize());
        assert!(!CaptureError::unknown("x").requires_reinitialize());
        assert!(CaptureError::Timeout.is_timeout());
    }

    #[test]
    fn node_error_wraps_capture_error() {
        let err: NodeError = CaptureError::NoDisplay { reason: "DISPLAY unset".into() }.into();
        assert_eq!(err.to_string(), "Capture error: No display available: DISPLAY unset");
    }
}
