//! Capture technology selection.
//!
//! Selection is a pure function of the running [`Platform`] and the
//! [`DisplayEnvironment`]; only the final instantiation is compiled per OS.

use std::str::FromStr;

use deskpipe_core::CaptureError;
use tracing::{debug, warn};

use crate::engine::CaptureEngine;

// MARK: - Technology

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Technology {
    DesktopDuplication,
    X11,
    PipeWire,
    CoreGraphics,
    Auto,
}

impl Technology {
    pub const ALL: [Technology; 5] =
        [Self::DesktopDuplication, Self::X11, Self::PipeWire, Self::CoreGraphics, Self::Auto];

    /// Display name of a concrete technology. `Auto` is resolved by
    /// [`EngineFactory::technology_name`].
    pub fn name(self) -> &'static str {
        match self {
            Self::DesktopDuplication => "Desktop Duplication API (Windows)",
            Self::X11 => "X11 API (Linux/Unix)",
            Self::PipeWire => "PipeWire API (Linux)",
            Self::CoreGraphics => "Core Graphics (macOS)",
            Self::Auto => "Auto-detect",
        }
    }
}

impl std::fmt::Display for Technology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Technology {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(Self::Auto),
            "dxgi" | "desktop-duplication" | "desktopduplication" => Ok(Self::DesktopDuplication),
            "x11" => Ok(Self::X11),
            "pipewire" => Ok(Self::PipeWire),
            "coregraphics" | "core-graphics" => Ok(Self::CoreGraphics),
            other => Err(CaptureError::invalid_config(format!("unknown capture technology '{other}'"))),
        }
    }
}

// MARK: - Platform probing

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
    Other,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "linux") {
            Self::Linux
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Other
        }
    }
}

/// Windowing environment advertised to this process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DisplayEnvironment {
    pub x11_display: bool,
    pub wayland_display: bool,
}

impl DisplayEnvironment {
    pub fn from_env() -> Self {
        let set = |name: &str| std::env::var_os(name).map(|v| !v.is_empty()).unwrap_or(false);
        Self { x11_display: set("DISPLAY"), wayland_display: set("WAYLAND_DISPLAY") }
    }
}

// MARK: - EngineFactory

/// Stateless engine construction.
pub struct EngineFactory;

impl EngineFactory {
    /// Linux prefers X11 whenever an X display (native or XWayland) is
    /// reachable and PipeWire on a pure Wayland session.
    pub fn select_for(platform: Platform, env: DisplayEnvironment) -> Technology {
        match platform {
            Platform::Windows => Technology::DesktopDuplication,
            Platform::Linux if !env.x11_display && env.wayland_display => Technology::PipeWire,
            Platform::Linux => Technology::X11,
            Platform::MacOs => Technology::CoreGraphics,
            Platform::Other => Technology::Auto,
        }
    }

    pub fn best_available() -> Technology {
        Self::select_for(Platform::current(), DisplayEnvironment::from_env())
    }

    pub fn resolve(technology: Technology) -> Technology {
        match technology {
            Technology::Auto => Self::best_available(),
            other => other,
        }
    }

    /// True exactly when [`EngineFactory::create`] can build an engine.
    pub fn is_supported(technology: Technology) -> bool {
        match technology {
            Technology::DesktopDuplication => cfg!(target_os = "windows"),
            Technology::X11 => cfg!(target_os = "linux"),
            Technology::PipeWire | Technology::CoreGraphics => false,
            Technology::Auto => match Self::best_available() {
                Technology::Auto => false,
                best => Self::is_supported(best),
            },
        }
    }

    pub fn technology_name(technology: Technology) -> String {
        match technology {
            Technology::Auto => match Self::best_available() {
                Technology::Auto => "Auto-detect (Unknown Technology)".to_string(),
                best => format!("Auto-detect ({})", best.name()),
            },
            other => other.name().to_string(),
        }
    }

    /// Build an engine for `technology`, or `None` if this build or
    /// environment cannot provide one.
    pub fn create(technology: Technology) -> Option<Box<dyn CaptureEngine>> {
        let target = Self::resolve(technology);
        if !Self::is_supported(target) {
            warn!(technology = %Self::technology_name(technology), "capture technology not supported");
            return None;
        }
        debug!(technology = %target, "creating capture engine");

        match target {
            #[cfg(target_os = "windows")]
            Technology::DesktopDuplication => Some(Box::new(
                crate::engine::ThreadedEngine::<crate::dxgi::DxgiCapture>::new(),
            )),
            #[cfg(target_os = "linux")]
            Technology::X11 => Some(Box::new(crate::engine::ThreadedEngine::<crate::x11::X11Capture>::new())),
            _ => None,
        }
    }

    /// First technology in `preferences` that yields an engine.
    pub fn create_with_fallback(
        preferences: &[Technology],
    ) -> Option<(Technology, Box<dyn CaptureEngine>)> {
        preferences
            .iter()
            .find_map(|&t| Self::create(t).map(|engine| (Self::resolve(t), engine)))
    }
}
