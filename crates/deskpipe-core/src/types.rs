use serde::{Deserialize, Serialize};

// MARK: - Resolution

/// Pixel dimensions of a surface or frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const HD: Self = Self { width: 1280, height: 720 };
    pub const FHD: Self = Self { width: 1920, height: 1080 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - Region

/// Capture rectangle in output coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    /// True when the rectangle lies entirely inside a `bounds` sized output.
    pub fn fits_within(&self, bounds: Resolution) -> bool {
        self.width > 0
            && self.height > 0
            && self.x as u64 + self.width as u64 <= bounds.width as u64
            && self.y as u64 + self.height as u64 <= bounds.height as u64
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

// MARK: - ScreenInfo

/// A display discovered by a capture backend. Re-enumerated on every query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenInfo {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub x: i32,
    pub y: i32,
    pub name: String,
    pub is_primary: bool,
}

impl ScreenInfo {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

impl std::fmt::Display for ScreenInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{} {} {} @ ({}, {}) {}bpp{}",
            self.id,
            self.name,
            self.resolution(),
            self.x,
            self.y,
            self.bits_per_pixel,
            if self.is_primary { " [primary]" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn region_must_fit_inside_output() {
        let screen = Resolution::FHD;
        assert!(Region { x: 0, y: 0, width: 1920, height: 1080 }.fits_within(screen));
        assert!(Region { x: 100, y: 80, width: 640, height: 480 }.fits_within(screen));
        assert!(!Region { x: 1900, y: 0, width: 40, height: 10 }.fits_within(screen));
        assert!(!Region { x: 0, y: 0, width: 0, height: 10 }.fits_within(screen));
    }

    #[test]
    fn screen_info_display_marks_primary() {
        let screen = ScreenInfo {
            id: 0,
            width: 1920,
            height: 1080,
            bits_per_pixel: 24,
            x: 0,
            y: 0,
            name: "Screen 0".into(),
            is_primary: true,
        };
        assert_eq!(screen.to_string(), "#0 Screen 0 1920×1080 @ (0, 0) 24bpp [primary]");
    }
}
