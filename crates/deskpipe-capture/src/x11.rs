//! X11 direct framebuffer reads.
//!
//! Every tick issues one `GetImage` (Z-pixmap) request against the root
//! window of the selected screen. There is no change detection: each
//! successful request yields a frame.
//!
//! The emitted channel order comes from the root visual's colour masks and
//! is decided once, at `open`:
//!
//! | red mask   | green mask | blue mask  | format |
//! |------------|------------|------------|--------|
//! | `0xFF0000` | `0x00FF00` | `0x0000FF` | BGRA32 |
//! | `0x0000FF` | `0x00FF00` | `0xFF0000` | RGBA32 |

use deskpipe_core::{
    monotonic_timestamp_us, CaptureError, CaptureResult, Frame, FrameFormat, Region, Resolution,
    ScreenCaptureConfig, ScreenInfo, VideoInfo,
};
use tracing::{debug, info, trace};
use x11rb::connection::Connection;
use x11rb::errors::ReplyError;
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat, Screen, Window};
use x11rb::rust_connection::RustConnection;

use crate::engine::NativeCapture;

const BYTES_PER_PIXEL: usize = 4;

pub struct X11Capture {
    conn: RustConnection,
    /// Screen named by `DISPLAY`; reported as the primary screen.
    default_screen: usize,
    root: Window,
    region: Region,
    format: FrameFormat,
    framerate: u32,
}

impl NativeCapture for X11Capture {
    const NAME: &'static str = "x11";

    fn open(config: &ScreenCaptureConfig) -> CaptureResult<Self> {
        let (conn, default_screen) = x11rb::connect(None).map_err(|e| CaptureError::NoDisplay {
            reason: format!("cannot connect to X server ({e}); is DISPLAY set?"),
        })?;

        let screen_num = config.monitor_index as usize;
        let screen = conn.setup().roots.get(screen_num).ok_or_else(|| {
            CaptureError::invalid_config(format!(
                "screen {} not found ({} screens, default {})",
                screen_num,
                conn.setup().roots.len(),
                default_screen
            ))
        })?;

        let format = detect_format(&conn, screen)?;
        let bounds = Resolution::new(screen.width_in_pixels as u32, screen.height_in_pixels as u32);
        let region = match config.region() {
            Some(region) if region.fits_within(bounds) => region,
            Some(region) => {
                return Err(CaptureError::invalid_config(format!(
                    "capture region {}x{}+{}+{} exceeds screen {}",
                    region.width, region.height, region.x, region.y, bounds
                )))
            }
            None => Region { x: 0, y: 0, width: bounds.width, height: bounds.height },
        };
        let root = screen.root;

        info!(
            screen = screen_num,
            width = region.width,
            height = region.height,
            x = region.x,
            y = region.y,
            %format,
            "X11 display opened"
        );

        Ok(Self { conn, default_screen, root, region, format, framerate: config.frame_rate })
    }

    fn capture(&mut self) -> CaptureResult<Option<Frame>> {
        let Region { x, y, width, height } = self.region;
        let reply = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, self.root, x as i16, y as i16, width as u16, height as u16, !0)
            .map_err(|e| CaptureError::access_denied(format!("X11 connection lost: {e}")))?
            .reply()
            .map_err(map_reply_error)?;

        let data = pack_rows(&reply.data, width as usize, height as usize)?;
        trace!(bytes = data.len(), depth = reply.depth, "X11 image read");

        let info = VideoInfo::new(width, height, self.framerate);
        let frame = Frame::video(self.format, info, data, monotonic_timestamp_us())
            .map_err(|e| CaptureError::unknown(e.to_string()))?;
        Ok(Some(frame))
    }

    fn screens(&self) -> Vec<ScreenInfo> {
        let setup = self.conn.setup();
        let screens: Vec<ScreenInfo> = setup
            .roots
            .iter()
            .enumerate()
            .map(|(i, screen)| {
                screen_info(i, screen.width_in_pixels, screen.height_in_pixels, screen.root_depth, self.default_screen)
            })
            .collect();
        debug!(count = screens.len(), "X11 screens enumerated");
        screens
    }
}

fn screen_info(index: usize, width: u16, height: u16, depth: u8, default_screen: usize) -> ScreenInfo {
    ScreenInfo {
        id: index as u32,
        width: width as u32,
        height: height as u32,
        bits_per_pixel: depth as u32,
        x: 0,
        y: 0,
        name: format!("Screen {index}"),
        is_primary: index == default_screen,
    }
}

fn map_reply_error(err: ReplyError) -> CaptureError {
    match err {
        ReplyError::ConnectionError(e) => CaptureError::access_denied(format!("X11 connection lost: {e}")),
        ReplyError::X11Error(e) => CaptureError::unknown(format!("GetImage failed: {:?}", e.error_kind)),
    }
}

/// Find the root visual's masks and the pixmap format for the root depth.
fn detect_format(conn: &RustConnection, screen: &Screen) -> CaptureResult<FrameFormat> {
    let visual = screen
        .allowed_depths
        .iter()
        .flat_map(|d| d.visuals.iter())
        .find(|v| v.visual_id == screen.root_visual)
        .ok_or_else(|| CaptureError::initialization("root visual not advertised by server"))?;

    let bits_per_pixel = conn
        .setup()
        .pixmap_formats
        .iter()
        .find(|f| f.depth == screen.root_depth)
        .map(|f| f.bits_per_pixel)
        .unwrap_or(0);

    if screen.root_depth != 24 || bits_per_pixel != 32 {
        return Err(CaptureError::NotSupported {
            feature: format!("X11 depth {} at {} bpp", screen.root_depth, bits_per_pixel),
        });
    }

    format_from_masks(visual.red_mask, visual.green_mask, visual.blue_mask).ok_or_else(|| {
        CaptureError::NotSupported {
            feature: format!(
                "X11 channel masks r={:#08x} g={:#08x} b={:#08x}",
                visual.red_mask, visual.green_mask, visual.blue_mask
            ),
        }
    })
}

pub(crate) fn format_from_masks(red: u32, green: u32, blue: u32) -> Option<FrameFormat> {
    match (red, green, blue) {
        (0x00FF_0000, 0x0000_FF00, 0x0000_00FF) => Some(FrameFormat::Bgra32),
        (0x0000_00FF, 0x0000_FF00, 0x00FF_0000) => Some(FrameFormat::Rgba32),
        _ => None,
    }
}

/// Repack a reply into tight `width * 4` rows. Replies whose stride already
/// matches are copied in one go.
pub(crate) fn pack_rows(src: &[u8], width: usize, height: usize) -> CaptureResult<Vec<u8>> {
    let row_bytes = width * BYTES_PER_PIXEL;
    if height == 0 || src.len() < row_bytes * height {
        return Err(CaptureError::unknown(format!(
            "short image reply: {} bytes for {}x{}",
            src.len(),
            width,
            height
        )));
    }

    let stride = src.len() / height;
    if stride == row_bytes {
        return Ok(src[..row_bytes * height].to_vec());
    }

    let mut out = Vec::with_capacity(row_bytes * height);
    for row in src.chunks(stride).take(height) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_select_channel_order() {
        assert_eq!(format_from_masks(0xFF0000, 0xFF00, 0xFF), Some(FrameFormat::Bgra32));
        assert_eq!(format_from_masks(0xFF, 0xFF00, 0xFF0000), Some(FrameFormat::Rgba32));
        assert_eq!(format_from_masks(0xF800, 0x07E0, 0x001F), None);
    }

    #[test]
    fn tight_rows_copy_in_bulk() {
        let src: Vec<u8> = (0..16).collect();
        assert_eq!(pack_rows(&src, 2, 2).expect("pack"), src);
    }

    #[test]
    fn padded_rows_are_trimmed() {
        // 1 pixel wide, stride 8: 4 bytes of pixel + 4 bytes padding per row.
        let src = [1, 2, 3, 4, 0, 0, 0, 0, 5, 6, 7, 8, 0, 0, 0, 0];
        assert_eq!(pack_rows(&src, 1, 2).expect("pack"), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn primary_screen_is_the_display_default() {
        // Capturing screen 0 of a `:0.1` display: screen 1 is still the primary.
        let screens: Vec<ScreenInfo> = [(1920, 1080), (2560, 1440)]
            .iter()
            .enumerate()
            .map(|(i, &(w, h))| screen_info(i, w, h, 24, 1))
            .collect();
        assert!(!screens[0].is_primary);
        assert!(screens[1].is_primary);
        assert_eq!(screens[1].name, "Screen 1");
        assert_eq!((screens[1].width, screens[1].height, screens[1].bits_per_pixel), (2560, 1440, 24));
    }

    #[test]
    fn short_reply_is_an_error() {
        assert!(pack_rows(&[0u8; 7], 1, 2).is_err());
    }
}
