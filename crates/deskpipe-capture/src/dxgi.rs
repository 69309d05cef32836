//! DXGI desktop duplication.
//!
//! # Session
//!
//! ```text
//! D3D11CreateDevice ─► IDXGIDevice::GetAdapter ─► EnumOutputs(monitor_index)
//!   │  IDXGIOutput1::DuplicateOutput
//!   ▼
//! IDXGIOutputDuplication ──AcquireNextFrame──► ID3D11Texture2D (GPU)
//!   │  CopySubresourceRegion(region box) → region-sized staging texture → Map
//!   ▼
//! Vec<u8> BGRA32 (tightly packed rows)
//! ```
//!
//! The duplicated surface size comes from the duplication's own mode
//! description, and the capture region is validated against it. Rotated
//! outputs are rejected, since the surface would not be in desktop
//! orientation.
//!
//! Only composed surfaces with a new present count as frames; cursor-only
//! updates and acquisition timeouts are no-frame ticks.

use deskpipe_core::{
    monotonic_timestamp_us, CaptureError, CaptureResult, Frame, FrameFormat, Region, Resolution,
    ScreenCaptureConfig, ScreenInfo, VideoInfo,
};
use tracing::{debug, info, trace};
use windows::core::{Interface, HRESULT};
use windows::Win32::Foundation::E_ACCESSDENIED;
use windows::Win32::Graphics::Direct3D::D3D_DRIVER_TYPE_HARDWARE;
use windows::Win32::Graphics::Direct3D11::{
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext, ID3D11Texture2D, D3D11_BOX,
    D3D11_CPU_ACCESS_READ, D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_MAPPED_SUBRESOURCE,
    D3D11_MAP_READ, D3D11_SDK_VERSION, D3D11_TEXTURE2D_DESC, D3D11_USAGE_STAGING,
};
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_FORMAT_B8G8R8A8_UNORM, DXGI_MODE_ROTATION_IDENTITY, DXGI_MODE_ROTATION_UNSPECIFIED,
    DXGI_SAMPLE_DESC,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, IDXGIDevice, IDXGIFactory1, IDXGIOutput, IDXGIOutput1,
    IDXGIOutputDuplication, IDXGIResource, DXGI_ERROR_ACCESS_LOST, DXGI_ERROR_DEVICE_REMOVED,
    DXGI_ERROR_DEVICE_RESET, DXGI_ERROR_NOT_CURRENTLY_AVAILABLE, DXGI_ERROR_NOT_FOUND,
    DXGI_ERROR_WAIT_TIMEOUT, DXGI_OUTDUPL_DESC, DXGI_OUTDUPL_FRAME_INFO, DXGI_OUTPUT_DESC,
};

use crate::engine::NativeCapture;

/// Upper bound on one `AcquireNextFrame` wait; also bounds stop latency.
const ACQUIRE_TIMEOUT_MS: u32 = 16;
const BYTES_PER_PIXEL: usize = 4;

pub struct DxgiCapture {
    _device: ID3D11Device,
    context: ID3D11DeviceContext,
    duplication: IDXGIOutputDuplication,
    /// Region-sized; receives only the captured box of each surface.
    staging: ID3D11Texture2D,
    region: Region,
    framerate: u32,
}

// SAFETY: the COM objects are only touched through `&mut self` while the
// engine holds the backend mutex, so no two threads use them at once.
unsafe impl Send for DxgiCapture {}

impl NativeCapture for DxgiCapture {
    const NAME: &'static str = "dxgi";

    fn open(config: &ScreenCaptureConfig) -> CaptureResult<Self> {
        // ── 1. D3D11 device ───────────────────────────────────────────────
        let mut device: Option<ID3D11Device> = None;
        let mut context: Option<ID3D11DeviceContext> = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
            .map_err(|e| CaptureError::initialization(format!("D3D11CreateDevice: {e}")))?;
        }
        let device = device.ok_or_else(|| CaptureError::initialization("D3D11CreateDevice returned no device"))?;
        let context = context.ok_or_else(|| CaptureError::initialization("D3D11CreateDevice returned no context"))?;

        // ── 2. Output for monitor_index ───────────────────────────────────
        let dxgi_device: IDXGIDevice = device
            .cast()
            .map_err(|e| CaptureError::initialization(format!("cast IDXGIDevice: {e}")))?;
        let adapter = unsafe { dxgi_device.GetAdapter() }
            .map_err(|e| CaptureError::initialization(format!("GetAdapter: {e}")))?;
        let output: IDXGIOutput = unsafe { adapter.EnumOutputs(config.monitor_index) }.map_err(|e| {
            if e.code() == DXGI_ERROR_NOT_FOUND {
                CaptureError::invalid_config(format!("monitor {} not found", config.monitor_index))
            } else {
                CaptureError::initialization(format!("EnumOutputs: {e}"))
            }
        })?;

        // ── 3. Duplication ────────────────────────────────────────────────
        let output1: IDXGIOutput1 = output
            .cast()
            .map_err(|e| CaptureError::initialization(format!("cast IDXGIOutput1: {e}")))?;
        let duplication = unsafe { output1.DuplicateOutput(&device) }.map_err(|e| {
            if e.code() == DXGI_ERROR_NOT_CURRENTLY_AVAILABLE || e.code() == E_ACCESSDENIED {
                CaptureError::access_denied(format!(
                    "desktop duplication unavailable, possibly held by another process: {e}"
                ))
            } else {
                CaptureError::initialization(format!("DuplicateOutput: {e}"))
            }
        })?;
        let mut duplication_desc = DXGI_OUTDUPL_DESC::default();
        unsafe { duplication.GetDesc(&mut duplication_desc) };
        let output_size = duplicated_surface_size(&duplication_desc)?;

        // ── 4. Region + staging texture ───────────────────────────────────
        let region = match config.region() {
            Some(region) if region.fits_within(output_size) => region,
            Some(region) => {
                return Err(CaptureError::invalid_config(format!(
                    "capture region {}x{}+{}+{} exceeds output {}",
                    region.width, region.height, region.x, region.y, output_size
                )))
            }
            None => Region { x: 0, y: 0, width: output_size.width, height: output_size.height },
        };
        let staging = region_staging_texture(&device, region)?;

        info!(
            monitor = config.monitor_index,
            output = %output_size,
            region = %region.resolution(),
            x = region.x,
            y = region.y,
            "desktop duplication opened"
        );

        Ok(Self { _device: device, context, duplication, staging, region, framerate: config.frame_rate })
    }

    fn capture(&mut self) -> CaptureResult<Option<Frame>> {
        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource: Option<IDXGIResource> = None;

        if let Err(e) = unsafe {
            self.duplication
                .AcquireNextFrame(ACQUIRE_TIMEOUT_MS, &mut frame_info, &mut resource)
        } {
            return map_acquire_error(e.code()).map(|_| None);
        }
        let _release = AcquiredFrame { duplication: &self.duplication };

        if frame_info.LastPresentTime == 0 {
            trace!("cursor-only update");
            return Ok(None);
        }
        let resource = resource.ok_or_else(|| CaptureError::unknown("AcquireNextFrame returned no resource"))?;
        let texture: ID3D11Texture2D = resource
            .cast()
            .map_err(|e| CaptureError::unknown(format!("cast ID3D11Texture2D: {e}")))?;

        let src_box = region_box(self.region);
        unsafe {
            self.context
                .CopySubresourceRegion(&self.staging, 0, 0, 0, 0, &texture, 0, Some(&src_box as *const D3D11_BOX))
        };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe { self.context.Map(&self.staging, 0, D3D11_MAP_READ, 0, Some(&mut mapped)) }
            .map_err(|e| map_device_error(e.code(), "Map staging texture"))?;
        let _unmap = MappedTexture { context: &self.context, texture: &self.staging };

        let pitch = mapped.RowPitch as usize;
        let (width, height) = (self.region.width as usize, self.region.height as usize);
        let len = pitch * height.saturating_sub(1) + width * BYTES_PER_PIXEL;
        let surface = unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, len) };
        let data = pack_rows(surface, pitch, width, height);

        let info = VideoInfo::new(self.region.width, self.region.height, self.framerate);
        let frame = Frame::video(FrameFormat::Bgra32, info, data, monotonic_timestamp_us())
            .map_err(|e| CaptureError::unknown(e.to_string()))?;
        Ok(Some(frame))
    }

    fn screens(&self) -> Vec<ScreenInfo> {
        let factory: IDXGIFactory1 = match unsafe { CreateDXGIFactory1() } {
            Ok(factory) => factory,
            Err(e) => {
                debug!(error = %e, "CreateDXGIFactory1 failed");
                return Vec::new();
            }
        };

        let mut screens = Vec::new();
        let mut adapter_idx = 0;
        while let Ok(adapter) = unsafe { factory.EnumAdapters1(adapter_idx) } {
            let mut output_idx = 0;
            while let Ok(output) = unsafe { adapter.EnumOutputs(output_idx) } {
                if let Ok(desc) = unsafe { output.GetDesc() } {
                    let size = desktop_size(&desc);
                    let coords = desc.DesktopCoordinates;
                    screens.push(ScreenInfo {
                        id: screens.len() as u32,
                        width: size.width,
                        height: size.height,
                        bits_per_pixel: 32,
                        x: coords.left,
                        y: coords.top,
                        name: device_name(&desc.DeviceName),
                        is_primary: coords.left == 0 && coords.top == 0,
                    });
                }
                output_idx += 1;
            }
            adapter_idx += 1;
        }
        debug!(count = screens.len(), "DXGI outputs enumerated");
        screens
    }
}

// ── Guards ────────────────────────────────────────────────────────────────────

/// Releases an acquired duplication frame on every exit path.
struct AcquiredFrame<'a> {
    duplication: &'a IDXGIOutputDuplication,
}

impl Drop for AcquiredFrame<'_> {
    fn drop(&mut self) {
        let _ = unsafe { self.duplication.ReleaseFrame() };
    }
}

struct MappedTexture<'a> {
    context: &'a ID3D11DeviceContext,
    texture: &'a ID3D11Texture2D,
}

impl Drop for MappedTexture<'_> {
    fn drop(&mut self) {
        unsafe { self.context.Unmap(self.texture, 0) };
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn map_acquire_error(code: HRESULT) -> CaptureResult {
    if code == DXGI_ERROR_WAIT_TIMEOUT {
        return Ok(());
    }
    Err(map_device_error(code, "AcquireNextFrame"))
}

/// Lost duplication access and a removed or reset device all need a fresh
/// device and duplication, so they share `AccessDenied`.
fn map_device_error(code: HRESULT, call: &str) -> CaptureError {
    const DEVICE_LOSS: [HRESULT; 5] = [
        DXGI_ERROR_ACCESS_LOST,
        E_ACCESSDENIED,
        DXGI_ERROR_NOT_CURRENTLY_AVAILABLE,
        DXGI_ERROR_DEVICE_REMOVED,
        DXGI_ERROR_DEVICE_RESET,
    ];
    if DEVICE_LOSS.contains(&code) {
        CaptureError::access_denied(format!("{call}: desktop duplication access lost ({code:?})"))
    } else {
        CaptureError::unknown(format!("{call} failed ({code:?})"))
    }
}

/// Size of the surfaces `AcquireNextFrame` will hand out. Only unrotated
/// BGRA surfaces are supported.
fn duplicated_surface_size(desc: &DXGI_OUTDUPL_DESC) -> CaptureResult<Resolution> {
    if desc.Rotation != DXGI_MODE_ROTATION_IDENTITY && desc.Rotation != DXGI_MODE_ROTATION_UNSPECIFIED {
        return Err(CaptureError::NotSupported {
            feature: format!("desktop duplication of a rotated output ({})", desc.Rotation.0),
        });
    }
    if desc.ModeDesc.Format != DXGI_FORMAT_B8G8R8A8_UNORM {
        return Err(CaptureError::NotSupported {
            feature: format!("duplicated surface format {}", desc.ModeDesc.Format.0),
        });
    }
    Ok(Resolution::new(desc.ModeDesc.Width, desc.ModeDesc.Height))
}

fn region_box(region: Region) -> D3D11_BOX {
    D3D11_BOX {
        left: region.x,
        top: region.y,
        front: 0,
        right: region.x + region.width,
        bottom: region.y + region.height,
        back: 1,
    }
}

fn desktop_size(desc: &DXGI_OUTPUT_DESC) -> Resolution {
    let r = desc.DesktopCoordinates;
    Resolution::new((r.right - r.left).max(0) as u32, (r.bottom - r.top).max(0) as u32)
}

fn device_name(raw: &[u16]) -> String {
    let len = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
    String::from_utf16_lossy(&raw[..len])
}

fn region_staging_texture(device: &ID3D11Device, region: Region) -> CaptureResult<ID3D11Texture2D> {
    let desc = D3D11_TEXTURE2D_DESC {
        Width: region.width,
        Height: region.height,
        MipLevels: 1,
        ArraySize: 1,
        Format: DXGI_FORMAT_B8G8R8A8_UNORM,
        SampleDesc: DXGI_SAMPLE_DESC { Count: 1, Quality: 0 },
        Usage: D3D11_USAGE_STAGING,
        CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
        ..Default::default()
    };
    let mut texture: Option<ID3D11Texture2D> = None;
    unsafe { device.CreateTexture2D(&desc, None, Some(&mut texture)) }.map_err(|e| {
        CaptureError::initialization(format!("staging texture {}x{}: {e}", region.width, region.height))
    })?;
    texture.ok_or_else(|| CaptureError::initialization("CreateTexture2D returned no texture"))
}

/// Strip the row padding of a mapped texture. A tight pitch is one bulk copy.
fn pack_rows(surface: &[u8], pitch: usize, width: usize, height: usize) -> Vec<u8> {
    let row_bytes = width * BYTES_PER_PIXEL;
    if pitch == row_bytes {
        return surface[..row_bytes * height].to_vec();
    }
    let mut out = Vec::with_capacity(row_bytes * height);
    for row in surface.chunks(pitch).take(height) {
        out.extend_from_slice(&row[..row_bytes]);
    }
    out
}
