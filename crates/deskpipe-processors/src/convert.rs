//! Pixel format conversion kernels.
//!
//! Inputs are the packed RGB families (RGB24, BGR24, RGBA32, BGRA32) with a
//! tight stride of `width * bytes_per_pixel`. Outputs are any packed family or
//! planar I420 using integer BT.601 coefficients.

use deskpipe_core::FrameFormat;

use crate::errors::ConvertError;

/// Formats the converter can produce.
pub const OUTPUT_FORMATS: [FrameFormat; 5] = [
    FrameFormat::Rgb24,
    FrameFormat::Bgr24,
    FrameFormat::Rgba32,
    FrameFormat::Bgra32,
    FrameFormat::I420,
];

pub fn is_supported_output(format: FrameFormat) -> bool {
    OUTPUT_FORMATS.contains(&format)
}

pub fn is_supported_input(format: FrameFormat) -> bool {
    layout(format).is_some()
}

// ── Packed layouts ────────────────────────────────────────────────────────────

/// Byte offsets of each channel inside one packed pixel.
#[derive(Debug, Clone, Copy)]
struct Layout {
    bpp:   usize,
    r:     usize,
    g:     usize,
    b:     usize,
    alpha: Option<usize>,
}

fn layout(format: FrameFormat) -> Option<Layout> {
    match format {
        FrameFormat::Rgb24  => Some(Layout { bpp: 3, r: 0, g: 1, b: 2, alpha: None }),
        FrameFormat::Bgr24  => Some(Layout { bpp: 3, r: 2, g: 1, b: 0, alpha: None }),
        FrameFormat::Rgba32 => Some(Layout { bpp: 4, r: 0, g: 1, b: 2, alpha: Some(3) }),
        FrameFormat::Bgra32 => Some(Layout { bpp: 4, r: 2, g: 1, b: 0, alpha: Some(3) }),
        _ => None,
    }
}

/// Size in bytes of a `width x height` image in `format`, or `None` for
/// formats the converter does not produce.
pub fn output_size(format: FrameFormat, width: u32, height: u32) -> Option<usize> {
    let pixels = width as usize * height as usize;
    match format {
        FrameFormat::I420 => Some(pixels + pixels / 2),
        other => layout(other).map(|l| pixels * l.bpp),
    }
}

/// Convert a tightly packed `width x height` image from `from` to `to`.
///
/// Converting a format to itself copies the first `width * height * bpp`
/// bytes unchanged. Destination alpha is copied from the source when both
/// sides carry it and is fully opaque otherwise.
pub fn convert(
    src: &[u8],
    from: FrameFormat,
    to: FrameFormat,
    width: u32,
    height: u32,
) -> Result<Vec<u8>, ConvertError> {
    if width == 0 || height == 0 {
        return Err(ConvertError::ZeroDimensions);
    }
    let src_layout = layout(from).ok_or(ConvertError::UnsupportedConversion { from, to })?;
    if !is_supported_output(to) {
        return Err(ConvertError::UnsupportedConversion { from, to });
    }

    let pixels = width as usize * height as usize;
    let expected = pixels * src_layout.bpp;
    if src.len() < expected {
        return Err(ConvertError::ShortInput { expected, actual: src.len() });
    }
    let src = &src[..expected];

    if from == to {
        return Ok(src.to_vec());
    }

    match layout(to) {
        Some(dst_layout) => Ok(repack(src, src_layout, dst_layout)),
        None => Ok(to_i420(src, src_layout, width as usize, height as usize)),
    }
}

fn repack(src: &[u8], from: Layout, to: Layout) -> Vec<u8> {
    let pixels = src.len() / from.bpp;
    let mut out = vec![0u8; pixels * to.bpp];

    for (s, d) in src.chunks_exact(from.bpp).zip(out.chunks_exact_mut(to.bpp)) {
        d[to.r] = s[from.r];
        d[to.g] = s[from.g];
        d[to.b] = s[from.b];
        if let Some(a) = to.alpha {
            d[a] = from.alpha.map_or(u8::MAX, |sa| s[sa]);
        }
    }
    out
}

// ── I420 ──────────────────────────────────────────────────────────────────────

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// BT.601 integer approximation. `>>` on `i32` is arithmetic, so negative
/// chroma sums round toward negative infinity.
pub fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = (77 * r + 150 * g + 29 * b) >> 8;
    let u = ((-43 * r - 85 * g + 128 * b) >> 8) + 128;
    let v = ((128 * r - 107 * g - 21 * b) >> 8) + 128;
    (clamp_u8(y), clamp_u8(u), clamp_u8(v))
}

/// Chroma is sampled from the top-left pixel of every 2x2 block. For odd
/// dimensions the trailing row/column contributes luma only.
fn to_i420(src: &[u8], layout: Layout, width: usize, height: usize) -> Vec<u8> {
    let luma = width * height;
    let (chroma_w, chroma_h) = (width / 2, height / 2);

    let mut out = vec![0u8; luma + luma / 2];
    let (y_plane, chroma) = out.split_at_mut(luma);
    let (u_plane, v_plane) = chroma.split_at_mut(luma / 4);

    for (row, line) in src.chunks_exact(width * layout.bpp).enumerate() {
        for (col, px) in line.chunks_exact(layout.bpp).enumerate() {
            let (y, u, v) = rgb_to_yuv(px[layout.r], px[layout.g], px[layout.b]);
            y_plane[row * width + col] = y;

            if row % 2 == 0 && col % 2 == 0 && row / 2 < chroma_h && col / 2 < chroma_w {
                let idx = (row / 2) * chroma_w + col / 2;
                u_plane[idx] = u;
                v_plane[idx] = v;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(format: FrameFormat, px: &[u8], width: u32, height: u32) -> Vec<u8> {
        assert_eq!(px.len(), format.packed_bytes_per_pixel().expect("packed format"));
        px.repeat((width * height) as usize)
    }

    #[test]
    fn output_sizes() {
        assert_eq!(output_size(FrameFormat::I420, 64, 64), Some(6144));
        assert_eq!(output_size(FrameFormat::Rgb24, 4, 2), Some(24));
        assert_eq!(output_size(FrameFormat::Bgra32, 4, 2), Some(32));
        assert_eq!(output_size(FrameFormat::Nv12, 4, 2), None);
    }

    #[test]
    fn bgra_to_i420_has_documented_size() {
        let src = solid(FrameFormat::Bgra32, &[10, 20, 30, 255], 64, 64);
        let out = convert(&src, FrameFormat::Bgra32, FrameFormat::I420, 64, 64).expect("convert");
        assert_eq!(out.len(), 6144);
    }

    #[test]
    fn solid_red_to_i420() {
        let src = solid(FrameFormat::Bgra32, &[0, 0, 255, 255], 3, 3);
        let out = convert(&src, FrameFormat::Bgra32, FrameFormat::I420, 3, 3).expect("convert");

        assert_eq!(out.len(), 13);
        assert!(out[..9].iter().all(|&y| y == 76), "luma {:?}", &out[..9]);
        // U plane starts at 9, V plane at 9 + 9/4.
        assert_eq!(out[9], 85);
        assert_eq!(out[11], 255);
    }

    #[test]
    fn chroma_is_sampled_from_even_positions() {
        // 2x2 blocks: top-left pixel blue, everything else black.
        let mut src = vec![0u8; 4 * 4 * 4];
        for (x, y) in [(0usize, 0usize), (2, 0), (0, 2), (2, 2)] {
            let i = (y * 4 + x) * 4;
            src[i..i + 4].copy_from_slice(&[255, 0, 0, 255]);
        }
        let out = convert(&src, FrameFormat::Bgra32, FrameFormat::I420, 4, 4).expect("convert");
        let (_, u_blue, v_blue) = rgb_to_yuv(0, 0, 255);
        assert_eq!(&out[16..20], &[u_blue; 4]);
        assert_eq!(&out[20..24], &[v_blue; 4]);
    }

    #[test]
    fn bgra_rgba_roundtrip_is_identity() {
        let src: Vec<u8> = (0..64u8).collect();
        let rgba = convert(&src, FrameFormat::Bgra32, FrameFormat::Rgba32, 4, 4).expect("to rgba");
        assert_eq!(&rgba[..4], &[2, 1, 0, 3]);
        let back = convert(&rgba, FrameFormat::Rgba32, FrameFormat::Bgra32, 4, 4).expect("to bgra");
        assert_eq!(back, src);
    }

    #[test]
    fn adding_alpha_is_opaque_and_dropping_it_keeps_colour() {
        let rgb = [1u8, 2, 3, 4, 5, 6];
        let bgra = convert(&rgb, FrameFormat::Rgb24, FrameFormat::Bgra32, 2, 1).expect("to bgra");
        assert_eq!(bgra, vec![3, 2, 1, 255, 6, 5, 4, 255]);

        let bgr = convert(&bgra, FrameFormat::Bgra32, FrameFormat::Bgr24, 2, 1).expect("to bgr");
        assert_eq!(bgr, vec![3, 2, 1, 6, 5, 4]);
    }

    #[test]
    fn same_format_copies_exact_payload() {
        let src = vec![9u8; 4 * 2 * 2 + 7];
        let out = convert(&src, FrameFormat::Bgra32, FrameFormat::Bgra32, 2, 2).expect("copy");
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            convert(&[0u8; 8], FrameFormat::Bgra32, FrameFormat::I420, 2, 2),
            Err(ConvertError::ShortInput { expected: 16, actual: 8 })
        );
        assert_eq!(
            convert(&[0u8; 8], FrameFormat::Bgra32, FrameFormat::I420, 0, 2),
            Err(ConvertError::ZeroDimensions)
        );
        assert!(matches!(
            convert(&[0u8; 8], FrameFormat::I420, FrameFormat::Bgra32, 2, 2),
            Err(ConvertError::UnsupportedConversion { .. })
        ));
        assert!(matches!(
            convert(&[0u8; 16], FrameFormat::Bgra32, FrameFormat::H264, 2, 2),
            Err(ConvertError::UnsupportedConversion { .. })
        ));
    }
}
