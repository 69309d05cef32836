//! Resampling kernels for packed pixel buffers.
//!
//! Both kernels interpolate every byte of a `bpp`-byte pixel independently,
//! so channel order does not matter.

/// Output dimensions for scaling `input` toward `target`.
///
/// Without aspect preservation the target is returned as-is. Otherwise the
/// image is fit inside the target box (width-bound when the input is wider
/// than the target, height-bound otherwise) and each side is rounded up to
/// the next even number.
pub fn target_dimensions(
    input_width: u32,
    input_height: u32,
    target_width: u32,
    target_height: u32,
    maintain_aspect_ratio: bool,
) -> (u32, u32) {
    if !maintain_aspect_ratio || input_width == 0 || input_height == 0 || target_height == 0 {
        return (target_width, target_height);
    }

    let input_aspect = input_width as f32 / input_height as f32;
    let target_aspect = target_width as f32 / target_height as f32;

    let (width, height) = if input_aspect > target_aspect {
        (target_width, (target_width as f32 / input_aspect) as u32)
    } else {
        ((target_height as f32 * input_aspect) as u32, target_height)
    };

    (round_up_even(width).max(2), round_up_even(height).max(2))
}

fn round_up_even(v: u32) -> u32 {
    v.saturating_add(1) & !1
}

/// Bilinear resample of a tightly packed `src_w x src_h` image.
///
/// Neighbour indices clamp to the last row/column, so edge pixels never read
/// past the source.
pub fn bilinear(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, bpp: usize) -> Vec<u8> {
    let (sw, sh, dw, dh) = (src_w as usize, src_h as usize, dst_w as usize, dst_h as usize);
    let mut out = vec![0u8; dw * dh * bpp];
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
        return out;
    }

    let x_ratio = src_w as f32 / dst_w as f32;
    let y_ratio = src_h as f32 / dst_h as f32;

    for (y, row) in out.chunks_exact_mut(dw * bpp).enumerate() {
        let src_y = y as f32 * y_ratio;
        let y1 = (src_y as usize).min(sh - 1);
        let y2 = (y1 + 1).min(sh - 1);
        let dy = src_y - y1 as f32;

        for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
            let src_x = x as f32 * x_ratio;
            let x1 = (src_x as usize).min(sw - 1);
            let x2 = (x1 + 1).min(sw - 1);
            let dx = src_x - x1 as f32;

            let tl = (y1 * sw + x1) * bpp;
            let tr = (y1 * sw + x2) * bpp;
            let bl = (y2 * sw + x1) * bpp;
            let br = (y2 * sw + x2) * bpp;

            for (c, out) in px.iter_mut().enumerate() {
                let (p_tl, p_tr) = (src[tl + c] as f32, src[tr + c] as f32);
                let (p_bl, p_br) = (src[bl + c] as f32, src[br + c] as f32);
                let top = p_tl + dx * (p_tr - p_tl);
                let bottom = p_bl + dx * (p_br - p_bl);
                *out = (top + dy * (bottom - top)).clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Nearest-neighbour resample; the cheap alternative to [`bilinear`].
pub fn nearest(src: &[u8], src_w: u32, src_h: u32, dst_w: u32, dst_h: u32, bpp: usize) -> Vec<u8> {
    let (sw, sh, dw, dh) = (src_w as usize, src_h as usize, dst_w as usize, dst_h as usize);
    let mut out = vec![0u8; dw * dh * bpp];
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
        return out;
    }

    for (y, row) in out.chunks_exact_mut(dw * bpp).enumerate() {
        let sy = (y * sh / dh).min(sh - 1);
        for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
            let sx = (x * sw / dw).min(sw - 1);
            let at = (sy * sw + sx) * bpp;
            px.copy_from_slice(&src[at..at + bpp]);
        }
    }
    out
}
