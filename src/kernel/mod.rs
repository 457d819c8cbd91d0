//! Distance kernels: full-precision and byte-quantized inner products.
//!
//! The public functions dispatch to the fastest implementation available at
//! runtime (AVX2+FMA on x86_64, NEON on aarch64, scalar elsewhere). All
//! similarity values are converted to distances by the callers via
//! `distance = 1 - similarity`; the kernels assume pre-normalized inputs and
//! never normalize themselves.

pub mod scalar;
pub mod simd;

pub use simd::{inner_product, quantized_inner_product};

/// Lane width of the full-precision float path.
pub const F32_LANES: usize = 8;

/// Lane width of the byte-quantized integer path.
pub const U8_LANES: usize = 16;

/// Reconstructs an approximate inner product from byte-code aggregate sums.
///
/// With affine quantization `q = (x - min) * scale` (so `x = q/scale - offset`
/// where `offset = -min`), the product of two dequantized values expands to
/// `dot/scale^2 - (offset/scale)(sum_a + sum_b) + d * offset^2`.
#[inline(always)]
pub(crate) fn reconstruct_dot(
    dot: u32,
    sum_a: u32,
    sum_b: u32,
    d: usize,
    scale: f32,
    offset: f32,
) -> f32 {
    let inv_scale_sq = 1.0 / (scale * scale);
    let offset_scale = offset / scale;
    dot as f32 * inv_scale_sq - offset_scale * (sum_a + sum_b) as f32 + d as f32 * offset * offset
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconstruct_identity_on_exact_codes() {
        // scale/offset for range [-1, 1]
        let scale = 255.0 / 2.0;
        let offset = 1.0;

        // codes 0 and 255 dequantize to -1 and 255/127.5 - 1 = 1
        let a = [0u8; 16];
        let b = [255u8; 16];
        let dot: u32 = a.iter().zip(b.iter()).map(|(&x, &y)| x as u32 * y as u32).sum();
        let sa: u32 = a.iter().map(|&x| x as u32).sum();
        let sb: u32 = b.iter().map(|&x| x as u32).sum();

        let approx = reconstruct_dot(dot, sa, sb, 16, scale, offset);
        // true dot of [-1; 16] and [1; 16] is -16
        assert!((approx - (-16.0)).abs() < 1e-3, "got {}", approx);
    }
}
