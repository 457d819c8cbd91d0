//! SIMD kernel implementations with runtime CPU detection.
//!
//! Supported instruction sets:
//! - **AVX2+FMA** (x86_64): 8 floats or 16 bytes per iteration
//! - **NEON** (aarch64): 8 floats (two 4-lane registers) or 16 bytes per iteration
//! - **Scalar**: fallback for all platforms
//!
//! Reduction order: both float paths keep one partial sum per lane across the
//! main loop and reduce the lanes left-to-right afterwards, then fold in the
//! scalar tail. Results therefore agree between platforms only up to
//! floating-point summation order in the least-significant bits.

#[cfg(target_arch = "x86_64")]
use std::arch::x86_64::*;

#[cfg(target_arch = "aarch64")]
use std::arch::aarch64::*;

use super::{reconstruct_dot, scalar};

// =============================================================================
// AVX2+FMA implementations (x86_64)
// =============================================================================

/// Inner product using AVX2 and FMA intrinsics, 8 floats per iteration.
///
/// # Safety
/// The caller must ensure AVX2 and FMA are available on the running CPU.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2", enable = "fma")]
#[inline]
pub unsafe fn inner_product_avx2(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "vector dimensions must match");

    let len = a.len();
    let mut sum = _mm256_setzero_ps();
    let mut i = 0;

    while i + 8 <= len {
        let va = _mm256_loadu_ps(a.as_ptr().add(i));
        let vb = _mm256_loadu_ps(b.as_ptr().add(i));
        sum = _mm256_fmadd_ps(va, vb, sum);
        i += 8;
    }

    // Lane reduction: lane 0 through lane 7, left to right.
    let sum_array: [f32; 8] = std::mem::transmute(sum);
    let mut total: f32 = sum_array.iter().sum();

    while i < len {
        total += a[i] * b[i];
        i += 1;
    }

    total
}

/// Byte-quantized inner product using AVX2, 16 bytes per iteration.
///
/// Widens to 16-bit lanes for the products and accumulates the per-vector
/// byte sums with `psadbw`, then applies the dequantization identity.
///
/// # Safety
/// The caller must ensure AVX2 is available on the running CPU.
#[cfg(target_arch = "x86_64")]
#[target_feature(enable = "avx2")]
#[inline]
pub unsafe fn quantized_inner_product_avx2(a: &[u8], b: &[u8], scale: f32, offset: f32) -> f32 {
    assert_eq!(a.len(), b.len(), "vector dimensions must match");

    let len = a.len();
    let zero = _mm_setzero_si128();
    let mut acc_dot = _mm256_setzero_si256();
    let mut acc_a = _mm_setzero_si128();
    let mut acc_b = _mm_setzero_si128();
    let mut i = 0;

    while i + 16 <= len {
        let va = _mm_loadu_si128(a.as_ptr().add(i) as *const __m128i);
        let vb = _mm_loadu_si128(b.as_ptr().add(i) as *const __m128i);

        // 16 x u8 -> 16 x u16, then pairwise multiply-add into 8 x i32.
        // Products fit i16 range only after widening, so madd on the
        // widened registers is exact.
        let wa = _mm256_cvtepu8_epi16(va);
        let wb = _mm256_cvtepu8_epi16(vb);
        acc_dot = _mm256_add_epi32(acc_dot, _mm256_madd_epi16(wa, wb));

        // Horizontal byte sums per vector.
        acc_a = _mm_add_epi64(acc_a, _mm_sad_epu8(va, zero));
        acc_b = _mm_add_epi64(acc_b, _mm_sad_epu8(vb, zero));

        i += 16;
    }

    let dot_lanes: [i32; 8] = std::mem::transmute(acc_dot);
    let mut dot: u32 = dot_lanes.iter().map(|&x| x as u32).sum();

    let a_lanes: [u64; 2] = std::mem::transmute(acc_a);
    let b_lanes: [u64; 2] = std::mem::transmute(acc_b);
    let mut sum_a = (a_lanes[0] + a_lanes[1]) as u32;
    let mut sum_b = (b_lanes[0] + b_lanes[1]) as u32;

    while i < len {
        dot += a[i] as u32 * b[i] as u32;
        sum_a += a[i] as u32;
        sum_b += b[i] as u32;
        i += 1;
    }

    reconstruct_dot(dot, sum_a, sum_b, len, scale, offset)
}

// =============================================================================
// NEON implementations (aarch64)
// =============================================================================
// NEON is always available on aarch64, so no runtime detection is needed.

/// Inner product using NEON intrinsics, 8 floats per iteration across two
/// 4-lane registers.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn inner_product_neon(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "vector dimensions must match");

    let len = a.len();
    let mut i = 0;

    let mut sum0 = unsafe { vdupq_n_f32(0.0) };
    let mut sum1 = unsafe { vdupq_n_f32(0.0) };

    while i + 8 <= len {
        unsafe {
            let va0 = vld1q_f32(a.as_ptr().add(i));
            let va1 = vld1q_f32(a.as_ptr().add(i + 4));
            let vb0 = vld1q_f32(b.as_ptr().add(i));
            let vb1 = vld1q_f32(b.as_ptr().add(i + 4));
            sum0 = vfmaq_f32(sum0, va0, vb0);
            sum1 = vfmaq_f32(sum1, va1, vb1);
        }
        i += 8;
    }

    // Lane reduction: low register first, then high, then the tail.
    let mut total = unsafe { vaddvq_f32(sum0) + vaddvq_f32(sum1) };

    while i < len {
        total += a[i] * b[i];
        i += 1;
    }

    total
}

/// Byte-quantized inner product using NEON, 16 bytes per iteration.
#[cfg(target_arch = "aarch64")]
#[inline(always)]
pub fn quantized_inner_product_neon(a: &[u8], b: &[u8], scale: f32, offset: f32) -> f32 {
    assert_eq!(a.len(), b.len(), "vector dimensions must match");

    let len = a.len();
    let mut dot = 0u32;
    let mut sum_a = 0u32;
    let mut sum_b = 0u32;
    let mut i = 0;

    while i + 16 <= len {
        unsafe {
            let va = vld1q_u8(a.as_ptr().add(i));
            let vb = vld1q_u8(b.as_ptr().add(i));

            // Widen to u16 halves before multiplying to avoid overflow.
            let va_low = vmovl_u8(vget_low_u8(va));
            let va_high = vmovl_u8(vget_high_u8(va));
            let vb_low = vmovl_u8(vget_low_u8(vb));
            let vb_high = vmovl_u8(vget_high_u8(vb));

            let mul_ll = vmull_u16(vget_low_u16(va_low), vget_low_u16(vb_low));
            let mul_lh = vmull_u16(vget_high_u16(va_low), vget_high_u16(vb_low));
            let mul_hl = vmull_u16(vget_low_u16(va_high), vget_low_u16(vb_high));
            let mul_hh = vmull_u16(vget_high_u16(va_high), vget_high_u16(vb_high));

            dot += vaddvq_u32(mul_ll) + vaddvq_u32(mul_lh) + vaddvq_u32(mul_hl) + vaddvq_u32(mul_hh);

            sum_a += vaddlvq_u8(va) as u32;
            sum_b += vaddlvq_u8(vb) as u32;
        }
        i += 16;
    }

    while i < len {
        dot += a[i] as u32 * b[i] as u32;
        sum_a += a[i] as u32;
        sum_b += b[i] as u32;
        i += 1;
    }

    reconstruct_dot(dot, sum_a, sum_b, len, scale, offset)
}

// =============================================================================
// Auto-dispatching public API
// =============================================================================

/// Inner product with automatic CPU feature detection.
///
/// Dispatch order: AVX2+FMA (x86_64), NEON (aarch64), scalar fallback.
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            // SAFETY: AVX2 and FMA availability was just verified.
            return unsafe { inner_product_avx2(a, b) };
        }
        return scalar::inner_product(a, b);
    }

    #[cfg(target_arch = "aarch64")]
    {
        return inner_product_neon(a, b);
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    scalar::inner_product(a, b)
}

/// Byte-quantized inner product with automatic CPU feature detection.
///
/// Dispatch order: AVX2 (x86_64), NEON (aarch64), scalar fallback.
#[inline]
pub fn quantized_inner_product(a: &[u8], b: &[u8], scale: f32, offset: f32) -> f32 {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 availability was just verified.
            return unsafe { quantized_inner_product_avx2(a, b, scale, offset) };
        }
        return scalar::quantized_inner_product(a, b, scale, offset);
    }

    #[cfg(target_arch = "aarch64")]
    {
        return quantized_inner_product_neon(a, b, scale, offset);
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    scalar::quantized_inner_product(a, b, scale, offset)
}
