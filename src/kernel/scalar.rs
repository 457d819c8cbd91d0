//! Scalar (non-SIMD) kernel implementations.
//! Baselines for correctness tests and fallbacks on other architectures.

use super::reconstruct_dot;

/// Inner product of two float vectors.
///
/// # Panics
/// Panics if the vectors have different lengths.
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    assert_eq!(a.len(), b.len(), "vector dimensions must match");

    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Approximate inner product of two byte-quantized vectors.
///
/// Accumulates the integer aggregates (dot, per-vector sums) exactly as the
/// SIMD paths do, then applies the affine dequantization identity.
///
/// # Panics
/// Panics if the vectors have different lengths.
#[inline]
pub fn quantized_inner_product(a: &[u8], b: &[u8], scale: f32, offset: f32) -> f32 {
    assert_eq!(a.len(), b.len(), "vector dimensions must match");

    let mut dot = 0u32;
    let mut sum_a = 0u32;
    let mut sum_b = 0u32;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x as u32 * y as u32;
        sum_a += x as u32;
        sum_b += y as u32;
    }

    reconstruct_dot(dot, sum_a, sum_b, a.len(), scale, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_product_simple() {
        let a = vec![1.0, 2.0, 3.0, 4.0];
        let b = vec![1.0, 1.0, 1.0, 1.0];
        assert!((inner_product(&a, &b) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_inner_product_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(inner_product(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_quantized_recovers_true_dot() {
        use crate::quant::SqParams;

        let params = SqParams::default();
        let a: Vec<f32> = (0..32).map(|i| ((i % 7) as f32 - 3.0) / 4.0).collect();
        let b: Vec<f32> = (0..32).map(|i| ((i % 5) as f32 - 2.0) / 3.0).collect();

        let qa = params.quantize(&a);
        let qb = params.quantize(&b);

        let approx = quantized_inner_product(&qa, &qb, params.scale(), params.offset());
        let exact = inner_product(&a, &b);

        // per-element quantization error is at most 1/255; the dot over 32
        // elements stays well within a loose absolute bound
        assert!(
            (approx - exact).abs() < 0.5,
            "approx {} vs exact {}",
            approx,
            exact
        );
    }
}
