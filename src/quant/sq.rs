//! Affine scalar quantization: f32 to u8 over a fixed global value range.
//!
//! The range is a property of the offline-quantized base collection, not
//! something learned per query; using a different range than the builder did
//! biases every reconstructed distance. The default range [-1, 1] matches
//! unit-norm vector components.

use crate::error::{QuiverError, Result};
use serde::{Deserialize, Serialize};

/// Fixed quantization range with derived scale/offset.
///
/// `scale = 255 / (max - min)`, `offset = -min`. Quantization clamps the
/// scaled value into [0, 255] and truncates toward zero (so 0.0 over the
/// default range maps to byte 127, not 128).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SqParams {
    /// Smallest representable value.
    pub min: f32,
    /// Largest representable value.
    pub max: f32,
}

impl Default for SqParams {
    fn default() -> Self {
        Self {
            min: -1.0,
            max: 1.0,
        }
    }
}

impl SqParams {
    /// Creates a range, rejecting degenerate bounds.
    pub fn new(min: f32, max: f32) -> Result<Self> {
        if !(max > min) {
            return Err(QuiverError::invalid_parameter(format!(
                "quantization range [{min}, {max}] is empty"
            )));
        }
        Ok(Self { min, max })
    }

    /// Scale factor mapping the range onto [0, 255].
    #[inline]
    pub fn scale(&self) -> f32 {
        255.0 / (self.max - self.min)
    }

    /// Offset such that `x = code / scale - offset`.
    #[inline]
    pub fn offset(&self) -> f32 {
        -self.min
    }

    /// Quantizes one value: clamp to the range, then truncate toward zero.
    #[inline]
    pub fn quantize_one(&self, x: f32) -> u8 {
        let normalized = (x - self.min) * self.scale();
        normalized.clamp(0.0, 255.0) as u8
    }

    /// Quantizes a whole vector.
    pub fn quantize(&self, input: &[f32]) -> Vec<u8> {
        input.iter().map(|&x| self.quantize_one(x)).collect()
    }

    /// Reconstructs the value a code represents.
    #[inline]
    pub fn dequantize_one(&self, code: u8) -> f32 {
        code as f32 / self.scale() - self.offset()
    }
}
