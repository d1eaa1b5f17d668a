//! Amplification and saturation.
//!
//! `amplified = original + factor * filtered`, then every sample is clipped
//! to the representable 8-bit range. Clipping is intentional saturation: a
//! region that would leave the range is flattened to the nearest bound, never
//! rescaled.

use ndarray::{ArrayView4, ArrayViewMut4, Zip};
use serde::{Deserialize, Serialize};

use evmag_common::error::{EvmError, EvmResult};

/// Smallest representable sample value.
pub const SAMPLE_MIN: f32 = 0.0;

/// Largest representable sample value.
pub const SAMPLE_MAX: f32 = 255.0;

/// Counts of samples flattened by saturation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaturationStats {
    /// Samples processed.
    pub total_samples: u64,
    /// Samples clipped to [`SAMPLE_MIN`].
    pub clipped_low: u64,
    /// Samples clipped to [`SAMPLE_MAX`].
    pub clipped_high: u64,
}

impl SaturationStats {
    pub fn clipped(&self) -> u64 {
        self.clipped_low + self.clipped_high
    }

    /// Fraction of samples that were clipped, in `[0, 1]`.
    pub fn clipped_fraction(&self) -> f64 {
        if self.total_samples == 0 {
            0.0
        } else {
            self.clipped() as f64 / self.total_samples as f64
        }
    }
}

/// Adds the scaled band-passed signal back onto the original.
#[derive(Debug, Clone, Copy)]
pub struct Amplifier {
    factor: f64,
}

impl Amplifier {
    /// Create an amplifier. `factor` must be a positive real.
    pub fn new(factor: f64) -> EvmResult<Self> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(EvmError::invalid_parameter(format!(
                "amplification factor must be a positive real, got {factor}"
            )));
        }
        Ok(Self { factor })
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Amplify and saturate a single sample.
    pub fn amplify_sample(&self, original: f32, filtered: f32) -> f32 {
        saturate(original as f64 + self.factor * filtered as f64)
    }

    /// Overwrite `filtered` with the saturated amplified signal.
    ///
    /// Reusing the filtered tensor keeps the run at two full tensors.
    pub fn apply(
        &self,
        original: ArrayView4<'_, f32>,
        mut filtered: ArrayViewMut4<'_, f32>,
    ) -> EvmResult<SaturationStats> {
        if original.shape() != filtered.shape() {
            return Err(EvmError::invalid_parameter(format!(
                "original {:?} and filtered {:?} tensors differ in shape",
                original.shape(),
                filtered.shape()
            )));
        }

        let mut stats = SaturationStats {
            total_samples: original.len() as u64,
            ..Default::default()
        };

        Zip::from(&mut filtered)
            .and(&original)
            .for_each(|value, &base| {
                let amplified = base as f64 + self.factor * *value as f64;
                if amplified < SAMPLE_MIN as f64 {
                    stats.clipped_low += 1;
                } else if amplified > SAMPLE_MAX as f64 {
                    stats.clipped_high += 1;
                }
                *value = saturate(amplified);
            });

        if stats.clipped() > 0 {
            tracing::debug!(
                clipped_low = stats.clipped_low,
                clipped_high = stats.clipped_high,
                fraction = stats.clipped_fraction(),
                "Amplified samples saturated"
            );
        }

        Ok(stats)
    }
}

/// Clip to `[SAMPLE_MIN, SAMPLE_MAX]`.
pub fn saturate(value: f64) -> f32 {
    value.clamp(SAMPLE_MIN as f64, SAMPLE_MAX as f64) as f32
}

/// Round a processing sample to the nearest 8-bit value.
pub fn quantize(value: f32) -> u8 {
    value.clamp(SAMPLE_MIN, SAMPLE_MAX).round() as u8
}
