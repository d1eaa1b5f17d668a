//! Filter and amplification parameters.
//!
//! [`MagnificationSettings`] is what a user chooses (band in Hz, gain, order,
//! color path). Once the input frame rate is known it becomes a validated
//! [`AmplificationConfig`], which stays immutable for the rest of the run.

use serde::{Deserialize, Serialize};

use evmag_common::error::{EvmError, EvmResult};

use crate::stream::ColorMode;

/// Butterworth order used when none is given.
pub const DEFAULT_FILTER_ORDER: usize = 2;

/// Highest supported filter order.
pub const MAX_FILTER_ORDER: usize = 8;

/// Temporal bandpass specification.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    /// Lower passband edge (Hz).
    pub low_cutoff_hz: f64,

    /// Upper passband edge (Hz).
    pub high_cutoff_hz: f64,

    /// Temporal sampling rate, i.e. the video frame rate (Hz).
    pub sample_rate_hz: f64,

    /// Butterworth prototype order.
    pub order: usize,
}

impl FilterSpec {
    /// Band with the default order.
    pub fn new(low_cutoff_hz: f64, high_cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        Self {
            low_cutoff_hz,
            high_cutoff_hz,
            sample_rate_hz,
            order: DEFAULT_FILTER_ORDER,
        }
    }

    pub fn with_order(self, order: usize) -> Self {
        Self { order, ..self }
    }

    pub fn nyquist_hz(&self) -> f64 {
        self.sample_rate_hz / 2.0
    }

    /// Cutoffs as fractions of the Nyquist frequency.
    pub fn normalized_band(&self) -> (f64, f64) {
        let nyquist = self.nyquist_hz();
        (self.low_cutoff_hz / nyquist, self.high_cutoff_hz / nyquist)
    }

    /// Check `0 < low < high < nyquist` and the order range.
    pub fn validate(&self) -> EvmResult<()> {
        let nyquist = self.nyquist_hz();
        let band_ok = self.sample_rate_hz.is_finite()
            && self.sample_rate_hz > 0.0
            && self.low_cutoff_hz.is_finite()
            && self.high_cutoff_hz.is_finite()
            && 0.0 < self.low_cutoff_hz
            && self.low_cutoff_hz < self.high_cutoff_hz
            && self.high_cutoff_hz < nyquist;
        if !band_ok {
            return Err(EvmError::InvalidBand {
                low_hz: self.low_cutoff_hz,
                high_hz: self.high_cutoff_hz,
                nyquist_hz: nyquist,
            });
        }

        if !(1..=MAX_FILTER_ORDER).contains(&self.order) {
            return Err(EvmError::invalid_parameter(format!(
                "filter order must be in 1..={MAX_FILTER_ORDER}, got {}",
                self.order
            )));
        }

        Ok(())
    }
}

/// Validated parameters of one magnification run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmplificationConfig {
    /// Gain applied to the band-passed residual. Positive, typically 5 to 60.
    pub factor: f64,

    /// Temporal band to isolate.
    pub filter: FilterSpec,
}

impl AmplificationConfig {
    /// Build and validate.
    pub fn new(factor: f64, filter: FilterSpec) -> EvmResult<Self> {
        let config = Self { factor, filter };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EvmResult<()> {
        if !self.factor.is_finite() || self.factor <= 0.0 {
            return Err(EvmError::invalid_parameter(format!(
                "amplification factor must be a positive real, got {}",
                self.factor
            )));
        }
        self.filter.validate()
    }
}

/// User-facing magnification settings, independent of any particular video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MagnificationSettings {
    pub amplification_factor: f64,
    pub low_cutoff_hz: f64,
    pub high_cutoff_hz: f64,
    pub filter_order: usize,
    pub color_mode: ColorMode,
}

impl Default for MagnificationSettings {
    fn default() -> Self {
        Self {
            amplification_factor: 30.0,
            low_cutoff_hz: 0.4,
            high_cutoff_hz: 1.0,
            filter_order: DEFAULT_FILTER_ORDER,
            color_mode: ColorMode::Rgb,
        }
    }
}

impl MagnificationSettings {
    /// Grayscale path defaults. A single luminance channel tolerates a
    /// stronger gain before artifacts dominate.
    pub fn grayscale_defaults() -> Self {
        Self {
            amplification_factor: 50.0,
            color_mode: ColorMode::Gray,
            ..Self::default()
        }
    }

    /// Bind the settings to a stream's frame rate and validate them.
    pub fn amplification_config(&self, sample_rate_hz: f64) -> EvmResult<AmplificationConfig> {
        let filter = FilterSpec::new(self.low_cutoff_hz, self.high_cutoff_hz, sample_rate_hz)
            .with_order(self.filter_order);
        AmplificationConfig::new(self.amplification_factor, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_reference_band_is_valid_at_30fps() {
        let spec = FilterSpec::new(0.4, 1.0, 30.0);
        assert!(spec.validate().is_ok());
        let (low, high) = spec.normalized_band();
        assert!((low - 0.4 / 15.0).abs() < 1e-12);
        assert!((high - 1.0 / 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_band_orderings_rejected() {
        for (low, high) in [(1.0, 0.4), (0.4, 0.4), (0.0, 1.0), (-0.1, 1.0), (0.4, 15.0), (0.4, 20.0)] {
            let err = FilterSpec::new(low, high, 30.0).validate().unwrap_err();
            assert!(
                matches!(err, EvmError::InvalidBand { .. }),
                "({low}, {high}) gave {err:?}"
            );
        }
    }

    #[test]
    fn test_non_finite_band_rejected() {
        let err = FilterSpec::new(f64::NAN, 1.0, 30.0).validate().unwrap_err();
        assert!(matches!(err, EvmError::InvalidBand { .. }));
        let err = FilterSpec::new(0.4, 1.0, 0.0).validate().unwrap_err();
        assert!(matches!(err, EvmError::InvalidBand { .. }));
    }

    #[test]
    fn test_order_range() {
        let spec = FilterSpec::new(0.4, 1.0, 30.0);
        assert_eq!(spec.with_order(0).validate().unwrap_err().kind(), "invalid_parameter");
        assert_eq!(spec.with_order(9).validate().unwrap_err().kind(), "invalid_parameter");
        assert!(spec.with_order(MAX_FILTER_ORDER).validate().is_ok());
    }

    #[test]
    fn test_factor_must_be_positive() {
        let spec = FilterSpec::new(0.4, 1.0, 30.0);
        for factor in [0.0, -5.0, f64::INFINITY, f64::NAN] {
            let err = AmplificationConfig::new(factor, spec).unwrap_err();
            assert_eq!(err.kind(), "invalid_parameter");
        }
        assert!(AmplificationConfig::new(30.0, spec).is_ok());
    }

    #[test]
    fn test_settings_bind_to_frame_rate() {
        let settings = MagnificationSettings::default();
        let config = settings.amplification_config(30.0).unwrap();
        assert_eq!(config.factor, 30.0);
        assert_eq!(config.filter.order, 2);
        assert_eq!(config.filter.sample_rate_hz, 30.0);

        // The reference band does not fit under the Nyquist limit of a 1.5 fps clip.
        let err = settings.amplification_config(1.5).unwrap_err();
        assert!(matches!(err, EvmError::InvalidBand { .. }));
    }

    #[test]
    fn test_grayscale_defaults() {
        let settings = MagnificationSettings::grayscale_defaults();
        assert_eq!(settings.color_mode, ColorMode::Gray);
        assert_eq!(settings.amplification_factor, 50.0);
        assert_eq!(settings.low_cutoff_hz, 0.4);
    }

    proptest! {
        #[test]
        fn prop_band_valid_iff_strictly_ordered_below_nyquist(
            low in -5.0f64..20.0,
            high in -5.0f64..20.0,
            fs in 1.0f64..60.0,
        ) {
            let spec = FilterSpec::new(low, high, fs);
            let expected = 0.0 < low && low < high && high < fs / 2.0;
            prop_assert_eq!(spec.validate().is_ok(), expected);
        }
    }
}
