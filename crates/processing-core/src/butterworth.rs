//! Digital Butterworth bandpass design.
//!
//! The filter is built the classic way: an analog lowpass prototype of
//! order N, transformed to a bandpass around the pre-warped band edges, then
//! mapped to the z-plane with the bilinear transform.
//!
//! The poles are never multiplied out into one polynomial of length
//! `2N + 1`. Narrow bands put them close together near `z = 1`, where the
//! expanded form loses enough precision to turn unstable. Instead each
//! conjugate pole pair becomes one second-order section, and the N sections
//! run in cascade.

use std::f64::consts::PI;

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use evmag_common::error::{EvmError, EvmResult};
use evmag_model::params::FilterSpec;

/// Sampling rate of the normalized design domain (Nyquist = 1).
const DESIGN_FS: f64 = 2.0;

/// Prototype poles with a smaller imaginary part are treated as real.
const REAL_POLE_EPS: f64 = 1e-12;

/// One second-order section
/// `(b0 + b1 z^-1 + b2 z^-2) / (1 + a1 z^-1 + a2 z^-2)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Biquad {
    /// Numerator (feed-forward) coefficients.
    pub b: [f64; 3],
    /// Denominator (feedback) coefficients, `a[0] == 1`.
    pub a: [f64; 3],
}

impl Biquad {
    /// Bandpass section with zeros at `z = 1` and `z = -1` and the given
    /// pole pair, which must be real or complex conjugates.
    fn bandpass(gain: f64, p1: Complex64, p2: Complex64) -> Self {
        Self {
            b: [gain, 0.0, -gain],
            a: [1.0, -(p1 + p2).re, (p1 * p2).re],
        }
    }

    /// Both poles strictly inside the unit circle.
    pub fn is_stable(&self) -> bool {
        let [_, a1, a2] = self.a;
        a2.abs() < 1.0 && a1.abs() < 1.0 + a2
    }

    /// Gain at zero frequency.
    pub fn dc_gain(&self) -> f64 {
        self.b.iter().sum::<f64>() / self.a.iter().sum::<f64>()
    }

    /// Run the section over `signal` in place (transposed direct form II),
    /// starting from and updating `state`.
    pub fn lfilter(&self, signal: &mut [f64], state: &mut [f64; 2]) {
        let [b0, b1, b2] = self.b;
        let [_, a1, a2] = self.a;
        for sample in signal.iter_mut() {
            let input = *sample;
            let output = b0 * input + state[0];
            state[0] = b1 * input + state[1] - a1 * output;
            state[1] = b2 * input - a2 * output;
            *sample = output;
        }
    }

    /// Section state reached after an infinitely long unit-step input.
    pub fn steady_state(&self) -> [f64; 2] {
        let gain = self.dc_gain();
        let z1 = self.b[2] - self.a[2] * gain;
        let z0 = self.b[1] - self.a[1] * gain + z1;
        [z0, z1]
    }

    /// Complex response at `omega` radians per sample.
    fn response(&self, omega: f64) -> Complex64 {
        let eval = |coeffs: &[f64; 3]| {
            coeffs
                .iter()
                .enumerate()
                .fold(Complex64::new(0.0, 0.0), |acc, (k, c)| {
                    acc + Complex64::from_polar(*c, -omega * k as f64)
                })
        };
        eval(&self.b) / eval(&self.a)
    }
}

/// A cascade of [`Biquad`] sections applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecondOrderSections {
    pub sections: Vec<Biquad>,
}

impl SecondOrderSections {
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Coefficient count of the equivalent single transfer function.
    pub fn filter_len(&self) -> usize {
        2 * self.sections.len() + 1
    }

    /// Run the cascade over `signal` in place. `states` holds one entry per
    /// section.
    pub fn lfilter(&self, signal: &mut [f64], states: &mut [[f64; 2]]) {
        for (section, state) in self.sections.iter().zip(states.iter_mut()) {
            section.lfilter(signal, state);
        }
    }

    /// Cascade state reached after an infinitely long unit-step input.
    ///
    /// Each section sees the step scaled by the DC gain of the sections
    /// before it. Scaling the result by the first sample starts the filter as
    /// if the signal had always held that value, which suppresses the
    /// start-up transient.
    pub fn steady_state(&self) -> Vec<[f64; 2]> {
        let mut scale = 1.0;
        self.sections
            .iter()
            .map(|section| {
                let [z0, z1] = section.steady_state();
                let state = [scale * z0, scale * z1];
                scale *= section.dc_gain();
                state
            })
            .collect()
    }

    /// Magnitude response at `freq_hz` for a filter sampled at `sample_rate_hz`.
    pub fn magnitude_at(&self, freq_hz: f64, sample_rate_hz: f64) -> f64 {
        let omega = 2.0 * PI * freq_hz / sample_rate_hz;
        self.sections
            .iter()
            .map(|s| s.response(omega).norm())
            .product()
    }
}

/// A designed Butterworth bandpass filter.
#[derive(Debug, Clone)]
pub struct ButterworthBandpass {
    spec: FilterSpec,
    sos: SecondOrderSections,
    steady_state: Vec<[f64; 2]>,
}

impl ButterworthBandpass {
    /// Design the filter. Fails with `InvalidBand` unless
    /// `0 < low < high < nyquist`.
    pub fn design(spec: &FilterSpec) -> EvmResult<Self> {
        spec.validate()?;

        let order = spec.order;
        let (low, high) = spec.normalized_band();

        // Pre-warp the band edges so the bilinear transform lands them exactly.
        let warped_low = 2.0 * DESIGN_FS * (PI * low / DESIGN_FS).tan();
        let warped_high = 2.0 * DESIGN_FS * (PI * high / DESIGN_FS).tan();
        let bandwidth = warped_high - warped_low;
        let center = (warped_low * warped_high).sqrt();

        // Lowpass -> bandpass: every prototype pole splits into a pair.
        let split = |pole: Complex64| {
            let scaled = pole * (bandwidth / 2.0);
            let offset = (scaled * scaled - center * center).sqrt();
            (scaled + offset, scaled - offset)
        };

        // Bilinear transform. The N analog zeros at s = 0 map to z = 1 and the
        // N zeros at infinity map to z = -1.
        let fs2 = Complex64::new(2.0 * DESIGN_FS, 0.0);
        let bilinear = |p: Complex64| (fs2 + p) / (fs2 - p);

        let analog_poles: Vec<Complex64> = prototype_poles(order)
            .into_iter()
            .flat_map(|p| {
                let (s1, s2) = split(p);
                [s1, s2]
            })
            .collect();
        let pole_product = analog_poles
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, p| acc * (fs2 - p));
        let digital_gain =
            bandwidth.powi(order as i32) * (fs2.re.powi(order as i32) / pole_product).re;

        // Spread the gain evenly so no section runs at an extreme scale.
        let section_gain = digital_gain.abs().powf(1.0 / order as f64);
        let mut sections = Vec::with_capacity(order);
        for pole in prototype_poles(order) {
            let (s1, s2) = split(pole);
            if pole.im > REAL_POLE_EPS {
                // The conjugate prototype pole contributes the conjugates.
                for s in [s1, s2] {
                    let z = bilinear(s);
                    sections.push(Biquad::bandpass(section_gain, z, z.conj()));
                }
            } else if pole.im.abs() <= REAL_POLE_EPS {
                sections.push(Biquad::bandpass(section_gain, bilinear(s1), bilinear(s2)));
            }
        }
        if let Some(first) = sections.first_mut() {
            let sign = digital_gain.signum();
            first.b.iter_mut().for_each(|c| *c *= sign);
        }

        if let Some((index, section)) =
            sections.iter().enumerate().find(|(_, s)| !s.is_stable())
        {
            return Err(EvmError::invalid_parameter(format!(
                "designed filter is unstable (section {index}, a = {:?})",
                section.a
            )));
        }

        let sos = SecondOrderSections { sections };
        let steady_state = sos.steady_state();

        tracing::debug!(
            order,
            low_hz = spec.low_cutoff_hz,
            high_hz = spec.high_cutoff_hz,
            sample_rate_hz = spec.sample_rate_hz,
            sections = ?sos.sections,
            "Designed Butterworth bandpass"
        );

        Ok(Self {
            spec: *spec,
            sos,
            steady_state,
        })
    }

    pub fn order(&self) -> usize {
        self.spec.order
    }

    pub fn sections(&self) -> &SecondOrderSections {
        &self.sos
    }

    /// Unit-step steady state, see [`SecondOrderSections::steady_state`].
    pub fn steady_state(&self) -> &[[f64; 2]] {
        &self.steady_state
    }

    /// Magnitude of a single (causal) pass at `freq_hz`.
    pub fn magnitude_at(&self, freq_hz: f64) -> f64 {
        self.sos.magnitude_at(freq_hz, self.spec.sample_rate_hz)
    }
}

/// Poles of the normalized analog Butterworth lowpass of the given order.
fn prototype_poles(order: usize) -> Vec<Complex64> {
    let n = order as f64;
    (0..order)
        .map(|k| {
            let m = 2.0 * k as f64 - (n - 1.0);
            -Complex64::from_polar(1.0, PI * m / (2.0 * n))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use evmag_model::params::MAX_FILTER_ORDER;

    fn reference_filter() -> ButterworthBandpass {
        ButterworthBandpass::design(&FilterSpec::new(0.4, 1.0, 30.0)).unwrap()
    }

    /// Frequency the bilinear transform maps the analog band center to.
    fn digital_center(low: f64, high: f64, fs: f64) -> f64 {
        let warp = |f: f64| (PI * f / fs).tan();
        fs / PI * (warp(low) * warp(high)).sqrt().atan()
    }

    #[test]
    fn test_one_section_per_order() {
        for order in 1..=MAX_FILTER_ORDER {
            let spec = FilterSpec::new(0.4, 1.0, 30.0).with_order(order);
            let filter = ButterworthBandpass::design(&spec).unwrap();
            assert_eq!(filter.sections().len(), order);
            assert_eq!(filter.sections().filter_len(), 2 * order + 1);
            assert_eq!(filter.steady_state().len(), order);
        }
    }

    #[test]
    fn test_section_shape() {
        for section in &reference_filter().sections().sections {
            // (1 - z^-2) scaled by the section gain.
            let g = section.b[0];
            assert!(g > 0.0);
            assert_eq!(section.b[1], 0.0);
            assert_eq!(section.b[2], -g);
            assert_eq!(section.a[0], 1.0);
            assert!(section.is_stable());
        }
    }

    #[test]
    fn test_blocks_dc_and_nyquist() {
        let filter = reference_filter();
        assert!(filter.magnitude_at(0.0) < 1e-9);
        assert!(filter.magnitude_at(15.0) < 1e-9);
    }

    #[test]
    fn test_unity_gain_at_band_center() {
        let filter = reference_filter();
        let center = (0.4f64 * 1.0).sqrt();
        assert!((filter.magnitude_at(center) - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_half_power_at_band_edges() {
        let filter = reference_filter();
        let half_power = std::f64::consts::FRAC_1_SQRT_2;
        assert!((filter.magnitude_at(0.4) - half_power).abs() < 1e-3);
        assert!((filter.magnitude_at(1.0) - half_power).abs() < 1e-3);
    }

    #[test]
    fn test_passband_gain_holds_across_orders_and_rates() {
        for fps in [30.0, 60.0, 120.0, 240.0] {
            for (low, high) in [(0.4, 1.0), (0.1, 0.2)] {
                let center = digital_center(low, high, fps);
                for order in 1..=MAX_FILTER_ORDER {
                    let spec = FilterSpec::new(low, high, fps).with_order(order);
                    let filter = ButterworthBandpass::design(&spec).unwrap();
                    let gain = filter.magnitude_at(center);
                    assert!(
                        (gain - 1.0).abs() < 1e-6,
                        "fps={fps} band={low}-{high} order={order} gain={gain}"
                    );
                    let half_power = std::f64::consts::FRAC_1_SQRT_2;
                    assert!((filter.magnitude_at(low) - half_power).abs() < 1e-6);
                    assert!((filter.magnitude_at(high) - half_power).abs() < 1e-6);
                }
            }
        }
    }

    #[test]
    fn test_steady_state_holds_constant_input() {
        let filter = reference_filter();
        let mut states: Vec<[f64; 2]> = filter
            .steady_state()
            .iter()
            .map(|[z0, z1]| [z0 * 128.0, z1 * 128.0])
            .collect();
        let mut signal = vec![128.0; 50];
        filter.sections().lfilter(&mut signal, &mut states);
        // Zero DC gain: a constant input in steady state produces no output.
        for y in signal {
            assert!(y.abs() < 1e-9, "output {y}");
        }
    }

    #[test]
    fn test_single_section_steady_state() {
        let section = Biquad {
            b: [0.5, 0.2, 0.1],
            a: [1.0, -0.5, 0.25],
        };
        let mut state = section.steady_state();
        let mut signal = vec![1.0; 20];
        section.lfilter(&mut signal, &mut state);
        let gain = section.dc_gain();
        assert!((gain - 0.8 / 0.75).abs() < 1e-12);
        assert!(signal.iter().all(|y| (y - gain).abs() < 1e-12));
    }

    #[test]
    fn test_stability_check() {
        let stable = Biquad {
            b: [1.0, 0.0, -1.0],
            a: [1.0, -1.9, 0.95],
        };
        assert!(stable.is_stable());
        let on_circle = Biquad {
            a: [1.0, -2.0, 1.0],
            ..stable
        };
        assert!(!on_circle.is_stable());
        let outside = Biquad {
            a: [1.0, 0.0, 1.2],
            ..stable
        };
        assert!(!outside.is_stable());
    }

    #[test]
    fn test_invalid_band_rejected_before_design() {
        let err = ButterworthBandpass::design(&FilterSpec::new(1.0, 0.4, 30.0)).unwrap_err();
        assert!(matches!(err, EvmError::InvalidBand { .. }));
        let err = ButterworthBandpass::design(&FilterSpec::new(0.4, 16.0, 30.0)).unwrap_err();
        assert!(matches!(err, EvmError::InvalidBand { .. }));
    }

    #[test]
    fn test_higher_order_is_sharper() {
        let spec = FilterSpec::new(0.4, 1.0, 30.0);
        let low_order = ButterworthBandpass::design(&spec.with_order(1)).unwrap();
        let high_order = ButterworthBandpass::design(&spec.with_order(4)).unwrap();
        assert!(high_order.magnitude_at(3.0) < low_order.magnitude_at(3.0));
    }

    #[test]
    fn test_wide_band_odd_order_uses_real_poles() {
        // Wide enough that the real prototype pole splits into two real poles.
        let spec = FilterSpec::new(0.1, 10.0, 30.0).with_order(3);
        let filter = ButterworthBandpass::design(&spec).unwrap();
        assert_eq!(filter.sections().len(), 3);
        let center = digital_center(0.1, 10.0, 30.0);
        assert!((filter.magnitude_at(center) - 1.0).abs() < 1e-6);
    }
}
