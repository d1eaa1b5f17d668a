//! Zero-phase temporal filtering of frame sequences.
//!
//! Each (row, column, channel) trace is filtered on its own as a 1D signal:
//! forward, then backward over the reversed output. The two passes cancel
//! each other's phase lag, so the band-passed motion stays aligned with the
//! original frames.
//!
//! Edges are handled by odd reflection about the first and last samples
//! (`2 * x[0] - x[k]`), `min(3 * (2N + 1), T - 1)` samples on each side, and
//! both passes start every section from the cascade's steady state scaled
//! by the first sample they see. The outermost frames still carry more
//! residual transient than interior frames.

use ndarray::{Array4, Axis, Zip};

use evmag_common::error::EvmResult;
use evmag_model::frame::FrameSequence;
use evmag_model::params::FilterSpec;

use crate::butterworth::{ButterworthBandpass, SecondOrderSections};

/// Reflection length used on each side of a trace of `samples` samples.
pub fn pad_len(filter_len: usize, samples: usize) -> usize {
    (3 * filter_len).min(samples.saturating_sub(1))
}

/// Odd extension of `signal` by `pad` samples on both ends.
///
/// `pad` must be smaller than `signal.len()`.
pub fn odd_extend(signal: &[f64], pad: usize, out: &mut Vec<f64>) {
    out.clear();
    let Some((&first, &last)) = signal.first().zip(signal.last()) else {
        return;
    };
    let n = signal.len();
    out.reserve(n + 2 * pad);
    out.extend((1..=pad).rev().map(|i| 2.0 * first - signal[i]));
    out.extend_from_slice(signal);
    out.extend((1..=pad).map(|i| 2.0 * last - signal[n - 1 - i]));
}

/// Forward-backward filtering of one trace through a section cascade.
pub fn filtfilt(sos: &SecondOrderSections, steady_state: &[[f64; 2]], signal: &[f64]) -> Vec<f64> {
    let mut scratch = Vec::new();
    let mut states = Vec::new();
    filtfilt_with(sos, steady_state, signal, &mut scratch, &mut states).to_vec()
}

fn seed_states(steady_state: &[[f64; 2]], first: f64, states: &mut Vec<[f64; 2]>) {
    states.clear();
    states.extend(steady_state.iter().map(|[z0, z1]| [z0 * first, z1 * first]));
}

/// [`filtfilt`] reusing caller-owned buffers; returns a view into `scratch`.
fn filtfilt_with<'a>(
    sos: &SecondOrderSections,
    steady_state: &[[f64; 2]],
    signal: &[f64],
    scratch: &'a mut Vec<f64>,
    states: &mut Vec<[f64; 2]>,
) -> &'a [f64] {
    if signal.is_empty() {
        scratch.clear();
        return scratch;
    }

    let pad = pad_len(sos.filter_len(), signal.len());
    odd_extend(signal, pad, scratch);

    seed_states(steady_state, scratch[0], states);
    sos.lfilter(scratch, states);

    scratch.reverse();
    seed_states(steady_state, scratch[0], states);
    sos.lfilter(scratch, states);
    scratch.reverse();

    &scratch[pad..pad + signal.len()]
}

/// Bandpass filter applied along the time axis of a [`FrameSequence`].
#[derive(Debug, Clone)]
pub struct TemporalFilter {
    bandpass: ButterworthBandpass,
}

impl TemporalFilter {
    /// Design the underlying Butterworth bandpass.
    pub fn new(spec: &FilterSpec) -> EvmResult<Self> {
        Ok(Self {
            bandpass: ButterworthBandpass::design(spec)?,
        })
    }

    pub fn bandpass(&self) -> &ButterworthBandpass {
        &self.bandpass
    }

    /// Filter every pixel trace of `frames`.
    ///
    /// Returns a tensor with exactly the shape of the input. Fails with
    /// `InsufficientFrames` when the sequence is shorter than `3 * order + 1`.
    pub fn apply(&self, frames: &FrameSequence) -> EvmResult<Array4<f32>> {
        frames.require_min_frames(self.bandpass.order())?;

        let input = frames.samples();
        let mut filtered = Array4::<f32>::zeros(input.raw_dim());

        let sos = self.bandpass.sections();
        let steady_state = self.bandpass.steady_state();
        let mut trace = vec![0.0f64; frames.len()];
        let mut scratch = Vec::new();
        let mut states = Vec::new();

        Zip::from(filtered.lanes_mut(Axis(0)))
            .and(input.lanes(Axis(0)))
            .for_each(|mut out, samples| {
                for (dst, &src) in trace.iter_mut().zip(samples.iter()) {
                    *dst = src as f64;
                }
                let result = filtfilt_with(sos, steady_state, &trace, &mut scratch, &mut states);
                for (dst, &value) in out.iter_mut().zip(result.iter()) {
                    *dst = value as f32;
                }
            });

        tracing::debug!(
            frames = frames.len(),
            traces = frames.height() * frames.width() * frames.channels(),
            "Temporal bandpass applied"
        );

        Ok(filtered)
    }
}
