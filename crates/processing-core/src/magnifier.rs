//! In-memory Eulerian magnification of a frame sequence.

use ndarray::{Array4, ArrayView3, Axis};

use evmag_common::error::EvmResult;
use evmag_model::frame::{FrameSequence, RawFrame};
use evmag_model::params::AmplificationConfig;
use evmag_model::stream::ColorMode;

use crate::amplify::{Amplifier, SaturationStats};
use crate::colorspace::colorspace_for;
use crate::temporal::TemporalFilter;

/// Filter + amplify engine for one validated configuration.
#[derive(Debug, Clone)]
pub struct Magnifier {
    filter: TemporalFilter,
    amplifier: Amplifier,
}

/// Amplified, saturated sequence ready to be quantized and written.
#[derive(Debug, Clone)]
pub struct MagnifiedSequence {
    samples: Array4<f32>,
    color_mode: ColorMode,
    stats: SaturationStats,
}

impl Magnifier {
    /// Validate the configuration and design the filter.
    pub fn new(config: AmplificationConfig) -> EvmResult<Self> {
        config.validate()?;
        Ok(Self {
            filter: TemporalFilter::new(&config.filter)?,
            amplifier: Amplifier::new(config.factor)?,
        })
    }

    pub fn temporal_filter(&self) -> &TemporalFilter {
        &self.filter
    }

    /// Band-pass every pixel trace of `frames`.
    pub fn filter(&self, frames: &FrameSequence) -> EvmResult<Array4<f32>> {
        self.filter.apply(frames)
    }

    /// Combine `frames` with its band-passed residual, consuming both.
    pub fn amplify(
        &self,
        frames: FrameSequence,
        mut filtered: Array4<f32>,
    ) -> EvmResult<MagnifiedSequence> {
        let stats = self
            .amplifier
            .apply(frames.samples().view(), filtered.view_mut())?;
        Ok(MagnifiedSequence {
            samples: filtered,
            color_mode: frames.color_mode(),
            stats,
        })
    }

    /// Filter and amplify in one step.
    pub fn magnify(&self, frames: FrameSequence) -> EvmResult<MagnifiedSequence> {
        let filtered = self.filter(&frames)?;
        self.amplify(frames, filtered)
    }
}

impl MagnifiedSequence {
    /// Number of frames; always equals the input frame count.
    pub fn len(&self) -> usize {
        self.samples.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> &SaturationStats {
        &self.stats
    }

    pub fn samples(&self) -> &Array4<f32> {
        &self.samples
    }

    pub fn frame(&self, t: usize) -> ArrayView3<'_, f32> {
        self.samples.index_axis(Axis(0), t)
    }

    /// Quantize frame `t` into the storage representation.
    pub fn quantized_frame(&self, t: usize) -> EvmResult<RawFrame> {
        colorspace_for(self.color_mode).from_processing(self.frame(t))
    }

    /// Quantized frames in input order.
    pub fn frames(&self) -> impl Iterator<Item = EvmResult<RawFrame>> + '_ {
        (0..self.len()).map(|t| self.quantized_frame(t))
    }
}
