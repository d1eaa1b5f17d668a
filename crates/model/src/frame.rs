//! Decoded frames and the frame-sequence tensor.

use ndarray::{Array4, ArrayView3, Axis};

use evmag_common::error::{EvmError, EvmResult};

use crate::stream::ColorMode;

/// One decoded 8-bit frame in interleaved, row-major layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub color_mode: ColorMode,
    pub data: Vec<u8>,
}

impl RawFrame {
    /// Wrap a pixel buffer, checking that its length matches the geometry.
    pub fn new(width: u32, height: u32, color_mode: ColorMode, data: Vec<u8>) -> EvmResult<Self> {
        let expected = Self::expected_len(width, height, color_mode);
        if data.len() != expected {
            return Err(EvmError::invalid_parameter(format!(
                "{width}x{height} {color_mode} frame needs {expected} bytes, got {}",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            color_mode,
            data,
        })
    }

    /// A frame where every sample equals `value`.
    pub fn filled(width: u32, height: u32, color_mode: ColorMode, value: u8) -> Self {
        Self {
            width,
            height,
            color_mode,
            data: vec![value; Self::expected_len(width, height, color_mode)],
        }
    }

    /// Byte length of a frame with the given geometry.
    pub fn expected_len(width: u32, height: u32, color_mode: ColorMode) -> usize {
        width as usize * height as usize * color_mode.channels()
    }

    /// Samples of the pixel at (`row`, `col`).
    pub fn pixel(&self, row: usize, col: usize) -> &[u8] {
        let channels = self.color_mode.channels();
        let start = (row * self.width as usize + col) * channels;
        &self.data[start..start + channels]
    }
}

/// Minimum number of frames a forward-backward filter of `order` needs.
pub fn min_frames_for_order(order: usize) -> usize {
    3 * order + 1
}

/// An ordered, non-empty sequence of same-sized frames held as one
/// floating-point tensor indexed `[time, row, column, channel]`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSequence {
    samples: Array4<f32>,
    color_mode: ColorMode,
}

impl FrameSequence {
    /// Wrap a tensor. Fails on zero frames or a channel axis that does not
    /// match `color_mode`.
    pub fn new(samples: Array4<f32>, color_mode: ColorMode) -> EvmResult<Self> {
        if samples.len_of(Axis(0)) == 0 {
            return Err(EvmError::EmptySequence);
        }
        let channels = samples.len_of(Axis(3));
        if channels != color_mode.channels() {
            return Err(EvmError::invalid_parameter(format!(
                "{color_mode} sequence needs {} channels, tensor has {channels}",
                color_mode.channels()
            )));
        }
        Ok(Self {
            samples,
            color_mode,
        })
    }

    /// Build a sequence from a flat buffer of `frames` consecutive frames.
    pub fn from_flat(
        frames: usize,
        height: usize,
        width: usize,
        color_mode: ColorMode,
        data: Vec<f32>,
    ) -> EvmResult<Self> {
        if frames == 0 {
            return Err(EvmError::EmptySequence);
        }
        let shape = (frames, height, width, color_mode.channels());
        let samples = Array4::from_shape_vec(shape, data)
            .map_err(|e| EvmError::invalid_parameter(format!("frame buffer shape: {e}")))?;
        Self::new(samples, color_mode)
    }

    /// Number of frames (T).
    pub fn len(&self) -> usize {
        self.samples.len_of(Axis(0))
    }

    /// Always false; a sequence holds at least one frame.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn height(&self) -> usize {
        self.samples.len_of(Axis(1))
    }

    pub fn width(&self) -> usize {
        self.samples.len_of(Axis(2))
    }

    pub fn channels(&self) -> usize {
        self.samples.len_of(Axis(3))
    }

    /// Per-frame shape `(H, W, C)`.
    pub fn frame_shape(&self) -> (usize, usize, usize) {
        (self.height(), self.width(), self.channels())
    }

    pub fn color_mode(&self) -> ColorMode {
        self.color_mode
    }

    pub fn samples(&self) -> &Array4<f32> {
        &self.samples
    }

    /// View of frame `t`.
    pub fn frame(&self, t: usize) -> ArrayView3<'_, f32> {
        self.samples.index_axis(Axis(0), t)
    }

    /// Fails with `InsufficientFrames` when the sequence is too short for a
    /// forward-backward filter of `order`.
    pub fn require_min_frames(&self, order: usize) -> EvmResult<()> {
        let required = min_frames_for_order(order);
        if self.len() < required {
            return Err(EvmError::InsufficientFrames {
                frames: self.len(),
                required,
                order,
            });
        }
        Ok(())
    }
}
