//! Conversion between 8-bit frames and processing tensors.
//!
//! The same conversion is used on ingestion and reconstruction so the round
//! trip is well defined: `from_processing(to_processing(frame)) == frame` for
//! every frame already in the colorspace's storage representation.

use ndarray::{Array3, ArrayView3, Axis};

use evmag_common::error::{EvmError, EvmResult};
use evmag_model::frame::RawFrame;
use evmag_model::stream::ColorMode;

use crate::amplify::quantize;

/// A processing colorspace.
pub trait Colorspace: Send + Sync {
    /// Color mode of the tensors this colorspace produces.
    fn mode(&self) -> ColorMode;

    /// Convert a decoded frame into an `(H, W, C)` float tensor.
    fn to_processing(&self, frame: &RawFrame) -> EvmResult<Array3<f32>>;

    /// Quantize an `(H, W, C)` tensor back into a storable frame.
    fn from_processing(&self, frame: ArrayView3<'_, f32>) -> EvmResult<RawFrame>;
}

/// Full RGB processing: three channels, no mixing.
#[derive(Debug, Clone, Copy, Default)]
pub struct RgbColorspace;

/// Single-channel luminance processing.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayColorspace;

/// Colorspace handling frames of `mode`.
pub fn colorspace_for(mode: ColorMode) -> &'static dyn Colorspace {
    match mode {
        ColorMode::Rgb => &RgbColorspace,
        ColorMode::Gray => &GrayColorspace,
    }
}

/// ITU-R BT.601 luminance in 14-bit fixed point, rounded to nearest.
///
/// The weights sum to exactly `1 << 14`, so gray pixels (`r == g == b`)
/// map to themselves.
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    const R_WEIGHT: u32 = 4899;
    const G_WEIGHT: u32 = 9617;
    const B_WEIGHT: u32 = 1868;
    const SHIFT: u32 = 14;
    let y = R_WEIGHT * r as u32 + G_WEIGHT * g as u32 + B_WEIGHT * b as u32 + (1 << (SHIFT - 1));
    (y >> SHIFT) as u8
}

impl Colorspace for RgbColorspace {
    fn mode(&self) -> ColorMode {
        ColorMode::Rgb
    }

    fn to_processing(&self, frame: &RawFrame) -> EvmResult<Array3<f32>> {
        let (h, w) = (frame.height as usize, frame.width as usize);
        let samples: Vec<f32> = match frame.color_mode {
            ColorMode::Rgb => frame.data.iter().map(|&v| v as f32).collect(),
            ColorMode::Gray => frame
                .data
                .iter()
                .flat_map(|&v| [v as f32; 3])
                .collect(),
        };
        shape_frame(h, w, 3, samples)
    }

    fn from_processing(&self, frame: ArrayView3<'_, f32>) -> EvmResult<RawFrame> {
        quantize_frame(frame, ColorMode::Rgb)
    }
}

impl Colorspace for GrayColorspace {
    fn mode(&self) -> ColorMode {
        ColorMode::Gray
    }

    fn to_processing(&self, frame: &RawFrame) -> EvmResult<Array3<f32>> {
        let (h, w) = (frame.height as usize, frame.width as usize);
        let samples: Vec<f32> = match frame.color_mode {
            ColorMode::Gray => frame.data.iter().map(|&v| v as f32).collect(),
            ColorMode::Rgb => frame
                .data
                .chunks_exact(3)
                .map(|px| luma(px[0], px[1], px[2]) as f32)
                .collect(),
        };
        shape_frame(h, w, 1, samples)
    }

    fn from_processing(&self, frame: ArrayView3<'_, f32>) -> EvmResult<RawFrame> {
        quantize_frame(frame, ColorMode::Gray)
    }
}

fn shape_frame(h: usize, w: usize, channels: usize, samples: Vec<f32>) -> EvmResult<Array3<f32>> {
    Array3::from_shape_vec((h, w, channels), samples)
        .map_err(|e| EvmError::invalid_parameter(format!("frame does not match {h}x{w}: {e}")))
}

fn quantize_frame(frame: ArrayView3<'_, f32>, mode: ColorMode) -> EvmResult<RawFrame> {
    let channels = frame.len_of(Axis(2));
    if channels != mode.channels() {
        return Err(EvmError::invalid_parameter(format!(
            "{mode} frame needs {} channels, tensor has {channels}",
            mode.channels()
        )));
    }
    let (h, w) = (frame.len_of(Axis(0)), frame.len_of(Axis(1)));
    // Logical (row, column, channel) order regardless of memory layout.
    let data: Vec<u8> = frame.iter().map(|&v| quantize(v)).collect();
    RawFrame::new(w as u32, h as u32, mode, data)
}
