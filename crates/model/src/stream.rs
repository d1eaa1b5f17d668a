//! Video stream properties.
//!
//! Derived once from the input stream and reused unchanged for the output,
//! so output geometry and frame rate always match the input.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use evmag_common::error::{EvmError, EvmResult};

/// Color representation used for processing and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    /// Three interleaved channels, R then G then B.
    #[default]
    Rgb,
    /// Single luminance channel.
    Gray,
}

impl ColorMode {
    /// Samples per pixel.
    pub fn channels(self) -> usize {
        match self {
            Self::Rgb => 3,
            Self::Gray => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Gray => "gray",
        }
    }
}

impl fmt::Display for ColorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rational frame rate as reported by the container (`num / den` frames per second).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    /// Create a frame rate, reducing the fraction.
    pub fn new(num: u32, den: u32) -> EvmResult<Self> {
        if num == 0 || den == 0 {
            return Err(EvmError::invalid_parameter(format!(
                "frame rate must be positive, got {num}/{den}"
            )));
        }
        let g = gcd(num, den);
        Ok(Self {
            num: num / g,
            den: den / g,
        })
    }

    /// Whole frames per second.
    pub fn from_integer(fps: u32) -> EvmResult<Self> {
        Self::new(fps, 1)
    }

    /// Frames per second as a real number (the filter's sampling rate).
    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.den == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.den)
        }
    }
}

impl FromStr for FrameRate {
    type Err = EvmError;

    /// Accepts `"30"`, `"30000/1001"` and decimal forms such as `"29.97"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = || EvmError::invalid_parameter(format!("invalid frame rate: {s:?}"));

        if let Some((num, den)) = s.split_once('/') {
            let num = num.trim().parse::<u32>().map_err(|_| invalid())?;
            let den = den.trim().parse::<u32>().map_err(|_| invalid())?;
            return Self::new(num, den);
        }

        if let Ok(whole) = s.parse::<u32>() {
            return Self::from_integer(whole);
        }

        let fps = s.parse::<f64>().map_err(|_| invalid())?;
        if !fps.is_finite() || fps <= 0.0 || fps > u32::MAX as f64 / 1000.0 {
            return Err(invalid());
        }
        Self::new((fps * 1000.0).round() as u32, 1000)
    }
}

fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Properties of a video stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStreamProperties {
    /// Frame width in pixels.
    pub width: u32,

    /// Frame height in pixels.
    pub height: u32,

    /// Container frame rate.
    pub frame_rate: FrameRate,

    /// Color representation of the frames.
    pub color_mode: ColorMode,
}

impl VideoStreamProperties {
    pub fn new(width: u32, height: u32, frame_rate: FrameRate, color_mode: ColorMode) -> Self {
        Self {
            width,
            height,
            frame_rate,
            color_mode,
        }
    }

    /// Same geometry and frame rate with a different color mode.
    pub fn with_color_mode(self, color_mode: ColorMode) -> Self {
        Self { color_mode, ..self }
    }

    /// Samples (bytes for 8-bit frames) in one frame.
    pub fn frame_samples(&self) -> usize {
        self.width as usize * self.height as usize * self.color_mode.channels()
    }

    /// Nyquist frequency of the temporal sampling, in Hz.
    pub fn nyquist_hz(&self) -> f64 {
        self.frame_rate.as_f64() / 2.0
    }

    /// Bytes held by the original and filtered `f32` tensors for `frames` frames.
    pub fn working_set_bytes(&self, frames: usize) -> u64 {
        let per_tensor = self.frame_samples() as u64 * frames as u64 * std::mem::size_of::<f32>() as u64;
        per_tensor.saturating_mul(2)
    }
}
