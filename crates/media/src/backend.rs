//! Media backend abstraction.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use evmag_common::error::{EvmError, EvmResult};
use evmag_model::frame::RawFrame;
use evmag_model::stream::VideoStreamProperties;

/// Sequential frame reader.
pub trait VideoSource: Send {
    /// Geometry and frame rate of the stream being decoded.
    fn properties(&self) -> VideoStreamProperties;

    /// Next frame in presentation order, `None` at end of stream.
    fn next_frame(&mut self) -> EvmResult<Option<RawFrame>>;
}

/// Sequential frame writer.
///
/// Nothing becomes visible at the destination path until [`VideoSink::finish`]
/// succeeds. Dropping an unfinished sink discards everything written so far.
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &RawFrame) -> EvmResult<()>;

    /// Flush, close, and publish the output. Returns the final path.
    fn finish(self: Box<Self>) -> EvmResult<PathBuf>;
}

/// Trait for media backends (ffmpeg subprocesses, in-memory, etc.).
pub trait MediaBackend: Send {
    /// Open a video for decoding. Frames are delivered as RGB.
    fn open_source(&self, path: &Path) -> EvmResult<Box<dyn VideoSource>>;

    /// Reject an output that a sink could never be created for. Runs before
    /// any frame is decoded and leaves nothing behind.
    fn check_sink(&self, path: &Path, options: &SinkOptions) -> EvmResult<()>;

    /// Create a writer for `path`.
    fn create_sink(&self, path: &Path, options: &SinkOptions) -> EvmResult<Box<dyn VideoSink>>;

    /// Check if this backend is usable on the system.
    fn is_available(&self) -> bool;

    /// Backend name.
    fn name(&self) -> &str;
}

/// Output stream parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkOptions {
    /// Geometry, frame rate, and color mode of the frames to be written.
    pub properties: VideoStreamProperties,

    pub codec: VideoCodec,
}

/// Supported output encoders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// MPEG-4 Part 2 (`mp4v`).
    #[default]
    Mpeg4,
    /// H.264 through libx264.
    Libx264,
}

impl VideoCodec {
    /// ffmpeg encoder name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mpeg4 => "mpeg4",
            Self::Libx264 => "libx264",
        }
    }

    /// Pixel format of the encoded stream for a `width` x `height` picture.
    ///
    /// libx264 refuses 4:2:0 chroma for odd dimensions, so those clips are
    /// encoded 4:4:4 and keep their exact geometry.
    pub fn output_pixel_format(self, width: u32, height: u32) -> &'static str {
        let odd = width % 2 == 1 || height % 2 == 1;
        match self {
            Self::Libx264 if odd => "yuv444p",
            _ => "yuv420p",
        }
    }
}

impl fmt::Display for VideoCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoCodec {
    type Err = EvmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mpeg4" | "mp4v" => Ok(Self::Mpeg4),
            "libx264" | "h264" | "x264" => Ok(Self::Libx264),
            other => Err(EvmError::unsupported(format!(
                "video codec '{other}' (expected mpeg4 or libx264)"
            ))),
        }
    }
}
