//! # evmag-media
//!
//! Video I/O and the end-to-end magnification pipeline.
//!
//! Frames are decoded through a [`MediaBackend`], magnified entirely in
//! memory, and encoded to a temporary `.partial` file that is renamed into
//! place only once every frame has been written.

pub mod backend;
pub mod ffmpeg;
pub mod memory;
pub mod output;
pub mod pipeline;
pub mod report;

pub use backend::{MediaBackend, SinkOptions, VideoCodec, VideoSink, VideoSource};
pub use ffmpeg::{probe_video, FfmpegBackend};
pub use memory::{MemoryBackend, MemoryVideo};
pub use output::{check_output_path, default_output_path, partial_path_for, PartialOutput};
pub use pipeline::{
    ingest_frames, magnify_video, write_frames, MagnificationJob, MagnifyProgress, MagnifyStage,
    ProgressCallback,
};
pub use report::MagnificationReport;
