//! End-to-end magnification of a video file.
//!
//! Order of work:
//! 1. open the source to learn geometry and frame rate
//! 2. validate the band against that frame rate and design the filter
//! 3. check that the output can be written
//! 4. decode every frame into one tensor
//! 5. filter, amplify, saturate
//! 6. encode into a partial file and publish it
//!
//! Any error aborts the run; nothing is left at the output path.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};

use evmag_common::error::{EvmError, EvmResult};
use evmag_model::frame::FrameSequence;
use evmag_model::params::MagnificationSettings;
use evmag_model::stream::ColorMode;
use evmag_processing_core::{colorspace_for, MagnifiedSequence, Magnifier};

use crate::backend::{MediaBackend, SinkOptions, VideoCodec, VideoSink, VideoSource};
use crate::report::MagnificationReport;

/// Frames between two progress notifications while decoding or encoding.
const PROGRESS_INTERVAL: usize = 30;

/// A magnification job ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct MagnificationJob {
    /// Video to read.
    pub input: PathBuf,

    /// Video to write. Must differ from `input`.
    pub output: PathBuf,

    pub settings: MagnificationSettings,

    pub codec: VideoCodec,

    /// Upper bound on the two in-memory tensors; `None` disables the check.
    pub memory_budget_bytes: Option<u64>,
}

impl MagnificationJob {
    pub fn new(
        input: impl Into<PathBuf>,
        output: impl Into<PathBuf>,
        settings: MagnificationSettings,
    ) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            settings,
            codec: VideoCodec::default(),
            memory_budget_bytes: None,
        }
    }

    pub fn with_codec(self, codec: VideoCodec) -> Self {
        Self { codec, ..self }
    }

    pub fn with_memory_budget(self, memory_budget_bytes: Option<u64>) -> Self {
        Self {
            memory_budget_bytes,
            ..self
        }
    }

    /// Reject an output that would overwrite the input.
    pub fn validate_paths(&self) -> EvmResult<()> {
        if same_file(&self.input, &self.output) {
            return Err(EvmError::invalid_parameter(format!(
                "output path {} is the input video",
                self.output.display()
            )));
        }
        Ok(())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Stages of a magnification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MagnifyStage {
    Decoding,
    Filtering,
    Amplifying,
    Encoding,
    Complete,
}

/// Progress report for a magnification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MagnifyProgress {
    pub stage: MagnifyStage,

    /// Frames handled so far in this stage.
    pub frames_done: usize,

    /// Total frames, unknown until decoding has finished.
    pub total_frames: Option<usize>,
}

/// Progress callback for magnification runs.
pub type ProgressCallback = Box<dyn Fn(MagnifyProgress) + Send>;

fn notify(
    progress: Option<&ProgressCallback>,
    stage: MagnifyStage,
    frames_done: usize,
    total_frames: Option<usize>,
) {
    if let Some(cb) = progress {
        cb(MagnifyProgress {
            stage,
            frames_done,
            total_frames,
        });
    }
}

/// Decode every frame of `source` into a sequence in `color_mode`.
///
/// Fails with `MemoryBudgetExceeded` as soon as the working set of the run
/// (original plus filtered tensor) would outgrow `memory_budget_bytes`.
pub fn ingest_frames(
    source: &mut dyn VideoSource,
    color_mode: ColorMode,
    memory_budget_bytes: Option<u64>,
    progress: Option<&ProgressCallback>,
) -> EvmResult<FrameSequence> {
    let props = source.properties().with_color_mode(color_mode);
    let colorspace = colorspace_for(color_mode);

    let mut data: Vec<f32> = Vec::new();
    let mut frames = 0usize;

    while let Some(frame) = source.next_frame()? {
        if frame.width != props.width || frame.height != props.height {
            return Err(EvmError::decode(format!(
                "frame {frames} is {}x{}, stream is {}x{}",
                frame.width, frame.height, props.width, props.height
            )));
        }
        if let Some(budget) = memory_budget_bytes {
            let required = props.working_set_bytes(frames + 1);
            if required > budget {
                return Err(EvmError::MemoryBudgetExceeded {
                    required_bytes: required,
                    budget_bytes: budget,
                });
            }
        }

        let tensor = colorspace.to_processing(&frame)?;
        data.extend(tensor.iter().copied());
        frames += 1;

        if frames % PROGRESS_INTERVAL == 0 {
            notify(progress, MagnifyStage::Decoding, frames, None);
        }
    }
    notify(progress, MagnifyStage::Decoding, frames, Some(frames));

    tracing::info!(
        frames,
        width = props.width,
        height = props.height,
        color_mode = %color_mode,
        "Frames decoded"
    );

    FrameSequence::from_flat(
        frames,
        props.height as usize,
        props.width as usize,
        color_mode,
        data,
    )
}

/// Quantize and write every frame of `sequence` in order.
pub fn write_frames(
    sink: &mut dyn VideoSink,
    sequence: &MagnifiedSequence,
    progress: Option<&ProgressCallback>,
) -> EvmResult<usize> {
    let total = sequence.len();
    for (index, frame) in sequence.frames().enumerate() {
        sink.write_frame(&frame?)?;
        let done = index + 1;
        if done % PROGRESS_INTERVAL == 0 || done == total {
            notify(progress, MagnifyStage::Encoding, done, Some(total));
        }
    }
    Ok(total)
}

/// Run a complete magnification job.
pub fn magnify_video(
    backend: &dyn MediaBackend,
    job: &MagnificationJob,
    progress: Option<ProgressCallback>,
) -> EvmResult<MagnificationReport> {
    job.validate_paths()?;
    let started_at = chrono::Utc::now();
    let start = Instant::now();
    let progress = progress.as_ref();

    let mut source = backend.open_source(&job.input)?;
    let input_props = source.properties();
    tracing::info!(
        backend = backend.name(),
        input = %job.input.display(),
        width = input_props.width,
        height = input_props.height,
        fps = %input_props.frame_rate,
        "Magnification started"
    );

    // Band and factor are checked against the real frame rate before any
    // frame is decoded.
    let config = job
        .settings
        .amplification_config(input_props.frame_rate.as_f64())?;
    let magnifier = Magnifier::new(config)?;

    let output_props = input_props.with_color_mode(job.settings.color_mode);
    let options = SinkOptions {
        properties: output_props,
        codec: job.codec,
    };
    backend.check_sink(&job.output, &options)?;

    let frames = ingest_frames(
        source.as_mut(),
        job.settings.color_mode,
        job.memory_budget_bytes,
        progress,
    )?;
    drop(source);
    let total = frames.len();

    notify(progress, MagnifyStage::Filtering, 0, Some(total));
    let filtered = magnifier.filter(&frames)?;
    notify(progress, MagnifyStage::Filtering, total, Some(total));

    notify(progress, MagnifyStage::Amplifying, 0, Some(total));
    let magnified = magnifier.amplify(frames, filtered)?;
    notify(progress, MagnifyStage::Amplifying, total, Some(total));

    let stats = *magnified.stats();
    if stats.clipped() > 0 {
        tracing::info!(
            clipped_low = stats.clipped_low,
            clipped_high = stats.clipped_high,
            fraction = stats.clipped_fraction(),
            "Amplified samples saturated"
        );
    }

    let mut sink = backend.create_sink(&job.output, &options)?;
    write_frames(sink.as_mut(), &magnified, progress)?;
    let output = sink.finish()?;

    notify(progress, MagnifyStage::Complete, total, Some(total));
    let elapsed_secs = start.elapsed().as_secs_f64();
    tracing::info!(
        frames = total,
        output = %output.display(),
        elapsed_secs,
        "Magnification complete"
    );

    Ok(MagnificationReport {
        input: job.input.clone(),
        output,
        backend: backend.name().to_string(),
        codec: job.codec,
        started_at,
        elapsed_secs,
        stream: output_props,
        frames: total,
        amplification_factor: config.factor,
        filter: config.filter,
        sections: magnifier.temporal_filter().bandpass().sections().clone(),
        saturation: stats,
    })
}
