use std::f64::consts::PI;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use evmag_common::error::{EvmError, EvmResult};
use evmag_media::{
    magnify_video, MagnificationJob, MagnificationReport, MagnifyProgress, MagnifyStage,
    MediaBackend, MemoryBackend, MemoryVideo, ProgressCallback, SinkOptions, VideoSink,
    VideoSource,
};
use evmag_model::frame::RawFrame;
use evmag_model::params::MagnificationSettings;
use evmag_model::stream::{ColorMode, FrameRate, VideoStreamProperties};

const INPUT: &str = "/clips/face.mp4";
const OUTPUT: &str = "/clips/face_amplified.mp4";

fn props(width: u32, height: u32, rate: FrameRate) -> VideoStreamProperties {
    VideoStreamProperties::new(width, height, rate, ColorMode::Rgb)
}

fn fps30() -> FrameRate {
    FrameRate::from_integer(30).unwrap()
}

fn constant_clip(frames: usize, value: u8) -> MemoryVideo {
    MemoryVideo::new(
        props(4, 4, fps30()),
        vec![RawFrame::filled(4, 4, ColorMode::Rgb, value); frames],
    )
}

/// Gray-valued clip where pixel (1, 2) oscillates at 0.7 Hz with amplitude 5.
fn pulsing_clip(frames: usize) -> MemoryVideo {
    let frames = (0..frames)
        .map(|t| {
            let mut frame = RawFrame::filled(4, 4, ColorMode::Rgb, 128);
            let value = 128.0 + 5.0 * (2.0 * PI * 0.7 * t as f64 / 30.0).sin();
            let start = (4 + 2) * 3;
            frame.data[start..start + 3].fill(value.round() as u8);
            frame
        })
        .collect();
    MemoryVideo::new(props(4, 4, fps30()), frames)
}

fn backend_with(video: MemoryVideo) -> MemoryBackend {
    let backend = MemoryBackend::new();
    backend.insert_source(INPUT, video);
    backend
}

fn job(settings: MagnificationSettings) -> MagnificationJob {
    MagnificationJob::new(INPUT, OUTPUT, settings)
}

#[test]
fn constant_clip_comes_back_unchanged() {
    let backend = backend_with(constant_clip(10, 128));
    let report = magnify_video(&backend, &job(MagnificationSettings::default()), None).unwrap();

    let out = backend.output(Path::new(OUTPUT)).unwrap();
    assert_eq!(out.len(), 10);
    assert_eq!(out.properties.frame_rate, fps30());
    assert!(out.frames.iter().all(|f| f.data.iter().all(|&v| v == 128)));

    assert_eq!(report.frames, 10);
    assert_eq!(report.saturation.clipped(), 0);
    assert_eq!(report.sections.len(), 2);
    assert_eq!(report.backend, "memory");
}

#[test]
fn grayscale_path_saturates_pulsing_pixel() {
    let backend = backend_with(pulsing_clip(300));
    let settings = MagnificationSettings {
        amplification_factor: 30.0,
        ..MagnificationSettings::grayscale_defaults()
    };
    let report = magnify_video(&backend, &job(settings), None).unwrap();

    let out = backend.output(Path::new(OUTPUT)).unwrap();
    assert_eq!(out.len(), 300);
    assert_eq!(out.properties.color_mode, ColorMode::Gray);

    let trace: Vec<u8> = out.frames[60..240].iter().map(|f| f.pixel(1, 2)[0]).collect();
    assert!(trace.iter().filter(|&&v| v == 255).count() * 10 >= trace.len());
    assert!(trace.iter().filter(|&&v| v == 0).count() * 10 >= trace.len());
    assert!(out.frames.iter().all(|f| f.pixel(0, 0) == [128]));

    assert!(report.saturation.clipped_high > 0);
    assert!(report.saturation.clipped_low > 0);
}

#[test]
fn fractional_frame_rate_is_preserved() {
    let rate = FrameRate::new(30000, 1001).unwrap();
    let backend = backend_with(MemoryVideo::new(
        props(2, 2, rate),
        vec![RawFrame::filled(2, 2, ColorMode::Rgb, 90); 12],
    ));
    magnify_video(&backend, &job(MagnificationSettings::default()), None).unwrap();
    let out = backend.output(Path::new(OUTPUT)).unwrap();
    assert_eq!(out.properties.frame_rate, rate);
    assert_eq!((out.properties.width, out.properties.height), (2, 2));
}

#[test]
fn empty_clip_is_rejected() {
    let backend = backend_with(constant_clip(0, 128));
    let err = magnify_video(&backend, &job(MagnificationSettings::default()), None).unwrap_err();
    assert!(matches!(err, EvmError::EmptySequence));
    assert_eq!(backend.output_count(), 0);
}

#[test]
fn short_clip_is_rejected() {
    let backend = backend_with(constant_clip(5, 128));
    let err = magnify_video(&backend, &job(MagnificationSettings::default()), None).unwrap_err();
    match err {
        EvmError::InsufficientFrames {
            frames, required, ..
        } => {
            assert_eq!(frames, 5);
            assert_eq!(required, 7);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(backend.output_count(), 0);
}

#[test]
fn output_equal_to_input_is_rejected() {
    let backend = backend_with(constant_clip(10, 128));
    let job = MagnificationJob::new(INPUT, INPUT, MagnificationSettings::default());
    let err = magnify_video(&backend, &job, None).unwrap_err();
    assert_eq!(err.kind(), "invalid_parameter");
}

#[test]
fn missing_input_is_source_unavailable() {
    let backend = MemoryBackend::new();
    let err = magnify_video(&backend, &job(MagnificationSettings::default()), None).unwrap_err();
    assert_eq!(err.kind(), "source_unavailable");
}

#[test]
fn sink_failure_publishes_nothing() {
    let backend = backend_with(constant_clip(10, 128)).with_sink_failure_after(4);
    let err = magnify_video(&backend, &job(MagnificationSettings::default()), None).unwrap_err();
    assert_eq!(err.kind(), "sink_unavailable");
    assert!(backend.output(Path::new(OUTPUT)).is_none());
}

#[test]
fn memory_budget_is_enforced() {
    let backend = backend_with(constant_clip(10, 128));
    // Two f32 tensors of 4x4x3 samples need 384 bytes per frame.
    let job = job(MagnificationSettings::default()).with_memory_budget(Some(384 * 5));
    let err = magnify_video(&backend, &job, None).unwrap_err();
    match err {
        EvmError::MemoryBudgetExceeded {
            required_bytes,
            budget_bytes,
        } => {
            assert_eq!(required_bytes, 384 * 6);
            assert_eq!(budget_bytes, 384 * 5);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn progress_walks_through_every_stage() {
    let backend = backend_with(constant_clip(40, 128));
    let seen: Arc<Mutex<Vec<MagnifyProgress>>> = Arc::default();
    let sink = Arc::clone(&seen);
    let callback: ProgressCallback = Box::new(move |p: MagnifyProgress| {
        sink.lock().unwrap().push(p);
    });
    magnify_video(&backend, &job(MagnificationSettings::default()), Some(callback)).unwrap();

    let seen = seen.lock().unwrap();
    let mut stages: Vec<MagnifyStage> = seen.iter().map(|p| p.stage).collect();
    stages.dedup();
    assert_eq!(
        stages,
        vec![
            MagnifyStage::Decoding,
            MagnifyStage::Filtering,
            MagnifyStage::Amplifying,
            MagnifyStage::Encoding,
            MagnifyStage::Complete,
        ]
    );
    let last = seen.last().unwrap();
    assert_eq!(last.frames_done, 40);
    assert_eq!(last.total_frames, Some(40));
}

#[test]
fn report_round_trips_through_json_file() {
    let backend = backend_with(constant_clip(10, 100));
    let report = magnify_video(&backend, &job(MagnificationSettings::default()), None).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("reports").join("run.json");
    report.write_json(&path).unwrap();
    let back: MagnificationReport =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(back.frames, report.frames);
    assert_eq!(back.filter, report.filter);
    assert_eq!(back.sections, report.sections);
}

/// Backend whose source counts decode calls, to observe validation order.
struct CountingBackend {
    inner: MemoryBackend,
    decoded: Arc<AtomicUsize>,
}

struct CountingSource {
    inner: Box<dyn VideoSource>,
    decoded: Arc<AtomicUsize>,
}

impl VideoSource for CountingSource {
    fn properties(&self) -> VideoStreamProperties {
        self.inner.properties()
    }

    fn next_frame(&mut self) -> EvmResult<Option<RawFrame>> {
        self.decoded.fetch_add(1, Ordering::SeqCst);
        self.inner.next_frame()
    }
}

impl MediaBackend for CountingBackend {
    fn open_source(&self, path: &Path) -> EvmResult<Box<dyn VideoSource>> {
        Ok(Box::new(CountingSource {
            inner: self.inner.open_source(path)?,
            decoded: Arc::clone(&self.decoded),
        }))
    }

    fn check_sink(&self, path: &Path, options: &SinkOptions) -> EvmResult<()> {
        self.inner.check_sink(path, options)
    }

    fn create_sink(&self, path: &Path, options: &SinkOptions) -> EvmResult<Box<dyn VideoSink>> {
        self.inner.create_sink(path, options)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[test]
fn invalid_band_is_reported_before_decoding() {
    let backend = CountingBackend {
        inner: backend_with(constant_clip(10, 128)),
        decoded: Arc::default(),
    };
    let settings = MagnificationSettings {
        high_cutoff_hz: 16.0,
        ..MagnificationSettings::default()
    };
    let err = magnify_video(&backend, &job(settings), None).unwrap_err();
    assert!(matches!(err, EvmError::InvalidBand { .. }));
    assert_eq!(backend.decoded.load(Ordering::SeqCst), 0);
    assert_eq!(backend.inner.output_count(), 0);
}

#[test]
fn non_positive_factor_is_rejected_before_decoding() {
    let backend = CountingBackend {
        inner: backend_with(constant_clip(10, 128)),
        decoded: Arc::default(),
    };
    let settings = MagnificationSettings {
        amplification_factor: 0.0,
        ..MagnificationSettings::default()
    };
    let err = magnify_video(&backend, &job(settings), None).unwrap_err();
    assert_eq!(err.kind(), "invalid_parameter");
    assert_eq!(backend.decoded.load(Ordering::SeqCst), 0);
}

#[test]
fn unwritable_output_is_reported_before_decoding() {
    let backend = CountingBackend {
        inner: backend_with(constant_clip(10, 128)),
        decoded: Arc::default(),
    };
    let job = MagnificationJob::new(INPUT, "", MagnificationSettings::default());
    let err = magnify_video(&backend, &job, None).unwrap_err();
    assert_eq!(err.kind(), "sink_unavailable");
    assert_eq!(backend.decoded.load(Ordering::SeqCst), 0);
    assert_eq!(backend.inner.output_count(), 0);
}
