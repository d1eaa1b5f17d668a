//! In-memory media backend.
//!
//! Sources and finished outputs live in shared maps keyed by path, so a test
//! can register input clips, run the pipeline, and then inspect exactly which
//! outputs were published.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use evmag_common::error::{EvmError, EvmResult};
use evmag_model::frame::RawFrame;
use evmag_model::stream::VideoStreamProperties;

use crate::backend::{MediaBackend, SinkOptions, VideoSink, VideoSource};

/// A clip held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryVideo {
    pub properties: VideoStreamProperties,
    pub frames: Vec<RawFrame>,
}

impl MemoryVideo {
    pub fn new(properties: VideoStreamProperties, frames: Vec<RawFrame>) -> Self {
        Self { properties, frames }
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

type Store = Arc<Mutex<HashMap<PathBuf, MemoryVideo>>>;

fn lock(store: &Store) -> MutexGuard<'_, HashMap<PathBuf, MemoryVideo>> {
    // A panicking test thread must not hide the data from the others.
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Backend reading from and writing to shared in-memory maps.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    sources: Store,
    outputs: Store,
    fail_sink_after: Option<usize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a clip that [`MediaBackend::open_source`] can open at `path`.
    pub fn insert_source(&self, path: impl Into<PathBuf>, video: MemoryVideo) {
        lock(&self.sources).insert(path.into(), video);
    }

    /// Make every sink fail once it has accepted `frames` frames.
    pub fn with_sink_failure_after(mut self, frames: usize) -> Self {
        self.fail_sink_after = Some(frames);
        self
    }

    /// Published output at `path`, if a sink finished there.
    pub fn output(&self, path: &Path) -> Option<MemoryVideo> {
        lock(&self.outputs).get(path).cloned()
    }

    pub fn output_count(&self) -> usize {
        lock(&self.outputs).len()
    }
}

impl MediaBackend for MemoryBackend {
    fn open_source(&self, path: &Path) -> EvmResult<Box<dyn VideoSource>> {
        let video = lock(&self.sources)
            .get(path)
            .cloned()
            .ok_or_else(|| EvmError::source_unavailable(path, "no such clip"))?;
        Ok(Box::new(MemorySource {
            properties: video.properties,
            frames: video.frames.into_iter(),
        }))
    }

    fn check_sink(&self, path: &Path, _options: &SinkOptions) -> EvmResult<()> {
        if path.as_os_str().is_empty() {
            return Err(EvmError::sink_unavailable(path, "empty output path"));
        }
        Ok(())
    }

    fn create_sink(&self, path: &Path, options: &SinkOptions) -> EvmResult<Box<dyn VideoSink>> {
        self.check_sink(path, options)?;
        Ok(Box::new(MemorySink {
            path: path.to_path_buf(),
            pending: MemoryVideo::new(options.properties, Vec::new()),
            outputs: Arc::clone(&self.outputs),
            fail_after: self.fail_sink_after,
        }))
    }

    fn is_available(&self) -> bool {
        true
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySource {
    properties: VideoStreamProperties,
    frames: std::vec::IntoIter<RawFrame>,
}

impl VideoSource for MemorySource {
    fn properties(&self) -> VideoStreamProperties {
        self.properties
    }

    fn next_frame(&mut self) -> EvmResult<Option<RawFrame>> {
        Ok(self.frames.next())
    }
}

struct MemorySink {
    path: PathBuf,
    pending: MemoryVideo,
    outputs: Store,
    fail_after: Option<usize>,
}

impl VideoSink for MemorySink {
    fn write_frame(&mut self, frame: &RawFrame) -> EvmResult<()> {
        if self.fail_after.is_some_and(|n| self.pending.len() >= n) {
            return Err(EvmError::sink_unavailable(&self.path, "injected write failure"));
        }
        let props = &self.pending.properties;
        if frame.width != props.width
            || frame.height != props.height
            || frame.color_mode != props.color_mode
        {
            return Err(EvmError::invalid_parameter(format!(
                "frame {}x{} {} does not match output stream {}x{} {}",
                frame.width,
                frame.height,
                frame.color_mode,
                props.width,
                props.height,
                props.color_mode
            )));
        }
        self.pending.frames.push(frame.clone());
        Ok(())
    }

    fn finish(self: Box<Self>) -> EvmResult<PathBuf> {
        let MemorySink {
            path,
            pending,
            outputs,
            ..
        } = *self;
        lock(&outputs).insert(path.clone(), pending);
        Ok(path)
    }
}
