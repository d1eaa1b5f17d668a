//! Machine-readable summary of a magnification run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use evmag_common::error::EvmResult;
use evmag_model::params::FilterSpec;
use evmag_model::stream::VideoStreamProperties;
use evmag_processing_core::{SaturationStats, SecondOrderSections};

use crate::backend::VideoCodec;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MagnificationReport {
    pub input: PathBuf,
    pub output: PathBuf,
    /// Media backend that decoded and encoded the clip.
    pub backend: String,
    pub codec: VideoCodec,
    pub started_at: DateTime<Utc>,
    pub elapsed_secs: f64,
    /// Output stream; its color mode is the processing color mode.
    pub stream: VideoStreamProperties,
    pub frames: usize,
    pub amplification_factor: f64,
    pub filter: FilterSpec,
    /// Designed filter, one `b`/`a` pair per section.
    pub sections: SecondOrderSections,
    pub saturation: SaturationStats,
}

impl MagnificationReport {
    /// Write the report as pretty-printed JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> EvmResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
