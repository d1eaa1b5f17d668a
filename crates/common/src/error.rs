//! Error kinds shared across evmag crates.

use std::path::{Path, PathBuf};

/// Top-level error type for evmag operations.
///
/// Every variant is terminal for the current run: the pipeline never retries
/// and never produces a partially amplified output.
#[derive(Debug, thiserror::Error)]
pub enum EvmError {
    #[error("Source unavailable: {path}: {message}")]
    SourceUnavailable { path: PathBuf, message: String },

    #[error("Input video contains no frames")]
    EmptySequence,

    #[error("Insufficient frames: got {frames}, an order-{order} filter needs at least {required}")]
    InsufficientFrames {
        frames: usize,
        required: usize,
        order: usize,
    },

    #[error(
        "Invalid band: cutoffs must satisfy 0 < low < high < nyquist \
         (low={low_hz} Hz, high={high_hz} Hz, nyquist={nyquist_hz} Hz)"
    )]
    InvalidBand {
        low_hz: f64,
        high_hz: f64,
        nyquist_hz: f64,
    },

    #[error("Sink unavailable: {path}: {message}")]
    SinkUnavailable { path: PathBuf, message: String },

    #[error("Invalid parameter: {message}")]
    InvalidParameter { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error(
        "Memory budget exceeded: run needs at least {required_bytes} bytes, \
         budget is {budget_bytes} bytes"
    )]
    MemoryBudgetExceeded {
        required_bytes: u64,
        budget_bytes: u64,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Unsupported operation: {message}")]
    Unsupported { message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using EvmError.
pub type EvmResult<T> = Result<T, EvmError>;

impl EvmError {
    pub fn source_unavailable(path: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            path: path.as_ref().to_path_buf(),
            message: msg.into(),
        }
    }

    pub fn sink_unavailable(path: impl AsRef<Path>, msg: impl Into<String>) -> Self {
        Self::SinkUnavailable {
            path: path.as_ref().to_path_buf(),
            message: msg.into(),
        }
    }

    pub fn invalid_parameter(msg: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: msg.into(),
        }
    }

    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported {
            message: msg.into(),
        }
    }

    /// Short stable name of the error kind, used in logs and run reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source_unavailable",
            Self::EmptySequence => "empty_sequence",
            Self::InsufficientFrames { .. } => "insufficient_frames",
            Self::InvalidBand { .. } => "invalid_band",
            Self::SinkUnavailable { .. } => "sink_unavailable",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::Decode { .. } => "decode",
            Self::MemoryBudgetExceeded { .. } => "memory_budget_exceeded",
            Self::Config { .. } => "config",
            Self::Unsupported { .. } => "unsupported",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_band_message_names_all_bounds() {
        let err = EvmError::InvalidBand {
            low_hz: 1.0,
            high_hz: 0.4,
            nyquist_hz: 15.0,
        };
        let msg = err.to_string();
        assert!(msg.contains("low=1 Hz"));
        assert!(msg.contains("high=0.4 Hz"));
        assert!(msg.contains("nyquist=15 Hz"));
        assert_eq!(err.kind(), "invalid_band");
    }

    #[test]
    fn test_constructors_keep_path() {
        let err = EvmError::sink_unavailable("/tmp/out.mp4", "permission denied");
        match err {
            EvmError::SinkUnavailable { path, message } => {
                assert_eq!(path, PathBuf::from("/tmp/out.mp4"));
                assert_eq!(message, "permission denied");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: EvmError = io.into();
        assert_eq!(err.kind(), "io");
    }
}
