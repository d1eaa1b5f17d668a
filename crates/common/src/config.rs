//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{EvmError, EvmResult};

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Default magnification parameters.
    pub magnification: MagnificationDefaults,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Default magnification parameters.
///
/// Valid ranges:
/// - `amplification_factor`: finite and > 0 (typical 5 to 60); unset means
///   the color path's own default (30 for RGB, 50 for grayscale)
/// - cutoffs: `0 < low_cutoff_hz < high_cutoff_hz < fps / 2`, checked once the
///   input frame rate is known
/// - `filter_order`: 1 to 8
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MagnificationDefaults {
    /// Gain applied to the band-passed residual.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amplification_factor: Option<f64>,

    /// Lower edge of the temporal passband (Hz).
    pub low_cutoff_hz: f64,

    /// Upper edge of the temporal passband (Hz).
    pub high_cutoff_hz: f64,

    /// Butterworth prototype order.
    pub filter_order: usize,

    /// Process and encode a single luminance channel instead of RGB.
    pub grayscale: bool,

    /// ffmpeg encoder name for the output stream.
    pub video_codec: String,

    /// Upper bound for the in-memory tensors, in MiB. 0 disables the check.
    pub memory_budget_mb: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "evmag_media=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            magnification: MagnificationDefaults::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for MagnificationDefaults {
    fn default() -> Self {
        Self {
            amplification_factor: None,
            low_cutoff_hz: 0.4,
            high_cutoff_hz: 1.0,
            filter_order: 2,
            grayscale: false,
            video_codec: "mpeg4".to_string(),
            memory_budget_mb: 4096,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl MagnificationDefaults {
    /// Memory budget in bytes, `None` when the check is disabled.
    pub fn memory_budget_bytes(&self) -> Option<u64> {
        if self.memory_budget_mb == 0 {
            None
        } else {
            Some(self.memory_budget_mb.saturating_mul(1024 * 1024))
        }
    }
}

/// Outcome of loading a config file that may legitimately be absent.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: AppConfig,

    /// Why an existing file was ignored in favor of defaults. Logging is
    /// usually not initialized yet at load time, so the caller reports it.
    pub problem: Option<EvmError>,
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> LoadedConfig {
        Self::load_or_default(config_file_path())
    }

    /// Load config from `path`. A missing file yields defaults silently; an
    /// unreadable or malformed one yields defaults plus the problem.
    pub fn load_or_default(path: impl AsRef<Path>) -> LoadedConfig {
        let path = path.as_ref();
        if !path.exists() {
            return LoadedConfig {
                config: Self::default(),
                problem: None,
            };
        }
        match Self::load_from(path) {
            Ok(config) => LoadedConfig {
                config,
                problem: None,
            },
            Err(e) => LoadedConfig {
                config: Self::default(),
                problem: Some(e),
            },
        }
    }

    /// Load config from an explicit path. Unlike [`AppConfig::load`], a
    /// missing or malformed file is an error.
    pub fn load_from(path: impl AsRef<Path>) -> EvmResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| EvmError::config(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| EvmError::config(format!("Failed to parse {}: {e}", path.display())))
    }

    /// Save config to an explicit path.
    pub fn save_to(&self, path: impl AsRef<Path>) -> EvmResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

/// Standard config file location.
pub fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("evmag").join("config.json")
}
