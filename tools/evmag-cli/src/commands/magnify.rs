//! Magnify a video.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use evmag_common::config::{AppConfig, MagnificationDefaults};
use evmag_media::{
    default_output_path, magnify_video, FfmpegBackend, MagnificationJob, MagnifyProgress,
    MediaBackend, ProgressCallback, VideoCodec,
};
use evmag_model::params::MagnificationSettings;

#[derive(Debug, Default, Args)]
pub struct MagnifyArgs {
    /// Input video (prompted for when omitted)
    pub input: Option<PathBuf>,

    /// Output video [default: <input>_amplified.mp4]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Lower cutoff frequency (Hz)
    #[arg(long)]
    pub low: Option<f64>,

    /// Upper cutoff frequency (Hz)
    #[arg(long)]
    pub high: Option<f64>,

    /// Amplification factor [default: 30, or 50 with --grayscale]
    #[arg(short, long)]
    pub amplification: Option<f64>,

    /// Butterworth filter order (1-8)
    #[arg(long)]
    pub order: Option<usize>,

    /// Process a single luminance channel
    #[arg(long)]
    pub grayscale: bool,

    /// Output encoder: mpeg4|libx264
    #[arg(long)]
    pub codec: Option<String>,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Memory budget for the in-memory tensors in MiB (0 = unlimited)
    #[arg(long)]
    pub memory_budget_mb: Option<u64>,
}

/// Merge flags over configuration over the color path's defaults.
fn resolve_settings(args: &MagnifyArgs, defaults: &MagnificationDefaults) -> MagnificationSettings {
    let base = if args.grayscale || defaults.grayscale {
        MagnificationSettings::grayscale_defaults()
    } else {
        MagnificationSettings::default()
    };
    MagnificationSettings {
        amplification_factor: args
            .amplification
            .or(defaults.amplification_factor)
            .unwrap_or(base.amplification_factor),
        low_cutoff_hz: args.low.unwrap_or(defaults.low_cutoff_hz),
        high_cutoff_hz: args.high.unwrap_or(defaults.high_cutoff_hz),
        filter_order: args.order.unwrap_or(defaults.filter_order),
        color_mode: base.color_mode,
    }
}

fn memory_budget_bytes(args: &MagnifyArgs, defaults: &MagnificationDefaults) -> Option<u64> {
    let defaults = MagnificationDefaults {
        memory_budget_mb: args.memory_budget_mb.unwrap_or(defaults.memory_budget_mb),
        ..defaults.clone()
    };
    defaults.memory_budget_bytes()
}

/// Strip whitespace and the quotes a terminal adds to dragged-in paths.
fn clean_path_input(line: &str) -> Option<PathBuf> {
    let trimmed = line.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| {
            trimmed
                .strip_prefix('\'')
                .and_then(|s| s.strip_suffix('\''))
        })
        .unwrap_or(trimmed);
    if unquoted.is_empty() {
        None
    } else {
        Some(PathBuf::from(unquoted))
    }
}

fn prompt_input_path() -> anyhow::Result<PathBuf> {
    print!("Video path: ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read video path from stdin")?;
    clean_path_input(&line).ok_or_else(|| anyhow::anyhow!("No video path given"))
}

pub fn run(args: MagnifyArgs, config: &AppConfig) -> anyhow::Result<()> {
    let input = match &args.input {
        Some(path) => path.clone(),
        None => prompt_input_path()?,
    };
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input));

    let defaults = &config.magnification;
    let settings = resolve_settings(&args, defaults);
    let codec: VideoCodec = args
        .codec
        .as_deref()
        .unwrap_or(defaults.video_codec.as_str())
        .parse()?;

    let backend = FfmpegBackend::new();
    if !backend.is_available() {
        anyhow::bail!("ffmpeg and ffprobe are required; run `evmag check` for details");
    }

    println!("Magnifying: {}", input.display());
    println!("  Output: {}", output.display());
    println!(
        "  Band: {}-{} Hz (order {})",
        settings.low_cutoff_hz, settings.high_cutoff_hz, settings.filter_order
    );
    println!(
        "  Amplification: {}x ({})",
        settings.amplification_factor, settings.color_mode
    );
    println!("  Codec: {codec}");

    let job = MagnificationJob::new(&input, &output, settings)
        .with_codec(codec)
        .with_memory_budget(memory_budget_bytes(&args, defaults));

    let progress_cb: ProgressCallback = Box::new(|p: MagnifyProgress| {
        match p.total_frames {
            Some(total) => print!("\r  {:?}: {}/{} frames      ", p.stage, p.frames_done, total),
            None => print!("\r  {:?}: {} frames      ", p.stage, p.frames_done),
        }
        let _ = std::io::stdout().flush();
    });

    let report = match magnify_video(&backend, &job, Some(progress_cb)) {
        Ok(report) => report,
        Err(e) => {
            println!();
            tracing::error!(kind = e.kind(), error = %e, "Magnification failed");
            return Err(e.into());
        }
    };

    println!();
    println!(
        "Done: {} ({} frames in {:.1}s)",
        report.output.display(),
        report.frames,
        report.elapsed_secs
    );
    if report.saturation.clipped() > 0 {
        println!(
            "  Saturated: {:.2}% of samples ({} low, {} high)",
            report.saturation.clipped_fraction() * 100.0,
            report.saturation.clipped_low,
            report.saturation.clipped_high
        );
    }

    if let Some(path) = &args.report {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("  Report: {}", path.display());
    }

    Ok(())
}
