//! Show video stream properties.

use std::path::PathBuf;

use evmag_common::config::AppConfig;
use evmag_media::probe_video;
use evmag_model::params::FilterSpec;
use evmag_model::stream::ColorMode;

use super::format_bytes;

pub fn run(path: PathBuf, json: bool, config: &AppConfig) -> anyhow::Result<()> {
    let props = probe_video(&path)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&props)?);
        return Ok(());
    }

    println!("Video: {}", path.display());
    println!("  Resolution: {}x{}", props.width, props.height);
    println!(
        "  Frame rate: {} fps ({:.3})",
        props.frame_rate,
        props.frame_rate.as_f64()
    );
    println!("  Nyquist: {:.3} Hz", props.nyquist_hz());
    println!();

    println!("Working set per frame (original + filtered):");
    for mode in [ColorMode::Rgb, ColorMode::Gray] {
        let bytes = props.with_color_mode(mode).working_set_bytes(1);
        println!("  {mode}: {}", format_bytes(bytes));
    }
    match config.magnification.memory_budget_bytes() {
        Some(budget) => {
            let per_frame = props.working_set_bytes(1).max(1);
            let frames = budget / per_frame;
            let secs = frames as f64 / props.frame_rate.as_f64();
            println!(
                "  Budget {} fits {frames} RGB frames ({secs:.1}s)",
                format_bytes(budget)
            );
        }
        None => println!("  Budget: unlimited"),
    }
    println!();

    let defaults = &config.magnification;
    let spec = FilterSpec::new(
        defaults.low_cutoff_hz,
        defaults.high_cutoff_hz,
        props.frame_rate.as_f64(),
    )
    .with_order(defaults.filter_order);
    match spec.validate() {
        Ok(()) => println!(
            "Configured band {}-{} Hz: valid for this video",
            spec.low_cutoff_hz, spec.high_cutoff_hz
        ),
        Err(e) => println!("Configured band: {e}"),
    }

    Ok(())
}
