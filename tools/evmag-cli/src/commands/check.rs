//! Check system capabilities.

use std::path::PathBuf;

use evmag_common::config::config_file_path;
use evmag_media::ffmpeg::command_exists;

pub fn run(config_override: Option<PathBuf>) -> anyhow::Result<()> {
    println!("evmag System Check");
    println!("{}", "=".repeat(50));

    let mut ready = true;
    for binary in ["ffmpeg", "ffprobe"] {
        if command_exists(binary) {
            println!("[OK] {binary} found on PATH");
        } else {
            println!("[MISSING] {binary} not found on PATH");
            ready = false;
        }
    }

    let config_path = config_override.unwrap_or_else(config_file_path);
    if config_path.exists() {
        println!("[OK] Config: {}", config_path.display());
    } else {
        println!("[INFO] Config: {} (not present, using defaults)", config_path.display());
    }

    println!();
    if ready {
        println!("All required tools are available. evmag is ready.");
    } else {
        println!("Install ffmpeg (which ships ffprobe) to decode and encode videos.");
    }

    Ok(())
}
