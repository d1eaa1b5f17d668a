//! Write a default configuration file.

use std::path::{Path, PathBuf};

use evmag_common::config::{config_file_path, AppConfig};

/// Write defaults to `path`. An existing file is only replaced with `force`.
fn write_default_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite it",
            path.display()
        );
    }
    AppConfig::default().save_to(path)?;
    Ok(())
}

pub fn run(config_override: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = config_override.unwrap_or_else(config_file_path);
    write_default_config(&path, force)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_loadable_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("evmag").join("config.json");
        write_default_config(&path, false).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.magnification.filter_order, 2);
        assert_eq!(loaded.magnification.amplification_factor, None);
    }

    #[test]
    fn test_existing_file_needs_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"logging": {"level": "warn"}}"#).unwrap();

        assert!(write_default_config(&path, false).is_err());
        assert_eq!(AppConfig::load_from(&path).unwrap().logging.level, "warn");

        write_default_config(&path, true).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap().logging.level, "info");
    }
}
