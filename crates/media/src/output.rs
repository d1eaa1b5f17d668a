//! Output path handling.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use evmag_common::error::{EvmError, EvmResult};

/// `<dir>/<stem>_amplified.mp4` next to `input`.
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}_amplified.mp4"))
}

/// `<dir>/<stem>.partial.<ext>` for `output`.
///
/// The extension is kept last so encoders can still infer the container.
pub fn partial_path_for(output: &Path) -> PathBuf {
    let mut name = OsString::from(output.file_stem().unwrap_or_default());
    name.push(".partial");
    if let Some(ext) = output.extension() {
        name.push(".");
        name.push(ext);
    }
    output.with_file_name(name)
}

/// Check that `final_path` names a file in an existing directory.
///
/// Touches nothing on disk.
pub fn check_output_path(final_path: &Path) -> EvmResult<()> {
    if final_path.as_os_str().is_empty() {
        return Err(EvmError::sink_unavailable(final_path, "empty output path"));
    }
    if final_path.is_dir() {
        return Err(EvmError::sink_unavailable(final_path, "path is a directory"));
    }
    let parent = match final_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    if !parent.is_dir() {
        return Err(EvmError::sink_unavailable(
            final_path,
            format!("directory {} does not exist", parent.display()),
        ));
    }
    Ok(())
}

/// Temporary output file that only becomes visible on [`PartialOutput::commit`].
///
/// Dropping an uncommitted value removes the temporary file.
#[derive(Debug)]
pub struct PartialOutput {
    final_path: PathBuf,
    partial_path: PathBuf,
    committed: bool,
}

impl PartialOutput {
    /// Check that `final_path` can be written and clear any stale partial file.
    pub fn prepare(final_path: &Path) -> EvmResult<Self> {
        check_output_path(final_path)?;

        let partial_path = partial_path_for(final_path);
        if partial_path.exists() {
            tracing::debug!(path = %partial_path.display(), "Removing stale partial output");
            std::fs::remove_file(&partial_path)
                .map_err(|e| EvmError::sink_unavailable(&partial_path, e.to_string()))?;
        }

        Ok(Self {
            final_path: final_path.to_path_buf(),
            partial_path,
            committed: false,
        })
    }

    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Where the encoder should write.
    pub fn partial_path(&self) -> &Path {
        &self.partial_path
    }

    /// Move the partial file over the final path.
    pub fn commit(&mut self) -> EvmResult<PathBuf> {
        std::fs::rename(&self.partial_path, &self.final_path)
            .map_err(|e| EvmError::sink_unavailable(&self.final_path, e.to_string()))?;
        self.committed = true;
        tracing::debug!(path = %self.final_path.display(), "Output committed");
        Ok(self.final_path.clone())
    }
}

impl Drop for PartialOutput {
    fn drop(&mut self) {
        if self.committed || !self.partial_path.exists() {
            return;
        }
        match std::fs::remove_file(&self.partial_path) {
            Ok(()) => tracing::debug!(
                path = %self.partial_path.display(),
                "Removed partial output"
            ),
            Err(e) => tracing::warn!(
                path = %self.partial_path.display(),
                error = %e,
                "Failed to remove partial output"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_output_path() {
        assert_eq!(
            default_output_path(Path::new("clips/face.avi")),
            PathBuf::from("clips/face_amplified.mp4")
        );
        assert_eq!(
            default_output_path(Path::new("baby")),
            PathBuf::from("baby_amplified.mp4")
        );
    }

    #[test]
    fn test_partial_path_keeps_extension_last() {
        assert_eq!(
            partial_path_for(Path::new("/tmp/out.mp4")),
            PathBuf::from("/tmp/out.partial.mp4")
        );
        assert_eq!(
            partial_path_for(Path::new("out")),
            PathBuf::from("out.partial")
        );
    }

    #[test]
    fn test_commit_moves_partial_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("result.mp4");
        let mut output = PartialOutput::prepare(&target).unwrap();
        std::fs::write(output.partial_path(), b"frames").unwrap();

        let published = output.commit().unwrap();
        drop(output);

        assert_eq!(published, target);
        assert_eq!(std::fs::read(&target).unwrap(), b"frames");
        assert!(!partial_path_for(&target).exists());
    }

    #[test]
    fn test_drop_without_commit_removes_partial() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("result.mp4");
        let output = PartialOutput::prepare(&target).unwrap();
        std::fs::write(output.partial_path(), b"half").unwrap();
        drop(output);

        assert!(!partial_path_for(&target).exists());
        assert!(!target.exists());
    }

    #[test]
    fn test_prepare_clears_stale_partial() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("result.mp4");
        std::fs::write(partial_path_for(&target), b"stale").unwrap();
        let _output = PartialOutput::prepare(&target).unwrap();
        assert!(!partial_path_for(&target).exists());
    }

    #[test]
    fn test_prepare_rejects_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("missing").join("result.mp4");
        let err = PartialOutput::prepare(&target).unwrap_err();
        assert_eq!(err.kind(), "sink_unavailable");
    }

    #[test]
    fn test_check_output_path_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("result.mp4");
        check_output_path(&target).unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let missing = dir.path().join("missing").join("result.mp4");
        let err = check_output_path(&missing).unwrap_err();
        assert_eq!(err.kind(), "sink_unavailable");
        assert!(!dir.path().join("missing").exists());

        let err = check_output_path(dir.path()).unwrap_err();
        assert_eq!(err.kind(), "sink_unavailable");
        assert_eq!(check_output_path(Path::new("")).unwrap_err().kind(), "sink_unavailable");
    }
}
