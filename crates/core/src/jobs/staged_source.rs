use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// A job's temporary source file.
///
/// `release` removes it; dropping an unreleased source removes it too, so
/// the file is gone even when the worker unwinds.
#[derive(Debug)]
pub struct StagedSource {
    path: PathBuf,
    released: bool,
}

impl StagedSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the staged file (or directory). A file that is already gone
    /// counts as released.
    pub fn release(&mut self) -> io::Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        let removed = if self.path.is_dir() {
            fs::remove_dir_all(&self.path)
        } else {
            fs::remove_file(&self.path)
        };
        match removed {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for StagedSource {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to remove {}: {e}", self.path.display());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.mp4");
        fs::write(&path, b"data").unwrap();

        let mut staged = StagedSource::new(&path);
        staged.release().unwrap();
        assert!(!path.exists());
        staged.release().unwrap();
    }

    #[test]
    fn test_drop_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("upload.mp4");
        fs::write(&path, b"data").unwrap();

        drop(StagedSource::new(&path));
        assert!(!path.exists());
    }

    #[test]
    fn test_release_removes_frame_directory() {
        let dir = tempfile::tempdir().unwrap();
        let frames = dir.path().join("frames");
        fs::create_dir(&frames).unwrap();
        fs::write(frames.join("0001.png"), b"x").unwrap();

        StagedSource::new(&frames).release().unwrap();
        assert!(!frames.exists());
    }

    #[test]
    fn test_missing_file_counts_as_released() {
        let dir = tempfile::tempdir().unwrap();
        let mut staged = StagedSource::new(dir.path().join("gone.mp4"));
        assert!(staged.release().is_ok());
    }
}
