//! Temporary frame files for one animated conversion.

use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

use crate::Result;

/// ffmpeg input pattern matching [`frame_file_name`].
pub const FRAME_PATTERN: &str = "frame-%d.png";

pub fn frame_file_name(index: usize) -> String {
    format!("frame-{}.png", index)
}

/// Contiguously numbered frames in a private directory under the frames root.
///
/// Every frame (and the directory) is deleted by [`FrameSet::remove_all`] or,
/// at the latest, when the set is dropped. Deletion failures are logged only.
#[derive(Debug)]
pub struct FrameSet {
    dir: Option<TempDir>,
    paths: Vec<PathBuf>,
}

impl FrameSet {
    pub fn create_in(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new().prefix("conversion-").tempdir_in(root)?;
        debug!("frame directory {}", dir.path().display());
        Ok(Self {
            dir: Some(dir),
            paths: Vec::new(),
        })
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    /// Path the next frame must be written to.
    pub fn next_path(&self) -> Option<PathBuf> {
        self.dir().map(|d| d.join(frame_file_name(self.paths.len())))
    }

    /// Record a frame that now exists on disk at [`FrameSet::next_path`].
    pub fn push(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Delete every frame and the frame directory. Idempotent.
    pub fn remove_all(&mut self) {
        for frame in self.paths.drain(..) {
            if let Err(e) = std::fs::remove_file(&frame) {
                warn!("Error deleting frame {}: {}", frame.display(), e);
            }
        }
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Error deleting frame directory {}: {}", path.display(), e);
            }
        }
    }
}

impl Drop for FrameSet {
    fn drop(&mut self) {
        self.remove_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn frames_are_numbered_contiguously() {
        let root = tempfile::tempdir().unwrap();
        let mut set = FrameSet::create_in(root.path()).unwrap();
        for _ in 0..3 {
            let path = set.next_path().unwrap();
            std::fs::write(&path, b"png").unwrap();
            set.push(path);
        }
        let names: Vec<_> = set
            .paths()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["frame-0.png", "frame-1.png", "frame-2.png"]);
    }

    #[test]
    fn remove_all_leaves_root_empty() {
        let root = tempfile::tempdir().unwrap();
        let mut set = FrameSet::create_in(root.path()).unwrap();
        let path = set.next_path().unwrap();
        std::fs::write(&path, b"png").unwrap();
        set.push(path);
        assert_eq!(entries(root.path()), 1);

        set.remove_all();
        set.remove_all();
        assert!(set.is_empty());
        assert_eq!(entries(root.path()), 0);
    }

    #[test]
    fn drop_removes_unrecorded_frames_too() {
        let root = tempfile::tempdir().unwrap();
        {
            let set = FrameSet::create_in(root.path()).unwrap();
            // Written but never pushed: capture failed after the write.
            std::fs::write(set.next_path().unwrap(), b"partial").unwrap();
        }
        assert_eq!(entries(root.path()), 0);
    }
}
