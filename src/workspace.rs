use crate::error::ViewerError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Staging directory for uploaded archives and their expanded contents.
///
/// Owned by whoever drives the pipeline (usually a [`Session`](crate::session::Session)),
/// not process-global. Nothing is purged between uploads; residue from
/// earlier extractions accumulates until the workspace itself is dropped.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    _tempdir: Option<TempDir>,
}

impl Workspace {
    /// Anchors the workspace at `path`, creating the directory if needed.
    pub fn at(path: impl Into<PathBuf>) -> Result<Self, ViewerError> {
        let root = path.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            _tempdir: None,
        })
    }

    /// Creates a temp-directory-backed workspace that is removed on drop.
    pub fn ephemeral() -> Result<Self, ViewerError> {
        let tempdir = TempDir::with_prefix("cellview_")?;
        Ok(Self {
            root: tempdir.path().to_path_buf(),
            _tempdir: Some(tempdir),
        })
    }

    #[inline(always)]
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.root.join(name)
    }
}
