//! Scoped extraction directories for git dependency archives.

use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::info;

use crate::error::{Error, Result};

/// A temporary directory holding an extracted git archive.
///
/// Removed on drop unless created with `retain = true`, in which case the
/// directory is left on disk and its location logged.
#[derive(Debug)]
pub struct WorkDir {
    dir: Option<tempfile::TempDir>,
    path: PathBuf,
    retain: bool,
}

impl WorkDir {
    pub fn new(retain: bool) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("lockstash-git-")
            .tempdir()
            .map_err(|e| Error::io("creating", std::env::temp_dir(), e))?;
        let path = dir.path().to_path_buf();
        Ok(Self {
            dir: Some(dir),
            path,
            retain,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unpack gzip'd tar bytes into this directory, stripping the first path component.
    pub fn extract(&self, archive: &[u8]) -> Result<()> {
        extract_tarball_to_dir(archive, &self.path)
    }
}

impl Drop for WorkDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if self.retain {
                let kept = dir.keep();
                info!(path = %kept.display(), "keeping git work directory");
            }
        }
    }
}

/// Extract .tar.gz bytes into dest_dir, stripping one top-level directory.
pub fn extract_tarball_to_dir(archive: &[u8], dest_dir: &Path) -> Result<()> {
    let archive_err = |reason: String| Error::Archive {
        path: dest_dir.to_path_buf(),
        reason,
    };

    let mut archive = Archive::new(GzDecoder::new(Cursor::new(archive)));
    std::fs::create_dir_all(dest_dir).map_err(|e| Error::io("creating", dest_dir, e))?;

    for entry in archive.entries().map_err(|e| archive_err(e.to_string()))? {
        let mut entry = entry.map_err(|e| archive_err(e.to_string()))?;
        let path = entry.path().map_err(|e| archive_err(e.to_string()))?;
        let rel: PathBuf = path.components().skip(1).collect();
        if rel.as_os_str().is_empty() {
            continue;
        }
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
        {
            return Err(archive_err(format!("entry escapes archive root: {}", path.display())));
        }
        let out_path = dest_dir.join(&rel);
        if entry.header().entry_type().is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|e| Error::io("creating", &out_path, e))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io("creating", parent, e))?;
        }
        entry
            .unpack(&out_path)
            .map_err(|e| archive_err(format!("{}: {}", rel.display(), e)))?;
    }
    Ok(())
}
