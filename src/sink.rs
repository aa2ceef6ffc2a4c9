//! Output storage
//!
//! The pipeline never touches the filesystem directly. It hands relative
//! paths and bytes to a [`Sink`], which decides where they end up.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Destination for downloaded videos and subtitle files
pub trait Sink: Send + Sync {
    /// Opens a writer for `relative`, creating parent directories as needed.
    fn create(&self, relative: &Path) -> io::Result<Box<dyn Write + Send>>;

    /// Writes a complete buffer to `relative` and returns the resolved path.
    fn write_bytes(&self, relative: &Path, bytes: &[u8]) -> io::Result<PathBuf>;

    /// Returns where `relative` is stored, for display purposes.
    fn resolve(&self, relative: &Path) -> PathBuf;
}

/// Sink writing below a root directory on the local filesystem
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
}

impl FsSink {
    /// Creates a sink rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The root directory of this sink
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn prepare(&self, relative: &Path) -> io::Result<PathBuf> {
        let path = self.resolve(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(path)
    }
}

impl Sink for FsSink {
    fn create(&self, relative: &Path) -> io::Result<Box<dyn Write + Send>> {
        let path = self.prepare(relative)?;
        Ok(Box::new(BufWriter::new(File::create(path)?)))
    }

    fn write_bytes(&self, relative: &Path, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.prepare(relative)?;
        fs::write(&path, bytes)?;
        Ok(path)
    }

    fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}
