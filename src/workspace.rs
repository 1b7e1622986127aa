//! Scratch directory of a single sort run.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Scratch directory holding every intermediate chunk file of one sort run.
///
/// A workspace is never shared between concurrent runs. It is removed by [`Workspace::destroy`] once the
/// sorted output has been fully written; a failed run leaves it in place for inspection.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    /// Creates a workspace handle for the given directory. Nothing is created on disk until [`Workspace::ensure`].
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Workspace { root: root.into() }
    }

    /// Creates a uniquely named workspace directory (`<prefix>-XXXXXX`) inside `base`.
    pub fn unique_in(base: &Path, prefix: &str) -> io::Result<Self> {
        let tmp_dir = tempfile::Builder::new()
            .prefix(&format!("{}-", prefix))
            .tempdir_in(base)?;

        // the directory outlives the guard; removal is driven by `destroy` on the success path only
        return Ok(Workspace {
            root: tmp_dir.keep(),
        });
    }

    /// Creates the directory if it does not exist yet.
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }

    /// Recursively removes the directory and its content. An already absent directory is not an error.
    pub fn destroy(&self) -> io::Result<()> {
        match fs::remove_dir_all(&self.root) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }

    /// Returns the path of a workspace file.
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
