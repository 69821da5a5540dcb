// src/error.rs

//! Error types for the build driver

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by the build driver.
///
/// The first three classify a single build as unactionable and let the
/// run continue; the child failures are counted per job; `Io` and `Wait`
/// are fatal and terminate the program.
#[derive(Error, Debug)]
pub enum Error {
    /// No on-disk template exists for a referenced package name
    #[error("no template for package '{0}'")]
    TemplateMissing(String),

    /// The dependency walk re-entered a package already on its own stack
    #[error("dependency cycle involving '{0}'")]
    CycleDetected(String),

    /// A dependency file violates the line grammar
    #[error("{}:{}: malformed dependency file", .path.display(), .line)]
    Parse { path: PathBuf, line: usize },

    /// The dependency extractor could not be run for a package
    #[error("dependency extraction failed for '{0}': {1}")]
    ExtractorFailed(String, String),

    /// The package build could not be run for a package
    #[error("build failed for '{0}': {1}")]
    BuildFailed(String, String),

    /// Unexpected filesystem error; anything but ENOENT on the state
    /// trees is unrecoverable
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Waiting for a child process failed
    #[error("waitpid: {0}")]
    Wait(#[source] nix::Error),
}

impl Error {
    pub(crate) fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
