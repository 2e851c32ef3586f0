use std::path::PathBuf;
use thiserror::Error;

/// Failure modes of a site-permutation run.
///
/// A Metropolis rejection is never an error; it is an ordinary branch of the
/// annealing loop. Everything here terminates the run.
#[derive(Debug, Error)]
pub enum SpsError {
    /// Malformed input detected before any energy evaluation.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The trajectory file is already present. It is left untouched.
    #[error("file {} already exists, will not overwrite", .0.display())]
    OutputExists(PathBuf),

    /// The energy oracle failed. Not retried.
    #[error("energy oracle failed: {0:#}")]
    Oracle(#[source] anyhow::Error),

    /// Internal consistency violation in an occupation (a bug, not user input).
    #[error("invalid occupation: {0}")]
    InvalidOccupation(String),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SpsError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        SpsError::Configuration(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpsError::Io {
            path: path.into(),
            source,
        }
    }

    /// True for failures raised during input validation.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SpsError::Configuration(_) | SpsError::OutputExists(_))
    }
}

pub type SpsResult<T> = Result<T, SpsError>;
