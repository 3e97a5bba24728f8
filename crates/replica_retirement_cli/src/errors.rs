use std::io;

use thiserror::Error;

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;

/// Errors that can end a command-line run.
#[derive(Error, Debug)]
pub enum Error {
    /// The current working directory, which anchors every relative path,
    /// could not be determined.
    #[error("Failed to determine the working directory: {0}")]
    WorkingDirectory(io::Error),

    /// The retirement job failed.
    #[error(transparent)]
    Job(#[from] replica_retirement::Error),
}
