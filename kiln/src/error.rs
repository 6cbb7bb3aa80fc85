//! Error types carried through failed outcomes.
//!
//! Only recoverable, build-time conditions are represented here. Misuse of
//! the scheduler itself (waiting on a future that can never complete,
//! satisfying a promise twice, reading a pending future) panics instead.

use std::io;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors that can end up inside a failed [`Outcome`](crate::Outcome).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A continuation or coroutine raised an application error.
    #[error(transparent)]
    Value(#[from] anyhow::Error),

    /// A launched process exited with a non-zero status.
    #[error("command `{command}` failed")]
    ProcessAbort {
        /// The command line, space separated.
        command: String,
        /// Everything the process wrote to its terminal.
        stderr: String,
    },

    /// The process could not be started at all.
    #[error("failed to launch `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    /// The child could not be waited for after it started.
    #[error("failed to wait for `{command}`")]
    Wait {
        command: String,
        #[source]
        source: io::Error,
    },

    /// An operating system call failed while driving a job.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Builds an application error from a message.
    pub fn msg<M>(message: M) -> Self
    where
        M: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        Error::Value(anyhow::Error::msg(message))
    }

    /// Returns `true` for errors that were already reported to the error log
    /// where they happened.
    pub(crate) fn is_reported(&self) -> bool {
        matches!(
            self,
            Error::ProcessAbort { .. } | Error::Spawn { .. } | Error::Wait { .. }
        )
    }
}
