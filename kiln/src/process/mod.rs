//! Asynchronous execution of child processes.
//!
//! Children run against pseudo-terminals so their color codes survive.
//! Their completion is delivered through a [`Future`](crate::Future) and
//! failures are reported to the scheduler's [`ErrorLog`](crate::ErrorLog).

mod job;
mod launch;
mod options;
mod spawn;

pub use job::ProcessOutput;
pub use launch::launch;
pub use options::LaunchOptions;

use crate::reactor::Multiplexer;

/// Stops the background I/O thread once its current streams are finished.
///
/// Blocks until the thread has exited. Launching another process restarts
/// it. Call this before process exit.
pub fn shutdown() {
    if let Some(multiplexer) = Multiplexer::existing() {
        multiplexer.shutdown();
    }
}
