//! Child process I/O multiplexing.
//!
//! This module implements the single background thread servicing the
//! streams of every running child process:
//! - reading pseudo-terminal and stdout pipes to end of file,
//! - feeding stdin in bounded chunks,
//! - releasing each job's completion latch once all its streams finish.
//!
//! It runs independently from the scheduler, which only ever blocks on a
//! job's latch when it has nothing else to do.

mod core;

pub(crate) mod event;
pub(crate) mod io;
pub(crate) mod poller;

pub(crate) use self::core::Multiplexer;
