//! # Kiln
//!
//! **Kiln** is the execution core of a build tool: a cooperative
//! future/promise scheduler that drives long chains of dependent build
//! actions, and a process engine that runs compilers and other tools on
//! pseudo-terminals without deadlocking on their output.
//!
//! Kiln is deliberately single-threaded where it can be. Every future,
//! continuation and coroutine runs on the thread that built the
//! [`Scheduler`]; real parallelism only comes from [`Job`]s, at most
//! `concurrency_limit` of them at a time, such as child processes started
//! with [`launch`].
//!
//! - **Futures** with `bind`, `all`, `when_done`, `when_succeeded` and
//!   [`futurize!`]
//! - **Coroutines**, either explicit state machines or `async` blocks that
//!   `.await` kiln futures
//! - A **FIFO critical section** for coroutines
//! - **Process execution** on pseudo-terminals, multiplexed by one
//!   background I/O thread
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use kiln::{launch, LaunchOptions, Scheduler};
//!
//! let sched = Scheduler::builder().concurrency_limit(4).build();
//!
//! let version = launch(&sched, ["cc", "--version"], LaunchOptions::new().capture_stdout(true));
//! let banner = version.bind(|values| {
//!     let text = values.get::<String>(0).unwrap_or_default();
//!     Ok(kiln::Values::of(text.lines().next().unwrap_or("").to_owned()))
//! });
//!
//! println!("{}", sched.force(&banner)?.get::<String>(0).unwrap());
//! ```
//!
//! ## Modules
//!
//! - [`process`] — Child process execution
//! - [`sync`] — Critical sections for coroutines

mod error;
mod log;
mod outcome;
mod reactor;
mod runtime;
mod utils;

pub mod process;
pub mod sync;

pub use error::{Error, Result};
pub use log::{BuildLog, ErrorLog, LogEntry};
pub use outcome::{Failure, Outcome, Value, Values};
pub use process::{LaunchOptions, ProcessOutput, launch};
pub use runtime::{
    Args, Awaitable, Awaiting, Coroutine, Future, Job, Promise, Resume, Scheduler,
    SchedulerBuilder, THREADS_ENV,
};
pub use sync::{CriticalSection, Releaser};
