//! Core scheduler components.
//!
//! This module contains the building blocks of the cooperative scheduler:
//! - the future arena and its ready-queue,
//! - promises, binds and aggregation combinators,
//! - coroutines and `async` bodies awaiting kiln futures,
//! - the bounded window of running jobs.
//!
//! Everything here runs on the thread that built the scheduler.

mod combinator;
mod core;

pub(crate) mod builder;
pub(crate) mod context;
pub(crate) mod future;
pub(crate) mod job;
pub(crate) mod macros;

pub mod task;

pub use self::core::Scheduler;
pub use builder::{SchedulerBuilder, THREADS_ENV};
pub use future::{Args, Awaitable, Awaiting, Future, Promise};
pub use job::Job;
pub use task::{Coroutine, Resume};
