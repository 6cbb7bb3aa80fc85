//! Work attached to pending futures.
//!
//! Every non-trivial future carries a [`Task`] describing what to do once
//! the futures it depends on are done:
//! - forward another future's outcome (satisfied promises),
//! - run a continuation (`bind`),
//! - aggregate several outcomes (`all`, `when_done`, `when_succeeded`),
//! - resume a coroutine.
//!
//! A task runs on the scheduler thread and either finishes with an
//! [`Outcome`] or hands back a new task waiting on other futures.

pub(crate) mod bind;
pub(crate) mod coroutine;

pub(crate) use bind::Bind;
pub(crate) use coroutine::{AsyncBody, Driver};

pub use coroutine::{Coroutine, Resume};

use super::core::Scheduler;
use super::future::Future;
use crate::outcome::{Failure, Outcome, Values};

/// What a ready future does when the scheduler fires it.
pub(crate) enum Task {
    /// Copies the outcome of another future.
    Forward(Future),

    Bind(Bind),

    /// Concatenates positional values and merges keyword values.
    All {
        positional: Vec<Future>,
        named: Vec<(String, Future)>,
    },

    /// Succeeds with no values once every argument is done.
    WhenDone(Vec<Future>),

    /// Like `WhenDone`, but fails with the first failing argument.
    WhenSucceeded(Vec<Future>),

    Coroutine(Driver),
}

/// Result of firing a task.
pub(crate) enum Step {
    Done(Outcome),

    /// Not finished: run this task once its dependencies are done.
    Await(Task),
}

impl Task {
    /// Arena ids of the futures this task waits on.
    pub(crate) fn dependencies(&self) -> Vec<usize> {
        match self {
            Task::Forward(source) => vec![source.id()],
            Task::Bind(bind) => vec![bind.awaiting().id()],
            Task::All { positional, named } => positional
                .iter()
                .chain(named.iter().map(|(_, future)| future))
                .map(Future::id)
                .collect(),
            Task::WhenDone(args) | Task::WhenSucceeded(args) => {
                args.iter().map(Future::id).collect()
            }
            Task::Coroutine(driver) => driver.awaiting().map(Future::id).into_iter().collect(),
        }
    }

    /// Runs the task. Every dependency is done at this point.
    pub(crate) fn fire(self, sched: &Scheduler) -> Step {
        match self {
            Task::Forward(source) => Step::Done(source.outcome()),
            Task::Bind(bind) => bind.fire(sched),
            Task::All { positional, named } => Step::Done(aggregate(&positional, &named)),
            Task::WhenDone(_) => Step::Done(Outcome::Success(Values::new())),
            Task::WhenSucceeded(args) => Step::Done(succeeded(&args)),
            Task::Coroutine(driver) => driver.fire(sched),
        }
    }
}

/// The first failure among `args`, in argument order.
fn first_failure<'a>(args: impl IntoIterator<Item = &'a Future>) -> Option<Failure> {
    args.into_iter().find_map(|future| match future.outcome() {
        Outcome::Failure(failure) => Some(failure),
        Outcome::Success(_) => None,
    })
}

/// Outcome of `all` over done futures.
///
/// # Panics
///
/// Panics if a keyword future produced more than one positional value.
pub(crate) fn aggregate(positional: &[Future], named: &[(String, Future)]) -> Outcome {
    let everything = positional.iter().chain(named.iter().map(|(_, future)| future));
    if let Some(failure) = first_failure(everything) {
        return Outcome::Failure(failure);
    }

    let mut values = Values::new();

    for future in positional {
        if let Outcome::Success(produced) = future.outcome() {
            values.extend(&produced);
        }
    }

    for (key, future) in named {
        if let Outcome::Success(produced) = future.outcome() {
            values.insert(key.clone(), produced.into_single());
        }
    }

    Outcome::Success(values)
}

/// Outcome of `when_succeeded` over done futures.
pub(crate) fn succeeded(args: &[Future]) -> Outcome {
    match first_failure(args) {
        Some(failure) => Outcome::Failure(failure),
        None => Outcome::Success(Values::new()),
    }
}
