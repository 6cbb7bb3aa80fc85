use super::{Step, Task};
use crate::outcome::{Outcome, Values};
use crate::runtime::context;
use crate::runtime::core::Scheduler;
use crate::runtime::future::{Awaitable, Future};

use std::pin::Pin;
use std::task::{Context, Poll, Waker};

/// A resumable computation that suspends on futures.
///
/// The scheduler calls [`Coroutine::resume`] with the outcome of whatever
/// the previous step yielded (an empty success on the first call). Each
/// call either yields the next thing to wait on or finishes.
pub trait Coroutine {
    fn resume(&mut self, sched: &Scheduler, input: Outcome) -> Resume;
}

/// What a [`Coroutine`] step produced.
pub enum Resume {
    /// Suspend until this is done, then resume with its outcome.
    Yield(Awaitable),

    /// The coroutine is over.
    Finished(Outcome),
}

/// Drives a [`Coroutine`] from one suspension to the next.
pub(crate) struct Driver {
    machine: Box<dyn Coroutine>,
    awaiting: Option<Future>,
}

impl Driver {
    pub(crate) fn new(machine: Box<dyn Coroutine>) -> Self {
        Self {
            machine,
            awaiting: None,
        }
    }

    pub(crate) fn awaiting(&self) -> Option<&Future> {
        self.awaiting.as_ref()
    }

    pub(crate) fn fire(self, sched: &Scheduler) -> Step {
        let Driver {
            mut machine,
            awaiting,
        } = self;

        let mut input = awaiting.map_or_else(|| Outcome::Success(Values::new()), |f| f.outcome());

        loop {
            match machine.resume(sched, input) {
                Resume::Finished(outcome) => return Step::Done(outcome),
                Resume::Yield(next) => {
                    let next = sched.lift(next);

                    match next.try_outcome() {
                        Some(outcome) => input = outcome,
                        None => {
                            return Step::Await(Task::Coroutine(Driver {
                                machine,
                                awaiting: Some(next),
                            }));
                        }
                    }
                }
            }
        }
    }
}

/// Runs an `async` body as a coroutine.
///
/// The body is polled with a no-op waker. Every suspension must come from
/// awaiting a kiln [`Future`], which records itself in the driver context;
/// the driver then waits on it and polls again once it is done.
pub(crate) struct AsyncBody {
    body: Pin<Box<dyn std::future::Future<Output = Outcome>>>,
}

impl AsyncBody {
    pub(crate) fn new<F>(body: F) -> Self
    where
        F: std::future::Future<Output = Outcome> + 'static,
    {
        Self {
            body: Box::pin(body),
        }
    }
}

impl Coroutine for AsyncBody {
    fn resume(&mut self, _sched: &Scheduler, _input: Outcome) -> Resume {
        let mut cx = Context::from_waker(Waker::noop());

        let (poll, awaited) = context::enter_driver(|| self.body.as_mut().poll(&mut cx));

        match poll {
            Poll::Ready(outcome) => Resume::Finished(outcome),
            Poll::Pending => {
                let future = awaited.unwrap_or_else(|| {
                    panic!("spawned body suspended on something other than a kiln future")
                });

                Resume::Yield(Awaitable::Future(future))
            }
        }
    }
}
