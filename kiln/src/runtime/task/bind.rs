use super::{Step, Task};
use crate::outcome::{Failure, Outcome};
use crate::runtime::core::Scheduler;
use crate::runtime::future::{Awaitable, Future};

/// Continuation run on the outcome of a bound future.
pub(crate) type Continuation = Box<dyn FnOnce(Outcome) -> Result<Awaitable, Failure>>;

/// A continuation chained after a future.
///
/// Runs in two stages: first wait for the input and call the continuation
/// on it, then wait for whatever the continuation returned.
pub(crate) struct Bind {
    stage: Stage,
}

enum Stage {
    AwaitingInput {
        input: Future,
        continuation: Continuation,
    },
    AwaitingResult {
        result: Future,
    },
}

impl Bind {
    pub(crate) fn new(input: Future, continuation: Continuation) -> Self {
        Self {
            stage: Stage::AwaitingInput {
                input,
                continuation,
            },
        }
    }

    pub(crate) fn awaiting(&self) -> &Future {
        match &self.stage {
            Stage::AwaitingInput { input, .. } => input,
            Stage::AwaitingResult { result } => result,
        }
    }

    pub(crate) fn fire(self, sched: &Scheduler) -> Step {
        match self.stage {
            Stage::AwaitingInput {
                input,
                continuation,
            } => {
                let outcome = input.outcome();
                drop(input);

                let result = match continuation(outcome) {
                    Ok(next) => sched.lift(next),
                    Err(failure) => return Step::Done(Outcome::Failure(failure)),
                };

                match result.try_outcome() {
                    Some(outcome) => Step::Done(outcome),
                    None => Step::Await(Task::Bind(Bind {
                        stage: Stage::AwaitingResult { result },
                    })),
                }
            }
            Stage::AwaitingResult { result } => Step::Done(result.outcome()),
        }
    }
}
