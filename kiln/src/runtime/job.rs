use super::future::Promise;
use crate::error::Error;
use crate::outcome::Values;

use std::collections::VecDeque;

/// Work running outside the scheduler thread.
///
/// A job starts when its factory returns it. The scheduler only ever
/// blocks on [`Job::join`] when nothing else can make progress, and joins
/// jobs in start order.
pub trait Job {
    /// Blocks until the job is finished and returns its result.
    fn join(self: Box<Self>) -> Result<Values, Error>;

    /// Asks the job to stop early. A cancelled job must still be joinable.
    fn cancel(&mut self);
}

pub(crate) type JobFactory = Box<dyn FnOnce() -> Result<Box<dyn Job>, Error>>;

/// The concurrency window.
#[derive(Default)]
pub(crate) struct JobQueue {
    /// Started jobs, oldest first.
    pub(crate) running: VecDeque<(Box<dyn Job>, Promise)>,

    /// Factories waiting for a running slot, in submission order.
    pub(crate) queued: VecDeque<(JobFactory, Promise)>,
}

impl JobQueue {
    pub(crate) fn cancel_running(&mut self) {
        if !self.running.is_empty() {
            tracing::debug!(jobs = self.running.len(), "cancelling running jobs");
        }

        for (job, _) in self.running.iter_mut() {
            job.cancel();
        }
    }
}
