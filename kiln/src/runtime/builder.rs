use super::core::Scheduler;
use crate::log::{BuildLog, ErrorLog};

use std::env;
use std::rc::Rc;
use std::thread;

/// Environment variable overriding the default concurrency limit.
pub const THREADS_ENV: &str = "KILN_THREADS";

/// Builder for configuring and creating a scheduler.
///
/// `SchedulerBuilder` allows customizing the scheduler before it is
/// constructed: how many jobs may run at once and where failures are
/// reported.
///
/// # Examples
///
/// ```rust,ignore
/// let sched = SchedulerBuilder::new()
///     .concurrency_limit(4)
///     .build();
/// ```
pub struct SchedulerBuilder {
    /// Maximum number of jobs running at once.
    concurrency_limit: usize,

    error_log: Option<Rc<dyn ErrorLog>>,
}

impl SchedulerBuilder {
    /// Creates a new `SchedulerBuilder` with default configuration.
    ///
    /// By default, the concurrency limit is set to the number of available
    /// logical CPUs, falling back to `1` if unavailable, and failures go to
    /// a fresh [`BuildLog`].
    pub fn new() -> Self {
        let concurrency_limit = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);

        Self {
            concurrency_limit,
            error_log: None,
        }
    }

    /// Like [`SchedulerBuilder::new`], but honors [`THREADS_ENV`].
    ///
    /// Values that are not a positive integer are ignored.
    pub fn from_env() -> Self {
        let builder = Self::new();

        match env::var(THREADS_ENV).ok().as_deref().and_then(parse_limit) {
            Some(limit) => {
                tracing::debug!(limit, "concurrency limit from {THREADS_ENV}");
                builder.concurrency_limit(limit)
            }
            None => builder,
        }
    }

    /// Sets the maximum number of jobs running at once.
    ///
    /// # Panics
    ///
    /// Panics if `n == 0`.
    pub fn concurrency_limit(mut self, n: usize) -> Self {
        assert!(n > 0, "concurrency_limit must be > 0");

        self.concurrency_limit = n;
        self
    }

    /// Sets the log failures are reported to.
    pub fn error_log<L>(mut self, log: Rc<L>) -> Self
    where
        L: ErrorLog + 'static,
    {
        self.error_log = Some(log);
        self
    }

    /// Builds the scheduler with the configured options.
    pub fn build(self) -> Scheduler {
        let log = self
            .error_log
            .unwrap_or_else(|| Rc::new(BuildLog::new()));

        Scheduler::with_config(self.concurrency_limit, log)
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_limit(raw: &str) -> Option<usize> {
    raw.trim().parse::<usize>().ok().filter(|&n| n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_positive_limits() {
        assert_eq!(parse_limit("4"), Some(4));
        assert_eq!(parse_limit(" 12\n"), Some(12));
    }

    #[test]
    fn rejects_invalid_limits() {
        assert_eq!(parse_limit("0"), None);
        assert_eq!(parse_limit("-3"), None);
        assert_eq!(parse_limit("many"), None);
        assert_eq!(parse_limit(""), None);
    }

    #[test]
    #[should_panic(expected = "concurrency_limit must be > 0")]
    fn zero_limit_panics() {
        let _ = SchedulerBuilder::new().concurrency_limit(0);
    }

    #[test]
    fn builds_with_requested_limit() {
        let sched = SchedulerBuilder::new().concurrency_limit(3).build();
        assert_eq!(sched.concurrency_limit(), 3);
    }
}
