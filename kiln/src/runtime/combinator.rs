use super::core::Scheduler;
use super::future::{Args, Awaitable, Future, Promise};
use super::task::{self, AsyncBody, Bind, Coroutine, Driver, Task};
use crate::outcome::{Failure, Outcome, Values};

use std::any::Any;

impl Scheduler {
    /// A future that is already done with `outcome`.
    pub fn done(&self, outcome: impl Into<Outcome>) -> Future {
        self.inner.done(outcome.into())
    }

    /// A future that already succeeded with the single value `value`.
    pub fn ready<T: Any>(&self, value: T) -> Future {
        self.done(Values::of(value))
    }

    /// A future that already failed.
    pub fn failed(&self, failure: impl Into<Failure>) -> Future {
        self.done(Outcome::Failure(failure.into()))
    }

    /// A fresh promise and the future it satisfies.
    pub fn promise(&self) -> Promise {
        Promise::new(self.inner.promise())
    }

    /// Turns anything future-like into a future.
    ///
    /// Futures pass through unchanged; outcomes become done futures and
    /// coroutines are started.
    pub fn lift(&self, awaitable: Awaitable) -> Future {
        match awaitable {
            Awaitable::Future(future) => future,
            Awaitable::Outcome(outcome) => self.inner.done(outcome),
            Awaitable::Coroutine(machine) => self.inner.fresh(Task::Coroutine(Driver::new(machine))),
        }
    }

    /// Bundles a mix of plain values and futures into one future.
    ///
    /// Positional arguments contribute their values in order; each keyword
    /// argument contributes exactly one keyword value. The result fails
    /// with the first failing argument, positional ones first.
    pub fn futurize(&self, args: Args) -> Future {
        let positional = args
            .positional
            .into_iter()
            .map(|arg| self.lift(arg))
            .collect();
        let named = args
            .named
            .into_iter()
            .map(|(key, arg)| (key, self.lift(arg)))
            .collect();

        self.join_all(positional, named)
    }

    /// Concatenation of every argument's values, in argument order.
    ///
    /// Fails with the first failing argument.
    pub fn all<I>(&self, futures: I) -> Future
    where
        I: IntoIterator,
        I::Item: Into<Awaitable>,
    {
        let positional = self.lift_all(futures);
        self.join_all(positional, Vec::new())
    }

    /// Succeeds with no values once every argument is done, even if some
    /// failed.
    pub fn when_done<I>(&self, futures: I) -> Future
    where
        I: IntoIterator,
        I::Item: Into<Awaitable>,
    {
        let args = self.lift_all(futures);

        if args.iter().all(Future::is_ready) {
            return self.done(Values::new());
        }

        self.inner.fresh(Task::WhenDone(args))
    }

    /// Succeeds with no values once every argument succeeded; fails with
    /// the first failure in argument order otherwise.
    pub fn when_succeeded<I>(&self, futures: I) -> Future
    where
        I: IntoIterator,
        I::Item: Into<Awaitable>,
    {
        let args = self.lift_all(futures);

        if args.iter().all(Future::is_ready) {
            return self.done(task::succeeded(&args));
        }

        self.inner.fresh(Task::WhenSucceeded(args))
    }

    /// Starts a coroutine. The returned future resolves to what it finishes
    /// with.
    pub fn coroutine<C>(&self, machine: C) -> Future
    where
        C: Coroutine + 'static,
    {
        self.lift(Awaitable::Coroutine(Box::new(machine)))
    }

    /// Runs an `async` body on the scheduler.
    ///
    /// The body may `.await` kiln futures (and only those). It starts the
    /// next time the ready queue is drained, which is immediately unless the
    /// caller is itself running on the scheduler.
    ///
    /// # Examples
    ///
    /// ```rust,ignore
    /// let doubled = sched.spawn({
    ///     let input = input.clone();
    ///     async move {
    ///         let values = input.await?;
    ///         Ok(values.get::<i32>(0).unwrap_or(0) * 2)
    ///     }
    /// });
    /// ```
    pub fn spawn<F, T>(&self, body: F) -> Future
    where
        F: std::future::Future<Output = Result<T, Failure>> + 'static,
        T: Into<Values>,
    {
        self.coroutine(AsyncBody::new(async move {
            let result: Result<Values, Failure> = body.await.map(Into::into);
            Outcome::from(result)
        }))
    }

    pub(crate) fn bind_outcome<F>(&self, input: Future, continuation: F) -> Future
    where
        F: FnOnce(Outcome) -> Result<Awaitable, Failure> + 'static,
    {
        self.inner
            .fresh(Task::Bind(Bind::new(input, Box::new(continuation))))
    }

    fn lift_all<I>(&self, futures: I) -> Vec<Future>
    where
        I: IntoIterator,
        I::Item: Into<Awaitable>,
    {
        futures
            .into_iter()
            .map(|arg| self.lift(arg.into()))
            .collect()
    }

    fn join_all(&self, positional: Vec<Future>, named: Vec<(String, Future)>) -> Future {
        let settled = positional
            .iter()
            .chain(named.iter().map(|(_, future)| future))
            .all(Future::is_ready);

        if settled {
            return self.done(task::aggregate(&positional, &named));
        }

        self.inner.fresh(Task::All { positional, named })
    }
}
