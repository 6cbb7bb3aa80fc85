use super::context;
use super::core::{Inner, Scheduler};
use super::task::Coroutine;
use crate::outcome::{Failure, Outcome, Value, Values};

use std::any::Any;
use std::fmt;
use std::pin::Pin;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

/// Handle to an eventual [`Outcome`].
///
/// Cloning a handle is cheap. The underlying slot is freed once the future
/// is done and its last handle is dropped. Handles do not keep the
/// scheduler alive.
pub struct Future {
    id: usize,
    sched: Weak<Inner>,
}

impl Future {
    pub(crate) fn attach(inner: &Rc<Inner>, id: usize) -> Self {
        inner.retain(id);

        Self {
            id,
            sched: Rc::downgrade(inner),
        }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    fn inner(&self) -> Rc<Inner> {
        self.sched
            .upgrade()
            .unwrap_or_else(|| panic!("future #{} outlived its scheduler", self.id))
    }

    /// The scheduler this future belongs to.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler {
            inner: self.inner(),
        }
    }

    /// Whether the outcome is available.
    pub fn is_ready(&self) -> bool {
        self.inner().is_done(self.id)
    }

    /// The outcome, if the future is done.
    pub fn try_outcome(&self) -> Option<Outcome> {
        self.inner().outcome(self.id)
    }

    /// The outcome of a done future.
    ///
    /// # Panics
    ///
    /// Panics if the future is still pending. Use [`Future::wait`] to drive
    /// it to completion first.
    pub fn outcome(&self) -> Outcome {
        self.try_outcome()
            .unwrap_or_else(|| panic!("outcome of future #{} requested before it is ready", self.id))
    }

    /// The values of a done future, or its failure.
    pub fn values(&self) -> Result<Values, Failure> {
        self.outcome().into_result()
    }

    /// The first positional value of a done future.
    pub fn value(&self) -> Result<Option<Value>, Failure> {
        Ok(self.values()?.value().cloned())
    }

    /// The first positional value of a done future, downcast to `T`.
    pub fn get<T: Any + Clone>(&self) -> Result<T, Failure> {
        self.outcome().get()
    }

    /// Surfaces the failure of a done future, discarding its values.
    pub fn explode(&self) -> Result<(), Failure> {
        self.outcome().explode()
    }

    /// Drives the scheduler until this future is done.
    pub fn wait(&self) -> Outcome {
        self.scheduler().wait(self)
    }

    /// Chains `f` after this future succeeds.
    ///
    /// `f` receives the values and returns anything future-like; the bound
    /// future resolves to that. A failure of this future skips `f` and is
    /// propagated unchanged, as is an `Err` returned by `f`.
    pub fn bind<F, A>(&self, f: F) -> Future
    where
        F: FnOnce(Values) -> Result<A, Failure> + 'static,
        A: Into<Awaitable>,
    {
        self.bind_outcome(move |outcome| match outcome {
            Outcome::Success(values) => f(values),
            Outcome::Failure(failure) => Err(failure),
        })
    }

    /// Chains `f` after this future, whatever its outcome.
    pub fn bind_outcome<F, A>(&self, f: F) -> Future
    where
        F: FnOnce(Outcome) -> Result<A, Failure> + 'static,
        A: Into<Awaitable>,
    {
        self.scheduler().bind_outcome(self.clone(), move |outcome| {
            f(outcome).map(Into::into)
        })
    }
}

impl Clone for Future {
    fn clone(&self) -> Self {
        match self.sched.upgrade() {
            Some(inner) => Self::attach(&inner, self.id),
            None => Self {
                id: self.id,
                sched: self.sched.clone(),
            },
        }
    }
}

impl Drop for Future {
    fn drop(&mut self) {
        // The arena goes away with the scheduler.
        if let Some(inner) = self.sched.upgrade() {
            inner.release(self.id);
        }
    }
}

impl fmt::Debug for Future {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.sched.upgrade() {
            Some(inner) if inner.is_done(self.id) => "done",
            Some(_) => "pending",
            None => "detached",
        };

        f.debug_struct("Future")
            .field("id", &self.id)
            .field("state", &state)
            .finish()
    }
}

/// `.await` on a kiln future inside [`Scheduler::spawn`].
///
/// Resolves to the future's values or its failure.
pub struct Awaiting {
    future: Future,
}

impl std::future::Future for Awaiting {
    type Output = Result<Values, Failure>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(outcome) = self.future.try_outcome() {
            return Poll::Ready(outcome.into_result());
        }

        context::park(self.future.clone());
        Poll::Pending
    }
}

impl std::future::IntoFuture for Future {
    type Output = Result<Values, Failure>;
    type IntoFuture = Awaiting;

    fn into_future(self) -> Awaiting {
        Awaiting { future: self }
    }
}

impl std::future::IntoFuture for &Future {
    type Output = Result<Values, Failure>;
    type IntoFuture = Awaiting;

    fn into_future(self) -> Awaiting {
        Awaiting {
            future: self.clone(),
        }
    }
}

/// Write side of a future that is satisfied explicitly.
///
/// A promise is satisfied exactly once, with anything future-like.
#[derive(Clone, Debug)]
pub struct Promise {
    future: Future,
}

impl Promise {
    pub(crate) fn new(future: Future) -> Self {
        Self { future }
    }

    /// The read side of this promise.
    pub fn future(&self) -> Future {
        self.future.clone()
    }

    /// Whether [`Promise::satisfy`] was already called.
    pub fn is_satisfied(&self) -> bool {
        !self.future.inner().is_unsatisfied(self.future.id)
    }

    /// Resolves the promise to `value`.
    ///
    /// When `value` is itself pending the promise resolves once it does.
    ///
    /// # Panics
    ///
    /// Panics if the promise was already satisfied.
    pub fn satisfy(&self, value: impl Into<Awaitable>) {
        let sched = self.future.scheduler();
        let source = sched.lift(value.into());

        sched.inner.satisfy_promise(self.future.id, source);
    }
}

/// Anything a future can be built from.
pub enum Awaitable {
    /// An outcome known right now.
    Outcome(Outcome),

    /// Another future.
    Future(Future),

    /// A resumable computation, driven to completion by the scheduler.
    Coroutine(Box<dyn Coroutine>),
}

impl From<Future> for Awaitable {
    fn from(future: Future) -> Self {
        Self::Future(future)
    }
}

impl From<&Future> for Awaitable {
    fn from(future: &Future) -> Self {
        Self::Future(future.clone())
    }
}

impl From<Outcome> for Awaitable {
    fn from(outcome: Outcome) -> Self {
        Self::Outcome(outcome)
    }
}

impl From<Values> for Awaitable {
    fn from(values: Values) -> Self {
        Self::Outcome(Outcome::Success(values))
    }
}

impl From<Value> for Awaitable {
    fn from(value: Value) -> Self {
        Self::Outcome(Outcome::Success(Values::new().with(value)))
    }
}

impl From<Failure> for Awaitable {
    fn from(failure: Failure) -> Self {
        Self::Outcome(Outcome::Failure(failure))
    }
}

impl From<()> for Awaitable {
    fn from(_: ()) -> Self {
        Self::Outcome(Outcome::Success(Values::new()))
    }
}

impl From<Box<dyn Coroutine>> for Awaitable {
    fn from(machine: Box<dyn Coroutine>) -> Self {
        Self::Coroutine(machine)
    }
}

impl fmt::Debug for Awaitable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outcome(outcome) => f.debug_tuple("Outcome").field(outcome).finish(),
            Self::Future(future) => f.debug_tuple("Future").field(future).finish(),
            Self::Coroutine(_) => f.write_str("Coroutine(..)"),
        }
    }
}

/// Positional and keyword arguments for [`Scheduler::futurize`].
///
/// Arguments may mix plain values and futures.
#[derive(Debug, Default)]
pub struct Args {
    pub(crate) positional: Vec<Awaitable>,
    pub(crate) named: Vec<(String, Awaitable)>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a positional argument.
    pub fn arg(mut self, arg: impl Into<Awaitable>) -> Self {
        self.positional.push(arg.into());
        self
    }

    /// Adds a plain positional value.
    pub fn value<T: Any>(self, value: T) -> Self {
        self.arg(Value::new(value))
    }

    /// Adds a keyword argument.
    ///
    /// A keyword future must produce at most one positional value.
    pub fn named(mut self, key: impl Into<String>, arg: impl Into<Awaitable>) -> Self {
        self.named.push((key.into(), arg.into()));
        self
    }

    /// Adds a plain keyword value.
    pub fn named_value<T: Any>(self, key: impl Into<String>, value: T) -> Self {
        self.named(key, Value::new(value))
    }
}
