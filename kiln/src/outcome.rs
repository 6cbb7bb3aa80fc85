//! Terminal payloads of futures.
//!
//! An [`Outcome`] is either a success carrying [`Values`] (a positional list
//! plus a keyword map) or a [`Failure`] carrying an [`Error`] and the
//! backtrace captured where it was raised.

use crate::error::Error;

use std::any::Any;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::sync::Arc;

/// A dynamically typed, cheaply clonable value.
///
/// Values stay on the scheduler thread, so they are reference counted
/// with `Rc` and may hold handles such as futures or releasers.
#[derive(Clone)]
pub struct Value(Rc<dyn Any>);

impl Value {
    pub fn new<T: Any>(value: T) -> Self {
        Self(Rc::new(value))
    }

    /// The value supplied for a keyword future that produced nothing.
    pub fn unit() -> Self {
        Self::new(())
    }

    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn is_unit(&self) -> bool {
        self.is::<()>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        macro_rules! try_debug {
            ($($ty:ty),*) => {
                $(
                    if let Some(v) = self.downcast_ref::<$ty>() {
                        return f.debug_tuple("Value").field(v).finish();
                    }
                )*
            };
        }

        try_debug!((), bool, i32, i64, u32, u64, usize, String, &'static str, Vec<u8>);
        f.write_str("Value(..)")
    }
}

/// The success payload of a future: positional values and keyword values.
#[derive(Clone, Debug, Default)]
pub struct Values {
    positional: Vec<Value>,
    named: BTreeMap<String, Value>,
}

impl Values {
    pub fn new() -> Self {
        Self::default()
    }

    /// A payload holding exactly one positional value.
    pub fn of<T: Any>(value: T) -> Self {
        Self::from(Value::new(value))
    }

    pub fn with(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    pub fn with_named(mut self, key: impl Into<String>, value: Value) -> Self {
        self.named.insert(key.into(), value);
        self
    }

    pub fn push(&mut self, value: Value) {
        self.positional.push(value);
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.named.insert(key.into(), value);
    }

    pub fn positional(&self) -> &[Value] {
        &self.positional
    }

    pub fn named(&self) -> &BTreeMap<String, Value> {
        &self.named
    }

    pub fn get_named(&self, key: &str) -> Option<&Value> {
        self.named.get(key)
    }

    /// The first positional value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.positional.first()
    }

    /// Clones out the positional value at `index` if it has type `T`.
    pub fn get<T: Any + Clone>(&self, index: usize) -> Option<T> {
        self.positional.get(index)?.downcast_ref::<T>().cloned()
    }

    pub fn len(&self) -> usize {
        self.positional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positional.is_empty() && self.named.is_empty()
    }

    /// Appends `other`'s positional values and merges its keyword values.
    ///
    /// On a key collision the value from `other` wins.
    pub(crate) fn extend(&mut self, other: &Values) {
        self.positional.extend(other.positional.iter().cloned());
        self.named
            .extend(other.named.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Collapses a keyword future's payload into the single value it supplies.
    ///
    /// # Panics
    ///
    /// Panics if the payload has more than one positional value or any
    /// keyword values: such a future cannot stand for a single keyword.
    pub(crate) fn into_single(self) -> Value {
        assert!(
            self.positional.len() <= 1 && self.named.is_empty(),
            "a keyword future must produce at most one positional value"
        );

        self.positional.into_iter().next().unwrap_or_else(Value::unit)
    }
}

impl From<Value> for Values {
    fn from(value: Value) -> Self {
        Values {
            positional: vec![value],
            named: BTreeMap::new(),
        }
    }
}

impl From<()> for Values {
    fn from(_: ()) -> Self {
        Values::new()
    }
}

macro_rules! values_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Values {
                fn from(value: $ty) -> Self {
                    Values::of(value)
                }
            }
        )*
    };
}

values_from!(bool, i32, i64, u32, u64, usize, String, &'static str, Vec<u8>);

/// A failed outcome: the error plus the backtrace captured when it was raised.
#[derive(Clone)]
pub struct Failure {
    error: Arc<Error>,
    trace: Option<Arc<Backtrace>>,
}

impl Failure {
    pub fn new(error: impl Into<Error>) -> Self {
        let trace = Backtrace::capture();
        let trace = match trace.status() {
            BacktraceStatus::Captured => Some(Arc::new(trace)),
            _ => None,
        };

        Self {
            error: Arc::new(error.into()),
            trace,
        }
    }

    /// Builds an application failure from a message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self::new(Error::msg(message))
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    pub fn trace(&self) -> Option<&Backtrace> {
        self.trace.as_deref()
    }

    pub fn is_process_abort(&self) -> bool {
        matches!(*self.error, Error::ProcessAbort { .. })
    }

    /// Returns `true` if both failures share the same underlying error.
    pub fn same_error(&self, other: &Failure) -> bool {
        Arc::ptr_eq(&self.error, &other.error)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&*self.error)
    }
}

impl From<Error> for Failure {
    fn from(error: Error) -> Self {
        Failure::new(error)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(error: anyhow::Error) -> Self {
        Failure::new(Error::Value(error))
    }
}

impl From<io::Error> for Failure {
    fn from(error: io::Error) -> Self {
        Failure::new(Error::Io(error))
    }
}

/// The terminal state of a future.
#[derive(Clone, Debug)]
pub enum Outcome {
    Success(Values),
    Failure(Failure),
}

impl Outcome {
    pub fn success(values: impl Into<Values>) -> Self {
        Outcome::Success(values.into())
    }

    pub fn failure(failure: impl Into<Failure>) -> Self {
        Outcome::Failure(failure.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn values(&self) -> Result<&Values, Failure> {
        match self {
            Outcome::Success(values) => Ok(values),
            Outcome::Failure(failure) => Err(failure.clone()),
        }
    }

    /// The first positional value, or the stored failure.
    pub fn value(&self) -> Result<Option<&Value>, Failure> {
        self.values().map(Values::value)
    }

    /// Clones out the first positional value as a `T`.
    ///
    /// A missing value or a value of another type is reported as a failure.
    pub fn get<T: Any + Clone>(&self) -> Result<T, Failure> {
        self.values()?.get::<T>(0).ok_or_else(|| {
            Failure::msg(format!(
                "expected a value of type `{}`",
                std::any::type_name::<T>()
            ))
        })
    }

    /// Returns the stored failure, if any.
    pub fn explode(&self) -> Result<(), Failure> {
        self.values().map(|_| ())
    }

    pub fn into_result(self) -> Result<Values, Failure> {
        match self {
            Outcome::Success(values) => Ok(values),
            Outcome::Failure(failure) => Err(failure),
        }
    }
}

impl From<Result<Values, Failure>> for Outcome {
    fn from(result: Result<Values, Failure>) -> Self {
        match result {
            Ok(values) => Outcome::Success(values),
            Err(failure) => Outcome::Failure(failure),
        }
    }
}

impl From<Values> for Outcome {
    fn from(values: Values) -> Self {
        Outcome::Success(values)
    }
}

impl From<Failure> for Outcome {
    fn from(failure: Failure) -> Self {
        Outcome::Failure(failure)
    }
}
