/// Bundles plain values and futures into one future.
///
/// Positional arguments come first, keyword arguments are written
/// `key = value`. Every argument may be a plain value already converted to
/// a [`Value`](crate::Value), a [`Future`](crate::Future), an
/// [`Outcome`](crate::Outcome) or anything else convertible into an
/// [`Awaitable`](crate::Awaitable).
///
/// # Examples
///
/// ```rust,ignore
/// let sum = futurize!(sched; left, right, scale = Value::new(2))
///     .bind(|values| { ... });
/// ```
#[macro_export]
macro_rules! futurize {
    (@args $args:expr; ) => {
        $args
    };
    (@args $args:expr; $key:ident = $value:expr $(, $($rest:tt)*)?) => {
        $crate::futurize!(@args $args.named(stringify!($key), $value); $($($rest)*)?)
    };
    (@args $args:expr; $value:expr $(, $($rest:tt)*)?) => {
        $crate::futurize!(@args $args.arg($value); $($($rest)*)?)
    };
    ($sched:expr; $($rest:tt)+) => {
        $sched.futurize($crate::futurize!(@args $crate::Args::new(); $($rest)+))
    };
    ($sched:expr $(;)?) => {
        $sched.futurize($crate::Args::new())
    };
}
