//! Synchronization primitives for kiln coroutines.
//!
//! The current primitives include:
//! - [`CriticalSection`]: a FIFO lock handed out through futures.
//!
//! ## Design notes
//!
//! - Waiting never blocks the thread: acquiring returns a future.
//! - Primitives live on the scheduler thread, like the futures they hand out.

mod critical_section;

pub use critical_section::{CriticalSection, Releaser};
