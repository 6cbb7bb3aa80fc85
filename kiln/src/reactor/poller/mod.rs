//! Platform-specific I/O poller abstraction.
//!
//! The poller is used by the multiplexer thread to:
//! - wait for readiness on child process descriptors,
//! - wake up when a new job registers its streams or on shutdown.
//!
//! Only the Linux `epoll` backend exists; `forkpty` based process
//! execution is unix-only anyway.

pub(crate) mod common;

pub(crate) use common::Waker;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

#[cfg(unix)]
pub(crate) mod unix;

#[cfg(unix)]
pub(crate) use unix as platform;
