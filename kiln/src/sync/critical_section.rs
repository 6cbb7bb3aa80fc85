use crate::outcome::Value;
use crate::runtime::{Future, Promise, Scheduler};

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

struct LockState {
    held: bool,

    /// Promises of pending acquisitions, oldest first.
    waiters: VecDeque<Promise>,
}

/// A FIFO lock for coroutines.
///
/// [`CriticalSection::acquire`] returns a future whose single value is a
/// [`Releaser`]. Once that future is done the caller holds the lock; calling
/// [`Releaser::release`] hands it to the next acquisition in line.
///
/// # Examples
///
/// ```rust,ignore
/// let lock = CriticalSection::new(&sched);
///
/// sched.spawn({
///     let acquired = lock.acquire();
///     async move {
///         let releaser = acquired.await?.get::<Releaser>(0).unwrap();
///         // In critical section
///         releaser.release();
///         Ok(())
///     }
/// });
/// ```
pub struct CriticalSection {
    sched: Scheduler,
    state: Rc<RefCell<LockState>>,
}

impl CriticalSection {
    pub fn new(sched: &Scheduler) -> Self {
        Self {
            sched: sched.clone(),
            state: Rc::new(RefCell::new(LockState {
                held: false,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// Requests the lock.
    ///
    /// Returns an already-done future if the lock is free. Otherwise the
    /// future is done when every earlier acquisition has been released.
    pub fn acquire(&self) -> Future {
        let free = {
            let mut state = self.state.borrow_mut();
            !std::mem::replace(&mut state.held, true)
        };

        if free {
            return self.sched.ready(Releaser::new(&self.state));
        }

        let promise = self.sched.promise();
        let future = promise.future();
        self.state.borrow_mut().waiters.push_back(promise);

        future
    }

    /// Whether some acquisition currently holds the lock.
    pub fn is_held(&self) -> bool {
        self.state.borrow().held
    }

    /// Number of acquisitions waiting for the lock.
    pub fn waiting(&self) -> usize {
        self.state.borrow().waiters.len()
    }
}

impl fmt::Debug for CriticalSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CriticalSection")
            .field("held", &self.is_held())
            .field("waiting", &self.waiting())
            .finish()
    }
}

/// Right to release a [`CriticalSection`], delivered by `acquire`.
///
/// Clones share the same right: releasing through any of them counts.
#[derive(Clone)]
pub struct Releaser {
    state: Rc<RefCell<LockState>>,
    released: Rc<Cell<bool>>,
}

impl Releaser {
    fn new(state: &Rc<RefCell<LockState>>) -> Self {
        Self {
            state: state.clone(),
            released: Rc::new(Cell::new(false)),
        }
    }

    /// Releases the lock, handing it to the oldest waiting acquisition.
    ///
    /// # Panics
    ///
    /// Panics if this acquisition was already released.
    pub fn release(&self) {
        assert!(
            !self.released.replace(true),
            "critical section released twice"
        );

        let next = self.state.borrow_mut().waiters.pop_front();

        match next {
            Some(promise) => promise.satisfy(Value::new(Releaser::new(&self.state))),
            None => self.state.borrow_mut().held = false,
        }
    }

    /// Whether [`Releaser::release`] was called.
    pub fn is_released(&self) -> bool {
        self.released.get()
    }
}

impl fmt::Debug for Releaser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Releaser")
            .field("released", &self.is_released())
            .finish()
    }
}
