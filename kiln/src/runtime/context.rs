use crate::runtime::future::Future;

use std::cell::RefCell;

/// Slot of the coroutine driver currently polling an `async` body.
///
/// `None` outside of a driver. Inside, it holds `Some(None)` until the
/// body suspends on a kiln future, which then parks itself here.
type AwaitSlot = Option<Option<Future>>;

thread_local! {
    /// Thread-local handle to the future the running coroutine waits on.
    ///
    /// This allows `.await` on a [`Future`] to hand the dependency back to
    /// the driver without threading it through `std::task::Context`.
    static CURRENT_AWAIT: RefCell<AwaitSlot> = const { RefCell::new(None) };
}

/// Enters a coroutine driver context for the duration of `f`.
///
/// Returns the result of `f` together with the future the body suspended
/// on, if any. The previous context is restored afterwards, so drivers
/// may nest.
pub(crate) fn enter_driver<R>(f: impl FnOnce() -> R) -> (R, Option<Future>) {
    let prev = CURRENT_AWAIT.with(|slot| slot.replace(Some(None)));

    let out = f();

    let awaited = CURRENT_AWAIT.with(|slot| slot.replace(prev)).flatten();
    (out, awaited)
}

/// Records `future` as the dependency of the running coroutine.
///
/// # Panics
///
/// Panics if no driver is active: kiln futures can only be awaited from
/// bodies started with [`Scheduler::spawn`](crate::Scheduler::spawn).
pub(crate) fn park(future: Future) {
    CURRENT_AWAIT.with(|slot| {
        let mut slot = slot.borrow_mut();
        let current = slot
            .as_mut()
            .expect("kiln futures can only be awaited inside Scheduler::spawn");

        *current = Some(future);
    });
}
