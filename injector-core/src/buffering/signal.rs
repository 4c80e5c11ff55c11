//! Wait/notify channel paired with the `REQUEST_RENDER` flag.
//!
//! The flag value itself lives in the ring's state array; this type only
//! carries the wake-up. The producer parks its thread, the render callback
//! unparks it. `Thread::unpark` never blocks and never allocates, so it is
//! safe to call from the real-time path.

use std::sync::OnceLock;
use std::thread::{self, Thread};
use std::time::Duration;

use tracing::warn;

/// Re-check interval for a thread that is not the registered waiter.
const FOREIGN_WAITER_POLL: Duration = Duration::from_millis(2);

#[derive(Debug, Default)]
pub struct RenderSignal {
    /// The single producer thread, bound once by `register`.
    waiter: OnceLock<Thread>,
}

impl RenderSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wake the registered producer, if any. Real-time safe.
    #[inline]
    pub fn notify(&self) {
        if let Some(thread) = self.waiter.get() {
            thread.unpark();
        }
    }

    /// Make the calling thread the waiter. Must happen before the caller
    /// checks its wake condition, or the first notify can be missed.
    pub fn register(&self) {
        self.waiter.get_or_init(thread::current);
    }

    /// Park the calling thread until notified. May return spuriously, so
    /// callers re-check their condition in a loop.
    ///
    /// Only the thread bound by [`register`](Self::register) really parks;
    /// any other caller polls and never takes over the waiter slot.
    pub fn park(&self) {
        let current = thread::current();
        match self.waiter.get() {
            Some(waiter) if waiter.id() == current.id() => thread::park(),
            waiter => {
                warn!(
                    registered = ?waiter.map(Thread::id),
                    caller = ?current.id(),
                    "render signal waited on by an unregistered thread; polling"
                );
                thread::park_timeout(FOREIGN_WAITER_POLL);
            }
        }
    }

    pub fn has_waiter(&self) -> bool {
        self.waiter.get().is_some()
    }
}
