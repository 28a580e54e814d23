//! Callback gate shared by the monitors
//!
//! Callbacks run while holding a re-entrant lock. Closing the gate flips the
//! open flag and then takes the same lock, so by the time `close` returns any
//! callback already running on another thread has finished and no new one can
//! start. Re-entrancy lets a callback close its own gate.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::ReentrantMutex;

pub(crate) struct CallbackGate {
    open: AtomicBool,
    lock: ReentrantMutex<()>,
}

impl CallbackGate {
    pub(crate) fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            lock: ReentrantMutex::new(()),
        }
    }

    /// Runs `f` unless the gate is closed; returns whether it ran
    pub(crate) fn deliver(&self, f: impl FnOnce()) -> bool {
        let _guard = self.lock.lock();
        if !self.open.load(Ordering::Acquire) {
            return false;
        }
        f();
        true
    }

    /// Waits for any callback running on another thread to finish
    pub(crate) fn barrier(&self) {
        drop(self.lock.lock());
    }

    /// Closes the gate; returns true on the first call
    pub(crate) fn close(&self) -> bool {
        let first = self.open.swap(false, Ordering::AcqRel);
        self.barrier();
        first
    }

    #[cfg(test)]
    pub(crate) fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}
