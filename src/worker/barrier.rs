use parking_lot::{Condvar, Mutex};

/// Blocks a caller until a counter of outstanding replies reaches zero.
/// Response callbacks arrive from the transport's execution pool; the
/// caller sits in `wait` until the last one has been accounted for.
pub struct CompletionBarrier {
    remaining: Mutex<usize>,
    cond: Condvar,
}

impl CompletionBarrier {
    pub fn new(count: usize) -> CompletionBarrier {
        CompletionBarrier {
            remaining: Mutex::new(count),
            cond: Condvar::new(),
        }
    }

    /// Account for one reply.
    pub fn arrive(&self) {
        let mut remaining = self.remaining.lock();
        assert!(*remaining > 0, "barrier overshoot");
        *remaining -= 1;
        if *remaining == 0 {
            self.cond.notify_all();
        }
    }

    /// Block until every reply has arrived.
    pub fn wait(&self) {
        let mut remaining = self.remaining.lock();
        while *remaining > 0 {
            self.cond.wait(&mut remaining);
        }
    }
}
