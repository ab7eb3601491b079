use std::sync::atomic::{AtomicU8, Ordering};

const ACTIVE: u8 = 0;
const STOPPED: u8 = 1;

/// The interval flush timer's state. Transition is one-way: once stopped,
/// a handle can never become active again — starting the interval flush
/// again means building a new `SharedMutator`, mirroring the original
/// interval handler, which likewise never un-retires itself.
pub(super) struct IntervalHandle {
    state: AtomicU8,
}

impl IntervalHandle {
    pub(super) fn new() -> Self {
        IntervalHandle {
            state: AtomicU8::new(ACTIVE),
        }
    }

    pub(super) fn is_active(&self) -> bool {
        self.state.load(Ordering::Acquire) == ACTIVE
    }

    /// Idempotent: stopping an already-stopped handle is a no-op.
    pub(super) fn stop(&self) {
        self.state.store(STOPPED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_active_and_stop_is_one_way() {
        let handle = IntervalHandle::new();
        assert!(handle.is_active());
        handle.stop();
        assert!(!handle.is_active());
        handle.stop();
        assert!(!handle.is_active());
    }
}
