// Copyright (c) 2025 RangeTable Contributors
//
// Small concurrency helpers shared by the mutator's retry loop and the
// interval handler's timer re-registration.

/// Cache line size for padding to avoid false sharing.
pub const CACHE_LINE_SIZE: usize = 64;

/// Exponential spin/yield backoff used while a `SharedMutator` waits between
/// RPC retries.
pub struct Backoff {
    step: u32,
    max_step: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            step: 0,
            max_step: 10,
        }
    }

    /// Perform a backoff step, with a small random jitter added to the
    /// spin count so a fleet of mutators retrying in lockstep don't all
    /// hammer the range server on the exact same tick.
    pub fn spin(&mut self) {
        let base = 1u32 << self.step.min(self.max_step);
        let jitter = rand::random::<u32>() % (base.max(1));
        for _ in 0..(base + jitter) {
            std::hint::spin_loop();
        }
        self.step = self.step.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.step = 0;
    }

    pub fn should_yield(&self) -> bool {
        self.step > 6
    }

    pub fn snooze(&mut self) {
        if self.should_yield() {
            std::thread::yield_now();
        } else {
            self.spin();
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
