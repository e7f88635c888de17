use std::sync::atomic::{AtomicI64, Ordering};

/// Lock-free 64-bit counter built on a single `AtomicI64`.
pub struct AtomicCounter {
    value: AtomicI64,
}

impl AtomicCounter {
    pub fn new(initial: i64) -> Self {
        AtomicCounter { value: AtomicI64::new(initial) }
    }

    pub fn load(&self) -> i64 {
        self.value.load(Ordering::SeqCst)
    }

    pub fn store(&self, v: i64) {
        self.value.store(v, Ordering::SeqCst)
    }

    pub fn incr(&self) -> i64 {
        self.value.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn decr(&self) -> i64 {
        self.value.fetch_sub(1, Ordering::SeqCst) - 1
    }

    pub fn add(&self, delta: i64) -> i64 {
        self.value.fetch_add(delta, Ordering::SeqCst) + delta
    }

    pub fn sub(&self, delta: i64) -> i64 {
        self.value.fetch_sub(delta, Ordering::SeqCst) - delta
    }

    pub fn compare_and_swap(&self, current: i64, new: i64) -> Result<i64, i64> {
        self.value.compare_exchange(current, new, Ordering::SeqCst, Ordering::SeqCst)
    }

    pub fn swap(&self, new: i64) -> i64 {
        self.value.swap(new, Ordering::SeqCst)
    }

    pub fn reset(&self) -> i64 {
        self.swap(0)
    }
}
