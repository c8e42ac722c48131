use std::sync::atomic::{AtomicUsize, Ordering};

/// FetchCounter is the per-query admission gate for single fetches. It is
/// shared by every parallel worker of a query, so `consume` is a single
/// atomic compare-and-add rather than a mutex-guarded field.
#[derive(Debug)]
pub struct FetchCounter {
    current: AtomicUsize,
    limit: usize,
}

impl FetchCounter {
    pub fn new(limit: usize) -> Self {
        FetchCounter {
            current: AtomicUsize::new(0),
            limit,
        }
    }

    /// Atomically admits `count` fetches. Either the whole batch is
    /// admitted or the counter is left untouched.
    pub fn consume(&self, count: usize) -> bool {
        let mut current = self.current.load(Ordering::Relaxed);
        loop {
            let Some(next) = current.checked_add(count) else {
                return false;
            };
            if next > self.limit {
                return false;
            }
            match self.current.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(observed) => current = observed,
            }
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::Relaxed)
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
