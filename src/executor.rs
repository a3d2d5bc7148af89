//! Cooperative worker-pool abstraction wrapping a `rayon::ThreadPool`.
//!
//! Callers `announce` work and `require`/`available`-poll it later
//! instead of blocking immediately, so pubkey computation across many
//! OTS leaves can run off the calling thread.

use std::sync::{Arc, Condvar, Mutex};

use rayon::{ThreadPool, ThreadPoolBuilder};

/// A pool of worker threads that OTS/level keys can offload pubkey
/// computation onto.
pub struct Executor {
    pool: ThreadPool,
}

impl Executor {
    /// Builds a pool with the given number of threads. `0` defers to
    /// rayon's default (usually the number of logical CPUs).
    pub fn new(num_threads: usize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .expect("failed to build thread pool");
        Self { pool }
    }

    /// Schedules `f` on the pool and returns a [`Handle`] to its result.
    pub fn spawn<T, F>(&self, f: F) -> Handle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let shared = Arc::new(Shared {
            value: Mutex::new(None),
            ready: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        self.pool.spawn(move || {
            let result = f();
            // If every `Handle` clone was dropped, this just stores the
            // result into a now-unreachable `Arc`: the
            // closure still runs to completion but nothing observes it.
            *worker_shared.value.lock().unwrap() = Some(result);
            worker_shared.ready.notify_all();
        });
        Handle { shared }
    }
}

impl Default for Executor {
    /// Defers entirely to rayon's own default thread count.
    fn default() -> Self {
        Self::new(0)
    }
}

struct Shared<T> {
    value: Mutex<Option<T>>,
    ready: Condvar,
}

/// A non-blocking receipt for work scheduled on an [`Executor`].
pub struct Handle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Handle<T> {
    /// Blocks the calling thread until the result is ready.
    pub fn require(self) -> T {
        let mut guard = self.shared.value.lock().unwrap();
        while guard.is_none() {
            guard = self.shared.ready.wait(guard).unwrap();
        }
        guard.take().expect("result checked Some under the lock")
    }

    /// Non-blocking poll: `true` once the result can be `require`d
    /// without blocking.
    pub fn available(&self) -> bool {
        self.shared.value.lock().unwrap().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announce_then_require_matches_sequential() {
        let executor = Executor::new(2);
        let handle = executor.spawn(|| 2 + 2);
        assert_eq!(handle.require(), 4);
    }

    #[test]
    fn results_are_independent_of_thread_count() {
        for threads in [1, 2, 8] {
            let executor = Executor::new(threads);
            let handles: Vec<_> = (0..16).map(|i| executor.spawn(move || i * i)).collect();
            let results: Vec<_> = handles.into_iter().map(Handle::require).collect();
            assert_eq!(results, (0..16).map(|i| i * i).collect::<Vec<_>>());
        }
    }
}
