//! Parallel action dispatcher (§4.9): evaluates the actions of one request
//! concurrently on a bounded worker pool, with cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{AuthzError, Result};

/// Owns the bounded thread pool actions are dispatched onto. One instance is
/// shared across requests (constructing a `rayon::ThreadPool` per request
/// would defeat the point of bounding it).
pub struct ActionDispatcher {
    pool: ThreadPool,
}

impl ActionDispatcher {
    pub fn new(workers: usize) -> Self {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("authz-dispatch-{i}"))
            .build()
            .expect("bounded dispatcher thread pool");
        Self { pool }
    }

    /// Evaluates `actions` via `evaluate`, checking `cancelled` before each
    /// unit of work. Results preserve `actions`' order. Any worker observing
    /// cancellation aborts its own unit; the whole call then reports
    /// `AuthzError::Cancelled` rather than a partial response, per §7's
    /// "complete response or one error" contract.
    pub fn dispatch<T: Send>(
        &self,
        actions: &[String],
        cancelled: &AtomicBool,
        evaluate: impl Fn(&str) -> T + Sync,
    ) -> Result<Vec<T>> {
        if cancelled.load(Ordering::Relaxed) {
            return Err(AuthzError::Cancelled);
        }
        let results: Vec<Option<T>> = self.pool.install(|| {
            use rayon::prelude::*;
            actions
                .par_iter()
                .map(|action| {
                    if cancelled.load(Ordering::Relaxed) {
                        None
                    } else {
                        Some(evaluate(action))
                    }
                })
                .collect()
        });
        if results.iter().any(Option::is_none) {
            return Err(AuthzError::Cancelled);
        }
        Ok(results.into_iter().map(|r| r.expect("checked above")).collect())
    }
}
