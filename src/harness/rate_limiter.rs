//! Counting admission gate for workload units.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

/// Bounds how many rate-limited futures run at once.
///
/// Connection and stream units draw from the same permits, so the bound
/// holds across both fan-out levels.
#[derive(Clone)]
pub struct RateLimiter {
    permits: Arc<Semaphore>,
    capacity: usize,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl RateLimiter {
    /// Create a limiter with `capacity` permits (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a permit, then drive `fut` to completion while holding it.
    ///
    /// The permit is returned when `fut` finishes, panics, or is dropped.
    pub async fn run<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        // The semaphore is never closed.
        let _permit = self
            .permits
            .acquire()
            .await
            .expect("rate limiter semaphore closed");
        let _slot = InFlight::enter(self);
        fut.await
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Units running right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest `in_flight` value observed so far.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::Acquire)
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("capacity", &self.capacity)
            .field("in_flight", &self.in_flight())
            .field("peak", &self.peak())
            .finish()
    }
}

struct InFlight<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> InFlight<'a> {
    fn enter(limiter: &'a RateLimiter) -> Self {
        let now = limiter.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        limiter.peak.fetch_max(now, Ordering::AcqRel);
        Self {
            counter: &limiter.in_flight,
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}
