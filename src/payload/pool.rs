use std::sync::OnceLock;

use bytes::Bytes;
use rand::rngs::OsRng;
use rand::{Rng, RngCore};

use crate::harness::error::{HarnessError, HarnessResult};

/// 1 MiB of randomness.
pub const DEFAULT_POOL_SIZE: usize = 1 << 20;

static GLOBAL_POOL: OnceLock<PayloadPool> = OnceLock::new();

/// Immutable buffer of random bytes.
///
/// Messages are views into the pool at a random offset, so handing one out
/// never copies and two messages may overlap.
#[derive(Debug, Clone)]
pub struct PayloadPool {
    data: Bytes,
}

impl PayloadPool {
    /// Fill a new pool of `size` bytes from the OS random source.
    pub fn new(size: usize) -> Self {
        let mut data = vec![0u8; size];
        OsRng.fill_bytes(&mut data);
        Self {
            data: Bytes::from(data),
        }
    }

    /// Process-wide pool, filled on first use and read-only afterwards.
    pub fn global() -> &'static PayloadPool {
        GLOBAL_POOL.get_or_init(|| {
            tracing::debug!("filling {} byte payload pool", DEFAULT_POOL_SIZE);
            PayloadPool::new(DEFAULT_POOL_SIZE)
        })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return `size` bytes starting at a uniformly random offset.
    pub fn message(&self, size: usize) -> HarnessResult<Bytes> {
        if size == 0 || size > self.data.len() {
            return Err(HarnessError::InvalidMessageSize {
                size,
                max: self.data.len(),
            });
        }

        let start = rand::thread_rng().gen_range(0..=self.data.len() - size);
        Ok(self.data.slice(start..start + size))
    }

    /// Return a message whose length is drawn uniformly from `[min, max]`.
    pub fn message_in(&self, min: usize, max: usize) -> HarnessResult<Bytes> {
        let size = if min >= max {
            min
        } else {
            rand::thread_rng().gen_range(min..=max)
        };
        self.message(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_has_requested_length() {
        let pool = PayloadPool::new(4096);
        for size in [1, 100, 2048, 4096] {
            assert_eq!(pool.message(size).unwrap().len(), size);
        }
    }

    #[test]
    fn test_message_is_a_slice_of_the_pool() {
        let pool = PayloadPool::new(1024);
        let msg = pool.message(16).unwrap();
        let found = pool.data.windows(16).any(|w| w == &msg[..]);
        assert!(found);
    }

    #[test]
    fn test_rejects_zero_and_oversized() {
        let pool = PayloadPool::new(256);
        assert!(matches!(
            pool.message(0),
            Err(HarnessError::InvalidMessageSize { size: 0, max: 256 })
        ));
        assert!(matches!(
            pool.message(257),
            Err(HarnessError::InvalidMessageSize { size: 257, .. })
        ));
    }

    #[test]
    fn test_message_in_stays_within_bounds() {
        let pool = PayloadPool::new(8192);
        for _ in 0..200 {
            let len = pool.message_in(100, 200).unwrap().len();
            assert!((100..=200).contains(&len));
        }
        assert_eq!(pool.message_in(300, 300).unwrap().len(), 300);
    }

    #[test]
    fn test_global_pool_is_shared() {
        let a = PayloadPool::global();
        let b = PayloadPool::global();
        assert!(std::ptr::eq(a, b));
        assert_eq!(a.len(), DEFAULT_POOL_SIZE);
    }

    #[test]
    fn test_random_content() {
        let pool = PayloadPool::new(DEFAULT_POOL_SIZE);
        // All-zero 1 MiB from a CSPRNG is not a thing.
        assert!(pool.data.iter().any(|&b| b != 0));
    }
}
