//! Shared pool of random bytes test messages are sliced from.

pub mod pool;

pub use pool::{PayloadPool, DEFAULT_POOL_SIZE};
