use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::error::{HarnessError, HarnessResult};
use crate::payload::DEFAULT_POOL_SIZE;

/// Default ceiling on concurrently running workload units.
///
/// Kept well under the thread/goroutine ceilings of race-checking runtimes.
pub const DEFAULT_RATE_LIMIT: usize = 5000;

/// Message size used by the single-stream round-trip check.
pub const SIMPLE_WRITE_SIZE: usize = 4096;

/// Shape of one stress run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Options {
    pub conn_num: usize,
    pub stream_num: usize,
    pub msg_num: usize,
    pub msg_min: usize,
    pub msg_max: usize,
}

impl Options {
    /// Fixed-size messages.
    pub const fn new(conn_num: usize, stream_num: usize, msg_num: usize, msg_size: usize) -> Self {
        Self {
            conn_num,
            stream_num,
            msg_num,
            msg_min: msg_size,
            msg_max: msg_size,
        }
    }

    /// Draw each message length uniformly from `[min, max]`.
    pub fn with_size_range(mut self, min: usize, max: usize) -> Self {
        self.msg_min = min;
        self.msg_max = max;
        self
    }

    pub fn is_fixed_size(&self) -> bool {
        self.msg_min == self.msg_max
    }

    pub fn total_streams(&self) -> usize {
        self.conn_num * self.stream_num
    }

    pub fn total_messages(&self) -> usize {
        self.total_streams() * self.msg_num
    }

    /// Reject shapes the payload pool cannot serve.
    pub fn validate(&self, pool_len: usize) -> HarnessResult<()> {
        if self.msg_min == 0 {
            return Err(HarnessError::InvalidOptions(
                "message size must be positive".into(),
            ));
        }
        if self.msg_min > self.msg_max {
            return Err(HarnessError::InvalidOptions(format!(
                "msg_min {} exceeds msg_max {}",
                self.msg_min, self.msg_max
            )));
        }
        if self.msg_max > pool_len {
            return Err(HarnessError::InvalidMessageSize {
                size: self.msg_max,
                max: pool_len,
            });
        }
        Ok(())
    }
}

/// Harness-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Maximum concurrently running connection + stream units.
    pub rate_limit: usize,
    /// Size of the random payload pool.
    pub pool_size: usize,
    /// Address fresh listeners bind to; port 0 picks an ephemeral port.
    pub bind_addr: SocketAddr,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            rate_limit: DEFAULT_RATE_LIMIT,
            pool_size: DEFAULT_POOL_SIZE,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        }
    }
}

impl HarnessConfig {
    pub fn with_rate_limit(mut self, rate_limit: usize) -> Self {
        self.rate_limit = rate_limit;
        self
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    pub fn with_bind_addr(mut self, bind_addr: SocketAddr) -> Self {
        self.bind_addr = bind_addr;
        self
    }
}

/// Counters shared by every task of one run.
#[derive(Debug, Default)]
pub struct RunStats {
    pub connections: AtomicU64,
    pub streams: AtomicU64,
    pub messages_written: AtomicU64,
    pub messages_verified: AtomicU64,
    pub bytes_verified: AtomicU64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stream_opened(&self) {
        self.streams.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_written(&self) {
        self.messages_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_verified(&self, len: usize) {
        self.messages_verified.fetch_add(1, Ordering::Relaxed);
        self.bytes_verified.fetch_add(len as u64, Ordering::Relaxed);
    }
}

/// Everything a finished stress run produced.
#[derive(Debug)]
pub struct StressReport {
    pub options: Options,
    pub errors: Vec<HarnessError>,
    pub connections: u64,
    pub streams: u64,
    pub messages_written: u64,
    pub messages_verified: u64,
    pub bytes_verified: u64,
    pub peak_in_flight: usize,
    pub elapsed: Duration,
}

impl StressReport {
    pub(crate) fn new(
        options: Options,
        errors: Vec<HarnessError>,
        stats: &RunStats,
        peak_in_flight: usize,
        elapsed: Duration,
    ) -> Self {
        Self {
            options,
            errors,
            connections: stats.connections.load(Ordering::Relaxed),
            streams: stats.streams.load(Ordering::Relaxed),
            messages_written: stats.messages_written.load(Ordering::Relaxed),
            messages_verified: stats.messages_verified.load(Ordering::Relaxed),
            bytes_verified: stats.bytes_verified.load(Ordering::Relaxed),
            peak_in_flight,
            elapsed,
        }
    }

    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} conns, {} streams, {}/{} messages verified ({} bytes), peak {} in flight, {} errors in {:.2?}",
            self.connections,
            self.streams,
            self.messages_verified,
            self.options.total_messages(),
            self.bytes_verified,
            self.peak_in_flight,
            self.errors.len(),
            self.elapsed
        )
    }

    /// Fail with every collected error, one per line.
    pub fn assert_clean(&self) {
        if self.errors.is_empty() {
            return;
        }
        let lines: Vec<String> = self.errors.iter().map(|e| format!("  - {e}")).collect();
        panic!(
            "{} errors during stress run {:?}:\n{}",
            self.errors.len(),
            self.options,
            lines.join("\n")
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_totals() {
        let opts = Options::new(50, 10, 50, 100);
        assert_eq!(opts.total_streams(), 500);
        assert_eq!(opts.total_messages(), 25_000);
        assert!(opts.is_fixed_size());
        assert!(!opts.with_size_range(10, 20).is_fixed_size());
    }

    #[test]
    fn test_options_validation() {
        assert!(Options::new(1, 1, 1, 100).validate(1024).is_ok());
        assert!(Options::new(1, 1, 1, 1024).validate(1024).is_ok());
        assert!(matches!(
            Options::new(1, 1, 1, 0).validate(1024),
            Err(HarnessError::InvalidOptions(_))
        ));
        assert!(matches!(
            Options::new(1, 1, 1, 2048).validate(1024),
            Err(HarnessError::InvalidMessageSize { size: 2048, .. })
        ));
        assert!(Options::new(1, 1, 1, 10)
            .with_size_range(20, 10)
            .validate(1024)
            .is_err());
    }

    #[test]
    fn test_options_serde() {
        let opts = Options::new(1, 1000, 100, 10_000);
        let json = serde_json::to_string(&opts).unwrap();
        let back: Options = serde_json::from_str(&json).unwrap();
        assert_eq!(opts, back);
    }

    #[test]
    #[should_panic(expected = "1 errors during stress run")]
    fn test_assert_clean_panics_with_errors() {
        let report = StressReport::new(
            Options::new(1, 1, 1, 1),
            vec![HarnessError::TaskFailed("boom".into())],
            &RunStats::new(),
            1,
            Duration::ZERO,
        );
        report.assert_clean();
    }

    #[test]
    fn test_report_counts() {
        let stats = RunStats::new();
        stats.connection_opened();
        stats.stream_opened();
        stats.message_written();
        stats.message_verified(100);
        let report = StressReport::new(
            Options::new(1, 1, 1, 100),
            Vec::new(),
            &stats,
            2,
            Duration::from_millis(5),
        );
        assert!(report.passed());
        assert_eq!(report.messages_verified, 1);
        assert_eq!(report.bytes_verified, 100);
        report.assert_clean();
    }
}
