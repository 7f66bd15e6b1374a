//! Metrics recorder for stress runs
//!
//! Records counts and timings of connection, stream and message work.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::harness::error::HarnessError;

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }
    describe_metrics();
}

fn describe_metrics() {
    describe_counter!(
        "muxstress_connections_total",
        "Multiplexed connections dialed by workload drivers"
    );
    describe_counter!(
        "muxstress_streams_total",
        "Streams opened by workload drivers"
    );
    describe_counter!(
        "muxstress_messages_written_total",
        "Messages written to streams"
    );
    describe_counter!(
        "muxstress_messages_verified_total",
        "Echoed messages that matched what was sent"
    );
    describe_counter!(
        "muxstress_bytes_verified_total",
        "Bytes of echoed messages that matched"
    );
    describe_counter!("muxstress_errors_total", "Reported harness errors by kind");
    describe_counter!(
        "muxstress_echo_streams_total",
        "Inbound streams served by the echo responder"
    );

    describe_gauge!(
        "muxstress_units_in_flight",
        "Rate-limited units currently running"
    );

    describe_histogram!(
        "muxstress_scenario_duration_seconds",
        "Wall time of one scenario"
    );
    describe_histogram!(
        "muxstress_message_size_bytes",
        "Length of each message written to a stream"
    );
    describe_histogram!(
        "muxstress_echo_stream_bytes",
        "Bytes reflected by the echo responder per stream"
    );
}

pub fn record_connection_opened() {
    counter!("muxstress_connections_total").increment(1);
}

pub fn record_stream_opened() {
    counter!("muxstress_streams_total").increment(1);
}

pub fn record_message_written(len: usize) {
    counter!("muxstress_messages_written_total").increment(1);
    histogram!("muxstress_message_size_bytes").record(len as f64);
}

pub fn record_message_verified(len: usize) {
    counter!("muxstress_messages_verified_total").increment(1);
    counter!("muxstress_bytes_verified_total").increment(len as u64);
}

pub fn record_echo_stream(bytes: u64) {
    counter!("muxstress_echo_streams_total").increment(1);
    histogram!("muxstress_echo_stream_bytes").record(bytes as f64);
}

pub fn record_error(err: &HarnessError) {
    counter!("muxstress_errors_total", "kind" => error_kind(err)).increment(1);
}

pub fn set_units_in_flight(n: usize) {
    gauge!("muxstress_units_in_flight").set(n as f64);
}

fn error_kind(err: &HarnessError) -> &'static str {
    match err {
        HarnessError::Setup { .. } => "setup",
        HarnessError::OpenStream(_) => "open_stream",
        HarnessError::Write { .. } => "write",
        HarnessError::Read { .. } => "read",
        HarnessError::Mismatch { .. } => "mismatch",
        HarnessError::TaskFailed(_) => "task",
        HarnessError::InvalidMessageSize { .. } | HarnessError::InvalidOptions(_) => "config",
    }
}

/// Times one scenario and records its outcome on completion.
pub struct ScenarioTimer {
    scenario: String,
    start_time: Instant,
}

impl ScenarioTimer {
    pub fn start(scenario: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Stop timing; returns the elapsed time.
    pub fn finish(self, errors: usize) -> Duration {
        let elapsed = self.start_time.elapsed();
        let outcome = if errors == 0 { "passed" } else { "failed" };
        histogram!(
            "muxstress_scenario_duration_seconds",
            "scenario" => self.scenario.clone(),
            "outcome" => outcome
        )
        .record(elapsed.as_secs_f64());
        elapsed
    }
}
