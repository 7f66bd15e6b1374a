//! Conformance and stress harness for stream multiplexers.
//!
//! A [`Harness`] wraps one transport implementation and runs workloads
//! against it: every scenario dials fresh echo servers, opens streams, and
//! checks that every message comes back byte for byte and in order. Errors
//! from every level are collected rather than failing fast, so one run shows
//! every independent failure.

pub mod catalog;
pub(crate) mod driver;
pub mod echo;
pub mod error;
pub mod rate_limiter;
pub mod sink;
pub mod stress;
pub mod types;

pub use catalog::{
    assert_outcomes, catalog, failure_summary, Scenario, ScenarioKind, ScenarioOutcome,
};
pub use echo::{echo_handler, echo_stream};
pub use error::{HarnessError, HarnessResult, SetupStage};
pub use rate_limiter::RateLimiter;
pub use sink::ErrorSink;
pub use stress::Harness;
pub use types::{
    HarnessConfig, Options, RunStats, StressReport, DEFAULT_RATE_LIMIT, SIMPLE_WRITE_SIZE,
};
