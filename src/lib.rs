//! Conformance and stress harness for stream-multiplexing transports.
//!
//! Supply any [`transport::Transport`] and run the scenario catalog against
//! it:
//!
//! ```no_run
//! use muxstress::{Harness, mux::FrameMux};
//!
//! # async fn run() {
//! Harness::new(FrameMux::default()).assert_all().await;
//! # }
//! ```

pub mod harness;
pub mod metrics;
pub mod mux;
pub mod payload;
pub mod transport;

pub use harness::{
    catalog, Harness, HarnessConfig, HarnessError, HarnessResult, Options, Scenario,
    ScenarioOutcome, StressReport,
};
pub use payload::PayloadPool;
pub use transport::{MuxConn, MuxStream, Role, Transport, TransportError, TransportResult};

/// Run the baseline check and every stress preset against `transport`,
/// failing with every collected error.
pub async fn subtest_all<T: Transport>(transport: T) {
    Harness::new(transport).assert_all().await;
}
