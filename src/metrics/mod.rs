//! Metrics emitted by stress runs
//!
//! Everything goes through the `metrics` facade; whichever recorder the
//! embedding process installs receives them. Key metrics:
//! - Connections and streams opened
//! - Messages written and verified, bytes echoed
//! - Errors by kind
//! - Scenario duration and outcome

pub mod recorder;

pub use recorder::{init_metrics, ScenarioTimer};
