//! Fixed scenario list every transport is run through.

use serde::Serialize;

use super::stress::Harness;
use super::types::{Options, StressReport, SIMPLE_WRITE_SIZE};

pub const STRESS_1CONN_1STREAM_1MSG: Options = Options::new(1, 1, 1, 100);
pub const STRESS_1CONN_1STREAM_100MSG: Options = Options::new(1, 1, 100, 100);
pub const STRESS_1CONN_100STREAM_100MSG: Options = Options::new(1, 100, 100, 100);
pub const STRESS_50CONN_10STREAM_50MSG: Options = Options::new(50, 10, 50, 100);
pub const STRESS_1CONN_10000STREAM_10MSG: Options = Options::new(1, 10_000, 10, 100);
pub const STRESS_1CONN_1000STREAM_100MSG_10MB: Options = Options::new(1, 1000, 100, 10_000);

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub enum ScenarioKind {
    /// One message on one stream, written then read back.
    SimpleWrite { msg_size: usize },
    /// Concurrent fan-out over connections, streams and messages.
    Stress(Options),
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Scenario {
    pub name: &'static str,
    pub kind: ScenarioKind,
}

impl Scenario {
    pub const fn simple_write() -> Self {
        Self {
            name: "simple_write",
            kind: ScenarioKind::SimpleWrite {
                msg_size: SIMPLE_WRITE_SIZE,
            },
        }
    }

    pub const fn stress(name: &'static str, options: Options) -> Self {
        Self {
            name,
            kind: ScenarioKind::Stress(options),
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        catalog().into_iter().find(|s| s.name == name)
    }

    pub fn options(&self) -> Options {
        match self.kind {
            ScenarioKind::SimpleWrite { msg_size } => Options::new(1, 1, 1, msg_size),
            ScenarioKind::Stress(options) => options,
        }
    }
}

/// The baseline check followed by the stress presets, in run order.
pub fn catalog() -> Vec<Scenario> {
    vec![
        Scenario::simple_write(),
        Scenario::stress("stress_1conn_1stream_1msg", STRESS_1CONN_1STREAM_1MSG),
        Scenario::stress("stress_1conn_1stream_100msg", STRESS_1CONN_1STREAM_100MSG),
        Scenario::stress(
            "stress_1conn_100stream_100msg",
            STRESS_1CONN_100STREAM_100MSG,
        ),
        Scenario::stress("stress_50conn_10stream_50msg", STRESS_50CONN_10STREAM_50MSG),
        Scenario::stress(
            "stress_1conn_10000stream_10msg",
            STRESS_1CONN_10000STREAM_10MSG,
        ),
        Scenario::stress(
            "stress_1conn_1000stream_100msg_10mb",
            STRESS_1CONN_1000STREAM_100MSG_10MB,
        ),
    ]
}

/// Result of one catalog entry.
#[derive(Debug)]
pub struct ScenarioOutcome {
    pub scenario: Scenario,
    pub report: StressReport,
}

impl ScenarioOutcome {
    pub fn passed(&self) -> bool {
        self.report.passed()
    }
}

impl Harness {
    pub async fn run_scenario(&self, scenario: &Scenario) -> StressReport {
        tracing::info!("==== RUN {}", scenario.name);
        match scenario.kind {
            ScenarioKind::SimpleWrite { msg_size } => self.simple_write_sized(msg_size).await,
            ScenarioKind::Stress(options) => self.run_stress_named(scenario.name, options).await,
        }
    }

    /// Run `scenarios` one after another; a failure does not stop the rest.
    pub async fn run_scenarios(&self, scenarios: &[Scenario]) -> Vec<ScenarioOutcome> {
        let mut outcomes = Vec::with_capacity(scenarios.len());
        for scenario in scenarios {
            let report = self.run_scenario(scenario).await;
            if report.passed() {
                tracing::info!("---- PASS {} ({:.2?})", scenario.name, report.elapsed);
            } else {
                tracing::warn!(
                    "---- FAIL {} ({} errors)",
                    scenario.name,
                    report.error_count()
                );
            }
            outcomes.push(ScenarioOutcome {
                scenario: *scenario,
                report,
            });
        }
        outcomes
    }

    pub async fn run_all(&self) -> Vec<ScenarioOutcome> {
        self.run_scenarios(&catalog()).await
    }

    /// Run the whole catalog and fail listing every error of every failed
    /// scenario.
    pub async fn assert_all(&self) {
        assert_outcomes(&self.run_all().await);
    }
}

/// Every error of every failed scenario, or `None` if all passed.
pub fn failure_summary(outcomes: &[ScenarioOutcome]) -> Option<String> {
    let failed: Vec<String> = outcomes
        .iter()
        .filter(|o| !o.passed())
        .map(|o| {
            let errors: Vec<String> = o
                .report
                .errors
                .iter()
                .map(|e| format!("    - {e}"))
                .collect();
            format!("  {}:\n{}", o.scenario.name, errors.join("\n"))
        })
        .collect();

    if failed.is_empty() {
        return None;
    }
    Some(format!(
        "{} of {} scenarios failed:\n{}",
        failed.len(),
        outcomes.len(),
        failed.join("\n")
    ))
}

pub fn assert_outcomes(outcomes: &[ScenarioOutcome]) {
    if let Some(summary) = failure_summary(outcomes) {
        panic!("{summary}");
    }
}
