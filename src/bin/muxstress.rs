//! Run the scenario catalog against the reference multiplexer.
//!
//! ```text
//! muxstress                                  # whole catalog
//! muxstress simple_write stress_1conn_1stream_100msg
//! muxstress --rate-limit 1000 --options '{"conn_num":4,"stream_num":8,"msg_num":16,"msg_min":64,"msg_max":4096}'
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use muxstress::harness::{catalog, failure_summary, Scenario, ScenarioOutcome};
use muxstress::metrics::init_metrics;
use muxstress::mux::FrameMux;
use muxstress::{Harness, HarnessConfig, Options};
use tracing_subscriber::EnvFilter;

struct Args {
    rate_limit: Option<usize>,
    scenarios: Vec<Scenario>,
}

fn parse_args() -> Result<Args> {
    let mut rate_limit = None;
    let mut scenarios = Vec::new();
    let mut args = std::env::args().skip(1);

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--rate-limit" => {
                let value = args.next().context("--rate-limit needs a value")?;
                rate_limit = Some(value.parse().context("--rate-limit must be a number")?);
            }
            "--options" => {
                let value = args.next().context("--options needs a JSON value")?;
                let options: Options =
                    serde_json::from_str(&value).context("--options is not valid JSON")?;
                scenarios.push(Scenario::stress("custom", options));
            }
            "--list" => {
                for scenario in catalog() {
                    println!("{:<40} {:?}", scenario.name, scenario.options());
                }
                std::process::exit(0);
            }
            name => match Scenario::by_name(name) {
                Some(scenario) => scenarios.push(scenario),
                None => bail!("unknown scenario {name:?} (try --list)"),
            },
        }
    }

    if scenarios.is_empty() {
        scenarios = catalog();
    }
    Ok(Args {
        rate_limit,
        scenarios,
    })
}

fn print_table(outcomes: &[ScenarioOutcome]) {
    println!(
        "\n{:<40} | {:<6} | {:>10} | {:>8} | {:>10}",
        "Scenario", "Result", "Verified", "Errors", "Time"
    );
    println!("{}", "-".repeat(86));
    for o in outcomes {
        println!(
            "{:<40} | {:<6} | {:>10} | {:>8} | {:>8}ms",
            o.scenario.name,
            if o.passed() { "PASS" } else { "FAIL" },
            o.report.messages_verified,
            o.report.error_count(),
            o.report.elapsed.as_millis()
        );
    }
    println!();
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    init_metrics();

    let args = parse_args()?;
    let mut config = HarnessConfig::default();
    if let Some(limit) = args.rate_limit {
        config = config.with_rate_limit(limit);
    }

    let harness = Harness::with_config(FrameMux::default(), config);
    let outcomes = harness.run_scenarios(&args.scenarios).await;
    print_table(&outcomes);

    match failure_summary(&outcomes) {
        None => Ok(()),
        Some(summary) => bail!("{summary}"),
    }
}
