use std::path::Path;
use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use answer_gate::config;
use answer_gate::sim::scenario::{self, Scenario};

const CONFIG_PATH: &str = "config.toml";

fn main() -> ExitCode {
  let config_path = Path::new(CONFIG_PATH);

  tracing_subscriber::registry()
    .with(
      tracing_subscriber::EnvFilter::try_new(config::log_filter(config_path))
        .unwrap_or_else(|_| config::DEFAULT_LOG_FILTER.into()),
    )
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .init();

  let paths: Vec<String> = std::env::args().skip(1).collect();
  if paths.is_empty() {
    eprintln!("usage: gate-replay <scenario.toml>...");
    return ExitCode::from(2);
  }

  let defaults = config::load_gate_config(config_path);
  let mut failed = 0;

  for path in &paths {
    let scenario = match Scenario::load(Path::new(path)) {
      Ok(scenario) => scenario,
      Err(e) => {
        tracing::error!("Failed to load {}: {}", path, e);
        failed += 1;
        continue;
      }
    };

    let report = scenario::run(&scenario, &defaults);
    match serde_json::to_string_pretty(&report) {
      Ok(json) => println!("{}", json),
      Err(e) => tracing::error!("Failed to serialize report for {}: {}", path, e),
    }

    if report.passed() {
      tracing::info!("{}: passed ({} corrective writes)", scenario.name, report.writes);
    } else {
      tracing::error!("{}: {} failed expectation(s)", scenario.name, report.failures.len());
      failed += 1;
    }
  }

  if failed > 0 {
    ExitCode::FAILURE
  } else {
    ExitCode::SUCCESS
  }
}
