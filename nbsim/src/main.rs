use nbsim::{bench_cycles, Scenario, ScenarioConfig};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(about = "Headless live N-body engine")]
struct Args {
    /// Scenario file; bare names are looked up in the crate's `scenarios/` directory
    #[arg(short, long = "file", default_value = "demo.yaml")]
    file_name: String,

    /// Snapshots to consume before shutting down
    #[arg(short, long, default_value_t = 100)]
    cycles: u64,

    /// Run the cycle benchmark instead of a scenario
    #[arg(long)]
    bench: bool,
}

// load here to keep main clean
fn load_scenario_from_yaml(file_name: &str) -> Result<ScenarioConfig> {
    let direct = PathBuf::from(file_name);
    let config_path = if direct.is_file() {
        direct
    } else {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("scenarios").join(file_name)
    };
    let scenario_cfg = ScenarioConfig::from_path(&config_path)
        .with_context(|| format!("failed to load scenario {}", config_path.display()))?;
    Ok(scenario_cfg)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if args.bench {
        bench_cycles();
        return Ok(());
    }

    let scenario_cfg = load_scenario_from_yaml(&args.file_name)?;
    let scenario = Scenario::build_scenario(&scenario_cfg);
    let runner = scenario.runner;
    let handle = runner.spawn()?;

    // stand-in for the renderer: drain snapshots in order and summarize them
    let mut consumed = 0;
    while consumed < args.cycles && runner.is_running() {
        let Some(snapshot) = runner.buffer().wait_next(Duration::from_millis(250)) else {
            continue;
        };
        consumed += 1;
        let present = snapshot.records.iter().filter(|r| r.exists).count();
        info!(
            cycle = snapshot.cycle,
            records = snapshot.records.len(),
            present,
            retired = snapshot.records.len() - present,
            "snapshot"
        );
    }

    runner.stop();
    let joined = handle.join().map_err(|_| anyhow::anyhow!("runner thread panicked"))?;
    joined?;

    let status = scenario.control.current_config();
    info!(
        consumed,
        bodies = status.body_count,
        skipped = runner.stats().cycles_skipped(),
        faults = runner.stats().task_faults(),
        "done"
    );
    Ok(())
}
