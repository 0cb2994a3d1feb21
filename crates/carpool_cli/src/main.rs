//! Command-line shell for the carpool matching simulator.
//!
//! The core only ever accepts an already-parsed `Config`; reading a file
//! from disk and deserializing it is this crate's job, keeping the
//! library free of filesystem and argument-parsing concerns.

use std::fs;
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand, ValueEnum};

use carpool_core::config::Config;
use carpool_core::dual_driver::run_comparison;
use carpool_core::routing::build_map_oracle;
use carpool_core::runner::run_until_empty;
use carpool_core::scenario::build_scenario;
use carpool_core::telemetry_export;
use carpool_core::Policy as CorePolicy;

#[derive(Parser)]
#[command(name = "carpool-sim", about = "Discrete-event carpool matching simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single scenario under one matching policy.
    Run {
        /// Path to a JSON config file.
        #[arg(long)]
        config: PathBuf,
        /// Which matching policy to run.
        #[arg(long, value_enum, default_value_t = PolicyArg::Optimal)]
        policy: PolicyArg,
        /// Upper bound on dispatched events, as a runaway-loop backstop.
        #[arg(long, default_value_t = 5_000_000)]
        max_steps: usize,
        /// Write the full metrics export to this file as JSON instead of
        /// just printing the summary.
        #[arg(long)]
        export: Option<PathBuf>,
    },
    /// Run the FCFS baseline and the optimal policy over the same arrival
    /// stream and report the cost difference.
    Compare {
        #[arg(long)]
        config: PathBuf,
        #[arg(long, default_value_t = 5_000_000)]
        max_steps: usize,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum PolicyArg {
    Fcfs,
    Optimal,
}

impl From<PolicyArg> for CorePolicy {
    fn from(value: PolicyArg) -> Self {
        match value {
            PolicyArg::Fcfs => CorePolicy::Fcfs,
            PolicyArg::Optimal => CorePolicy::Optimal,
        }
    }
}

fn load_config(path: &PathBuf) -> Config {
    let raw = fs::read_to_string(path).unwrap_or_else(|error| {
        eprintln!("failed to read config file {}: {error}", path.display());
        exit(1);
    });
    serde_json::from_str(&raw).unwrap_or_else(|error| {
        eprintln!("failed to parse config file {}: {error}", path.display());
        exit(1);
    })
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, policy, max_steps, export } => {
            let config = load_config(&config);
            let oracle = build_map_oracle(&config.map_oracle);
            let mut world = build_scenario(&config, oracle, policy.into(), None).unwrap_or_else(|error| {
                eprintln!("invalid configuration: {error}");
                exit(1);
            });
            let steps = run_until_empty(&mut world, max_steps);
            if steps == max_steps {
                eprintln!("warning: run hit the {max_steps}-step budget before the event queue drained");
            }

            let clock = world.resource::<carpool_core::clock::SimulationClock>();
            let now_secs = clock.now_secs();
            let metrics = world.resource::<carpool_core::telemetry::Metrics>();

            if let Some(path) = export {
                let full = telemetry_export::current_metrics(metrics, now_secs);
                let json = serde_json::to_string_pretty(&full).expect("metrics export always serializes");
                fs::write(&path, json).unwrap_or_else(|error| {
                    eprintln!("failed to write export file {}: {error}", path.display());
                    exit(1);
                });
                eprintln!("wrote metrics export to {}", path.display());
            }

            let summary = telemetry_export::summary(metrics);
            println!("{}", serde_json::to_string_pretty(&summary).expect("summary always serializes"));
        }
        Commands::Compare { config, max_steps } => {
            let config = load_config(&config);
            let comparison = run_comparison(&config, max_steps).unwrap_or_else(|error| {
                eprintln!("invalid configuration: {error}");
                exit(1);
            });
            println!(
                "{}",
                serde_json::json!({
                    "fcfs": &comparison.fcfs,
                    "optimal": &comparison.optimal,
                    "cost_improvement": comparison.cost_improvement(),
                })
            );
        }
    }
}
