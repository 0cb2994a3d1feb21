//! Runs a standard scenario under both policies and prints a side-by-side
//! summary.
//!
//! Run with: cargo run -p carpool_core --example scenario_run --release

use carpool_core::config::{
    Bounds, CarpoolingConfig, Config, CostsConfig, DriverTypeConfig, MapOracleConfig, MetricsConfig,
    RegionConfig, RequestsConfig, SimulationConfig,
};
use carpool_core::dual_driver::run_comparison;

fn maharashtra_config() -> Config {
    Config {
        simulation: SimulationConfig {
            duration: 4.0 * 3600.0,
            initial_drivers: 50,
            max_drivers: 200,
            random_seed: 42,
        },
        region: RegionConfig {
            bounds: Bounds { lat_min: 18.9, lat_max: 19.3, lon_min: 72.7, lon_max: 73.1 },
        },
        carpooling: CarpoolingConfig {
            capacity: 3,
            detour_max: 1.5,
            destination_cluster_radius_km: 1.0,
            dynamic_insertion_enabled: true,
            capacity_penalty_weight: 3.0,
        },
        costs: CostsConfig { waiting_cost_per_sec: 0.01, quit_penalty: 50.0, detour_penalty_per_sec: 2.0 },
        driver_types: vec![
            DriverTypeConfig { id: 1, name: "Economy".into(), base_cost: 10.0, arrival_rate: 0.02, speed_multiplier: 1.0 },
            DriverTypeConfig { id: 2, name: "Premium".into(), base_cost: 18.0, arrival_rate: 0.008, speed_multiplier: 1.1 },
        ],
        requests: RequestsConfig { arrival_rate: 0.3, weibull_shape: 1.5, weibull_scale: 180.0 },
        metrics: Some(MetricsConfig { update_interval: 30.0, enable_streaming: false, output_file: None, history_size: 200 }),
        map_oracle: MapOracleConfig::default(),
    }
}

fn main() {
    let config = maharashtra_config();
    let comparison = run_comparison(&config, 5_000_000).expect("scenario config is valid");

    println!("--- Scenario run (Maharashtra bounds, seed {}) ---", config.simulation.random_seed);
    println!(
        "FCFS:    requests={} matches={} quits={} match_rate={:.3} total_cost={:.1}",
        comparison.fcfs.total_requests,
        comparison.fcfs.total_matches,
        comparison.fcfs.total_quits,
        comparison.fcfs.match_rate,
        comparison.fcfs.total_cost,
    );
    println!(
        "Optimal: requests={} matches={} quits={} match_rate={:.3} total_cost={:.1} avg_pool_size={:.2} insertions={}",
        comparison.optimal.total_requests,
        comparison.optimal.total_matches,
        comparison.optimal.total_quits,
        comparison.optimal.match_rate,
        comparison.optimal.total_cost,
        comparison.optimal.avg_pool_size,
        comparison.optimal.dynamic_insertions,
    );
    println!("Cost improvement of optimal over FCFS: {:.1}%", comparison.cost_improvement() * 100.0);
}
