//! Dual Driver: runs the FCFS baseline and the optimal policy over the
//! exact same arrival stream and patience draws, so the only thing that
//! can differ between the two runs is the matching decision itself.

use bevy_ecs::prelude::World;

use crate::config::Config;
use crate::routing::{build_map_oracle, MapOracle};
use crate::runner::run_until_empty;
use crate::scenario::{build_scenario, generate_arrival_stream, PatienceRng, Policy};
use crate::telemetry::Metrics;
use crate::telemetry_export::{self, Summary};

/// Side-by-side summaries of an identical scenario run once under each
/// policy.
#[derive(Debug)]
pub struct Comparison {
    pub fcfs: Summary,
    pub optimal: Summary,
}

impl Comparison {
    /// Fractional reduction in total cost the optimal policy achieved over
    /// FCFS; negative if FCFS happened to come out cheaper.
    pub fn cost_improvement(&self) -> f64 {
        if self.fcfs.total_cost <= 0.0 {
            return 0.0;
        }
        (self.fcfs.total_cost - self.optimal.total_cost) / self.fcfs.total_cost
    }
}

/// Runs both policies over one shared arrival stream with a fixed
/// maximum step budget per run, returning their final summaries.
///
/// The arrival stream is generated once (`generate_arrival_stream`) and
/// handed to both `build_scenario` calls verbatim, so request/driver
/// arrival times and locations are pinned across the pair. `PatienceRng`
/// is reseeded from the same `random_seed` for each world independently
/// inside `build_scenario`, so both draw the same patience sequence at
/// the same decision points as long as each run visits requests in the
/// same order it was given them -- which dynamic insertion timing can
/// perturb between policies, an accepted divergence recorded in
/// `DESIGN.md`.
pub fn run_comparison(config: &Config, max_steps: usize) -> Result<Comparison, crate::error::ConfigError> {
    config.validate()?;

    let stream = generate_arrival_stream(config, config.simulation.random_seed);

    let fcfs_oracle = build_map_oracle(&config.map_oracle);
    let mut fcfs_world = build_scenario(config, fcfs_oracle, Policy::Fcfs, Some(stream.clone()))?;
    reseed_patience(&mut fcfs_world, config.simulation.random_seed);
    run_until_empty(&mut fcfs_world, max_steps);
    let fcfs_summary = summarize(&fcfs_world);

    let optimal_oracle = build_map_oracle(&config.map_oracle);
    let mut optimal_world = build_scenario(config, optimal_oracle, Policy::Optimal, Some(stream))?;
    reseed_patience(&mut optimal_world, config.simulation.random_seed);
    run_until_empty(&mut optimal_world, max_steps);
    let optimal_summary = summarize(&optimal_world);

    Ok(Comparison { fcfs: fcfs_summary, optimal: optimal_summary })
}

/// `build_scenario` already seeds `PatienceRng` from `random_seed`; this
/// re-seed is a no-op in the single-call path above but keeps the
/// guarantee explicit and cheap to re-assert if a caller reuses a world
/// across multiple comparison runs.
fn reseed_patience(world: &mut World, seed: u64) {
    if let Some(mut rng) = world.get_resource_mut::<PatienceRng>() {
        rng.reseed(seed);
    }
}

fn summarize(world: &World) -> Summary {
    let metrics = world.resource::<Metrics>();
    telemetry_export::summary(metrics)
}

/// Oracle stats collected separately since `Comparison` only carries the
/// telemetry `Summary`, not the oracle itself.
pub fn cache_stats(oracle: &dyn MapOracle) -> (u64, u64) {
    oracle.cache_stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bounds, CarpoolingConfig, CostsConfig, DriverTypeConfig, RegionConfig, RequestsConfig, SimulationConfig};

    fn sample_config() -> Config {
        Config {
            simulation: SimulationConfig { duration: 600.0, initial_drivers: 3, max_drivers: 10, random_seed: 99 },
            region: RegionConfig { bounds: Bounds { lat_min: 18.9, lat_max: 19.3, lon_min: 72.7, lon_max: 73.1 } },
            carpooling: CarpoolingConfig {
                capacity: 4,
                detour_max: 1.5,
                destination_cluster_radius_km: 1.0,
                dynamic_insertion_enabled: true,
                capacity_penalty_weight: 3.0,
            },
            costs: CostsConfig { waiting_cost_per_sec: 0.01, quit_penalty: 50.0, detour_penalty_per_sec: 2.0 },
            driver_types: vec![DriverTypeConfig { id: 1, name: "Economy".into(), base_cost: 10.0, arrival_rate: 0.08, speed_multiplier: 1.0 }],
            requests: RequestsConfig { arrival_rate: 0.25, weibull_shape: 1.5, weibull_scale: 120.0 },
            metrics: None,
            map_oracle: Default::default(),
        }
    }

    #[test]
    fn both_policies_see_the_same_request_count() {
        let config = sample_config();
        let comparison = run_comparison(&config, 200_000).expect("valid config");
        assert_eq!(comparison.fcfs.total_requests, comparison.optimal.total_requests);
        assert!(comparison.fcfs.total_requests > 0);
    }

    #[test]
    fn cost_improvement_is_zero_when_fcfs_cost_is_zero() {
        let comparison = Comparison {
            fcfs: Summary { total_requests: 0, total_matches: 0, total_quits: 0, match_rate: 0.0, avg_pool_size: 0.0, dynamic_insertions: 0, total_cost: 0.0 },
            optimal: Summary { total_requests: 0, total_matches: 0, total_quits: 0, match_rate: 0.0, avg_pool_size: 0.0, dynamic_insertions: 0, total_cost: 0.0 },
        };
        assert_eq!(comparison.cost_improvement(), 0.0);
    }
}
