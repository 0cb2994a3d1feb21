//! Simulation runner: advances the clock and dispatches events into the
//! ECS.
//!
//! Pops an event and dispatches it directly (`systems::dispatch_event`, see
//! `DESIGN.md`) rather than inserting it as a `CurrentEvent` resource and
//! running a `Schedule` of `run_if`-gated systems, so there is no schedule
//! to build or `apply_deferred` to sequence -- `World::spawn`/
//! `remove_resource` calls inside a handler are visible immediately to the
//! next handler.

use bevy_ecs::prelude::World;

use crate::clock::{Event, SimulationClock};
use crate::ecs::{Driver, DriverState, Request, RequestState, Trip};
use crate::registries::Registries;
use crate::scenario::SimulationEndTimeMs;
use crate::systems::dispatch_event;
use crate::telemetry::Metrics;

/// Runs one simulation step: pops the next event and dispatches it.
/// Returns `false` if the clock is empty or the next event falls at or
/// past `SimulationEndTimeMs` (when that resource is present).
pub fn run_next_event(world: &mut World) -> bool {
    let stop_at = world.get_resource::<SimulationEndTimeMs>().map(|e| e.0);
    let next_ts = world.get_resource::<SimulationClock>().and_then(|c| c.next_event_time());
    if let (Some(end_ms), Some(ts)) = (stop_at, next_ts) {
        if ts >= end_ms {
            return false;
        }
    }

    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };

    dispatch_event(world, event);
    maybe_capture_snapshot(world);
    true
}

/// Runs one simulation step and invokes `hook` with the event that was
/// just dispatched, after the `World` has settled. Used by callers (e.g.
/// a CLI's `--trace`) that want to observe every step without threading a
/// callback through every handler.
pub fn run_next_event_with_hook<F>(world: &mut World, mut hook: F) -> bool
where
    F: FnMut(&World, &Event),
{
    let stop_at = world.get_resource::<SimulationEndTimeMs>().map(|e| e.0);
    let next_ts = world.get_resource::<SimulationClock>().and_then(|c| c.next_event_time());
    if let (Some(end_ms), Some(ts)) = (stop_at, next_ts) {
        if ts >= end_ms {
            return false;
        }
    }

    let event = match world.resource_mut::<SimulationClock>().pop_next() {
        Some(e) => e,
        None => return false,
    };

    dispatch_event(world, event);
    maybe_capture_snapshot(world);
    hook(world, &event);
    true
}

/// Runs simulation steps until the event queue is empty, the end time is
/// reached, or `max_steps` is hit. Returns the number of steps executed.
pub fn run_until_empty(world: &mut World, max_steps: usize) -> usize {
    let mut steps = 0;
    while steps < max_steps && run_next_event(world) {
        steps += 1;
    }
    steps
}

/// Runs simulation steps until empty and invokes `hook` after each step.
pub fn run_until_empty_with_hook<F>(world: &mut World, max_steps: usize, mut hook: F) -> usize
where
    F: FnMut(&World, &Event),
{
    let mut steps = 0;
    while steps < max_steps && run_next_event_with_hook(world, &mut hook) {
        steps += 1;
    }
    steps
}

/// Captures a throttled metrics snapshot (`Metrics::maybe_snapshot`
/// no-ops internally if the configured interval hasn't elapsed).
fn maybe_capture_snapshot(world: &mut World) {
    let now_secs = match world.get_resource::<SimulationClock>() {
        Some(c) => c.now_secs(),
        None => return,
    };

    let active_requests = world
        .get_resource::<Registries>()
        .map(|r| r.active_requests.len())
        .unwrap_or(0);

    let mut available_drivers: std::collections::HashMap<u32, usize> = std::collections::HashMap::new();
    let mut passengers_in_transit = 0usize;
    let mut active_trips = 0usize;

    if let Some(registries) = world.get_resource::<Registries>() {
        for driver in registries.available_drivers.iter() {
            if let Some(d) = world.get::<Driver>(*driver) {
                if d.state == DriverState::Available {
                    *available_drivers.entry(d.type_id).or_insert(0) += 1;
                }
            }
        }
        active_trips = registries.active_trips.len();
        for trip in registries.active_trips.iter() {
            if let Some(t) = world.get::<Trip>(*trip) {
                for passenger in &t.passengers {
                    if let Some(r) = world.get::<Request>(*passenger) {
                        if r.state == RequestState::InTransit {
                            passengers_in_transit += 1;
                        }
                    }
                }
            }
        }
    }

    if let Some(mut metrics) = world.get_resource_mut::<Metrics>() {
        metrics.maybe_snapshot(now_secs, active_requests, available_drivers, active_trips, passengers_in_transit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Bounds, CarpoolingConfig, Config, CostsConfig, DriverTypeConfig, RegionConfig, RequestsConfig, SimulationConfig};
    use crate::routing::oracle::HaversineOracle;
    use crate::scenario::{build_scenario, Policy};

    fn sample_config() -> Config {
        Config {
            simulation: SimulationConfig { duration: 600.0, initial_drivers: 3, max_drivers: 10, random_seed: 7 },
            region: RegionConfig { bounds: Bounds { lat_min: 18.9, lat_max: 19.3, lon_min: 72.7, lon_max: 73.1 } },
            carpooling: CarpoolingConfig {
                capacity: 4,
                detour_max: 1.5,
                destination_cluster_radius_km: 1.0,
                dynamic_insertion_enabled: true,
                capacity_penalty_weight: 3.0,
            },
            costs: CostsConfig { waiting_cost_per_sec: 0.01, quit_penalty: 50.0, detour_penalty_per_sec: 2.0 },
            driver_types: vec![DriverTypeConfig { id: 1, name: "Economy".into(), base_cost: 10.0, arrival_rate: 0.05, speed_multiplier: 1.0 }],
            requests: RequestsConfig { arrival_rate: 0.2, weibull_shape: 1.5, weibull_scale: 120.0 },
            metrics: None,
            map_oracle: Default::default(),
        }
    }

    #[test]
    fn run_until_empty_terminates_within_step_budget() {
        let config = sample_config();
        let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Fcfs, None).unwrap();
        let steps = run_until_empty(&mut world, 100_000);
        assert!(steps > 0);
        assert!(world.resource::<SimulationClock>().is_empty() || steps == 100_000);
    }

    #[test]
    fn run_stops_at_simulation_end_time() {
        let config = sample_config();
        let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, None).unwrap();
        run_until_empty(&mut world, 100_000);
        let clock = world.resource::<SimulationClock>();
        if let Some(ts) = clock.next_event_time() {
            assert!(ts >= world.resource::<SimulationEndTimeMs>().0);
        }
    }
}
