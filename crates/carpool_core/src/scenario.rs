//! Builds a `World` from a validated [`Config`]: everything the runner
//! needs lives as resources inserted once, up front.

use bevy_ecs::prelude::{Resource, World};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;

use crate::clock::{EventKind, EventSubject, SimulationClock, ONE_SEC_MS};
use crate::clustering::DestinationClusterer;
use crate::config::Config;
use crate::ecs::{Driver, DriverAvailableSince, DriverState, DriverType, DriverTypes};
use crate::error::ConfigError;
use crate::geo::Location;
use crate::matching::{AssignmentConfig, FcfsMatcher, GroupEnumerator, ThresholdPolicy};
use crate::registries::Registries;
use crate::routing::oracle::MapOracle;
use crate::telemetry::Metrics;

/// Pooling-adjustment factor `alpha` for the threshold policy; not
/// exposed in the run configuration shape, so kept as a crate-level
/// constant rather than an unconfigurable magic number scattered across
/// call sites.
pub const THRESHOLD_POOLING_ALPHA: f64 = 0.3;

#[derive(Resource, Debug, Clone, Copy)]
pub struct CarpoolParams {
    pub capacity: u32,
    pub max_detour: f64,
    pub dynamic_insertion_enabled: bool,
}

#[derive(Resource, Debug, Clone, Copy)]
pub struct CostParams {
    pub waiting_cost_per_sec: f64,
    pub quit_penalty: f64,
    pub detour_penalty_per_sec: f64,
}

#[derive(Resource, Debug, Clone, Copy)]
pub struct RegionBounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

#[derive(Resource, Debug, Clone, Copy)]
pub struct FleetLimits {
    pub max_drivers: u32,
}

/// Stop condition for `runner::run_next_event`: live-generation handlers
/// keep scheduling their own successor arrival indefinitely, so the run
/// loop -- not the stream -- is what bounds a run to `config.simulation
/// .duration`.
#[derive(Resource, Debug, Clone, Copy)]
pub struct SimulationEndTimeMs(pub u64);

/// Global request-spawn parameters, consulted by
/// the live-generation branch of `RequestArrival`.
#[derive(Resource, Debug, Clone, Copy)]
pub struct RequestSpawnParams {
    pub arrival_rate: f64,
    pub weibull_shape: f64,
    pub weibull_scale: f64,
    pub waiting_cost_rate: f64,
}

/// One pre-generated or live-appended request arrival: time, origin,
/// destination. Weibull/cost parameters are not carried per-record since
/// a run only ever configures one shared shape/scale/rate triple.
#[derive(Debug, Clone, Copy)]
pub struct RequestArrivalRecord {
    pub time_ms: u64,
    pub origin: Location,
    pub destination: Location,
}

#[derive(Debug, Clone, Copy)]
pub struct DriverArrivalRecord {
    pub time_ms: u64,
    pub driver_type_id: u32,
    pub location: Location,
}

/// The canonical arrival log consulted by `RequestArrival`/`DriverArrival`
/// handlers via `EventSubject::Arrival(index)`. In pre-generated mode this is fully populated before the first
/// event is dispatched; in live-generation mode each handler appends its
/// own successor record just before scheduling it, so the lookup-by-index
/// code path is identical either way.
#[derive(Resource, Debug, Clone, Default)]
pub struct ArrivalStream {
    pub requests: Vec<RequestArrivalRecord>,
    pub drivers: Vec<DriverArrivalRecord>,
}

#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrivalMode {
    /// The full stream was generated before the first event and is never
    /// appended to; handlers must not enqueue successor arrivals.
    Pregenerated,
    /// Handlers sample and append their own successor record at dispatch
    /// time.
    Live,
}

/// RNG driving live-generation inter-arrival sampling and initial/live
/// location sampling. Kept separate from the patience-sampling RNG
/// (`distributions::sample_patience_secs`'s caller-supplied stream) so that
/// re-seeding the patience stream between dual-driver runs never perturbs
/// the arrival stream, and vice versa.
#[derive(Resource)]
pub struct ArrivalRng(pub StdRng);

/// RNG feeding `distributions::sample_patience_secs`. Re-seeded identically
/// before each dual-driver policy run so both policies draw the same
/// patience values at matched decision points.
#[derive(Resource)]
pub struct PatienceRng(pub StdRng);

impl PatienceRng {
    pub fn reseed(&mut self, seed: u64) {
        self.0 = StdRng::seed_from_u64(seed);
    }
}

#[derive(Resource)]
pub struct Oracle(pub Box<dyn MapOracle>);

/// Which matching policy this `World` runs:
/// the same event-kind handlers dispatch to either the optimal
/// group/IP matcher or the FCFS baseline depending on this resource.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    Fcfs,
    Optimal,
}

pub(crate) fn random_location(rng: &mut StdRng, bounds: &RegionBounds) -> Location {
    let lat = rng.gen_range(bounds.lat_min..=bounds.lat_max);
    let lon = rng.gen_range(bounds.lon_min..=bounds.lon_max);
    Location::new(lat, lon)
}

/// Samples a Poisson-process arrival stream over `[0, duration_ms]` for
/// requests and every driver type, from the configured seed. Used directly
/// by `dual_driver::run_comparison` to build the single shared stream both
/// policies consume.
pub fn generate_arrival_stream(config: &Config, seed: u64) -> ArrivalStream {
    let duration_ms = (config.simulation.duration * ONE_SEC_MS as f64).round() as u64;
    let bounds = RegionBounds {
        lat_min: config.region.bounds.lat_min,
        lat_max: config.region.bounds.lat_max,
        lon_min: config.region.bounds.lon_min,
        lon_max: config.region.bounds.lon_max,
    };
    let mut rng = StdRng::seed_from_u64(seed);

    let mut requests = Vec::new();
    if config.requests.arrival_rate > 0.0 {
        let mut t_secs = 0.0f64;
        loop {
            let u: f64 = rng.gen::<f64>().max(1e-12);
            t_secs += -u.ln() / config.requests.arrival_rate;
            let time_ms = (t_secs * ONE_SEC_MS as f64).round() as u64;
            if time_ms >= duration_ms {
                break;
            }
            requests.push(RequestArrivalRecord {
                time_ms,
                origin: random_location(&mut rng, &bounds),
                destination: random_location(&mut rng, &bounds),
            });
        }
    }

    let mut drivers = Vec::new();
    for dt in &config.driver_types {
        if dt.arrival_rate <= 0.0 {
            continue;
        }
        let mut t_secs = 0.0f64;
        loop {
            let u: f64 = rng.gen::<f64>().max(1e-12);
            t_secs += -u.ln() / dt.arrival_rate;
            let time_ms = (t_secs * ONE_SEC_MS as f64).round() as u64;
            if time_ms >= duration_ms {
                break;
            }
            drivers.push(DriverArrivalRecord {
                time_ms,
                driver_type_id: dt.id,
                location: random_location(&mut rng, &bounds),
            });
        }
    }
    drivers.sort_by_key(|d| d.time_ms);

    ArrivalStream { requests, drivers }
}

/// Builds a fresh `World` for one policy run. `arrival_stream` is `Some`
/// for dual-driver comparisons (both policies share it verbatim) and
/// `None` for a standalone live-generation run, where this function
/// schedules the first sampled arrival of each kind instead.
pub fn build_scenario(
    config: &Config,
    oracle: Box<dyn MapOracle>,
    policy: Policy,
    arrival_stream: Option<ArrivalStream>,
) -> Result<World, ConfigError> {
    config.validate()?;

    let mut world = World::new();

    let bounds = RegionBounds {
        lat_min: config.region.bounds.lat_min,
        lat_max: config.region.bounds.lat_max,
        lon_min: config.region.bounds.lon_min,
        lon_max: config.region.bounds.lon_max,
    };

    let driver_types: Vec<DriverType> = config
        .driver_types
        .iter()
        .map(|dt| DriverType {
            id: dt.id,
            name: dt.name.clone(),
            base_cost: dt.base_cost,
            arrival_rate: dt.arrival_rate,
            speed_multiplier: dt.speed_multiplier,
        })
        .collect();

    let metrics = config
        .metrics
        .as_ref()
        .map(|m| Metrics::new(m.history_size, m.update_interval))
        .unwrap_or_else(|| Metrics::new(100, 10.0));

    let duration_ms = (config.simulation.duration * ONE_SEC_MS as f64).round() as u64;

    world.insert_resource(SimulationClock::default());
    world.insert_resource(Registries::default());
    world.insert_resource(metrics);
    world.insert_resource(bounds);
    world.insert_resource(SimulationEndTimeMs(duration_ms));
    world.insert_resource(FleetLimits {
        max_drivers: config.simulation.max_drivers,
    });
    world.insert_resource(CarpoolParams {
        capacity: config.carpooling.capacity,
        max_detour: config.carpooling.detour_max,
        dynamic_insertion_enabled: config.carpooling.dynamic_insertion_enabled,
    });
    world.insert_resource(CostParams {
        waiting_cost_per_sec: config.costs.waiting_cost_per_sec,
        quit_penalty: config.costs.quit_penalty,
        detour_penalty_per_sec: config.costs.detour_penalty_per_sec,
    });
    world.insert_resource(RequestSpawnParams {
        arrival_rate: config.requests.arrival_rate,
        weibull_shape: config.requests.weibull_shape,
        weibull_scale: config.requests.weibull_scale,
        waiting_cost_rate: config.costs.waiting_cost_per_sec,
    });
    world.insert_resource(DriverTypes(driver_types.clone()));
    world.insert_resource(GroupEnumerator::new(
        config.carpooling.destination_cluster_radius_km,
        config.carpooling.detour_max,
    ));
    world.insert_resource(AssignmentConfig {
        capacity: config.carpooling.capacity,
        capacity_penalty_weight: config.carpooling.capacity_penalty_weight,
        max_search_nodes: 200_000,
    });
    world.insert_resource(ThresholdPolicy::new(
        &driver_types,
        config.costs.quit_penalty,
        THRESHOLD_POOLING_ALPHA,
    ));
    world.insert_resource(FcfsMatcher::default());
    world.insert_resource(DestinationClusterer::new(
        config.carpooling.destination_cluster_radius_km,
    ));
    world.insert_resource(Oracle(oracle));
    world.insert_resource(policy);
    world.insert_resource(PatienceRng(StdRng::seed_from_u64(
        config.simulation.random_seed,
    )));

    let mut registries = Registries::default();
    let mut arrival_rng = ArrivalRng(StdRng::seed_from_u64(
        config.simulation.random_seed ^ 0x5EED_5EED_5EED_5EED,
    ));

    // Initial drivers: present from t=0, never go through a DriverArrival
    // event.
    let initial_location_rng_seed = config.simulation.random_seed ^ 0xD412_D412_D412_D412;
    let mut initial_driver_rng = StdRng::seed_from_u64(initial_location_rng_seed);
    for _ in 0..config.simulation.initial_drivers {
        let type_id = driver_types
            .first()
            .map(|dt| dt.id)
            .expect("Config::validate rejects empty driver_types");
        let location = random_location(&mut initial_driver_rng, &bounds);
        let entity = world
            .spawn(Driver {
                type_id,
                location,
                state: DriverState::Available,
                available_since: 0,
                trip: None,
            })
            .insert(DriverAvailableSince(0))
            .id();
        registries.add_available_driver(entity);
    }

    match arrival_stream {
        Some(stream) => {
            for (idx, record) in stream.requests.iter().enumerate() {
                world.resource_mut::<SimulationClock>().schedule_at(
                    record.time_ms,
                    EventKind::RequestArrival,
                    Some(EventSubject::Arrival(idx as u64)),
                );
            }
            for (idx, record) in stream.drivers.iter().enumerate() {
                world.resource_mut::<SimulationClock>().schedule_at(
                    record.time_ms,
                    EventKind::DriverArrival,
                    Some(EventSubject::Arrival(idx as u64)),
                );
            }
            world.insert_resource(stream);
            world.insert_resource(ArrivalMode::Pregenerated);
        }
        None => {
            let mut stream = ArrivalStream::default();

            if config.requests.arrival_rate > 0.0 {
                let u: f64 = arrival_rng.0.gen::<f64>().max(1e-12);
                let gap_ms = ((-u.ln() / config.requests.arrival_rate) * ONE_SEC_MS as f64) as u64;
                let record = RequestArrivalRecord {
                    time_ms: gap_ms,
                    origin: random_location(&mut arrival_rng.0, &bounds),
                    destination: random_location(&mut arrival_rng.0, &bounds),
                };
                stream.requests.push(record);
                world.resource_mut::<SimulationClock>().schedule_at(
                    record.time_ms,
                    EventKind::RequestArrival,
                    Some(EventSubject::Arrival(0)),
                );
            }

            for dt in &driver_types {
                if dt.arrival_rate <= 0.0 {
                    continue;
                }
                let u: f64 = arrival_rng.0.gen::<f64>().max(1e-12);
                let gap_ms = ((-u.ln() / dt.arrival_rate) * ONE_SEC_MS as f64) as u64;
                let idx = stream.drivers.len() as u64;
                let record = DriverArrivalRecord {
                    time_ms: gap_ms,
                    driver_type_id: dt.id,
                    location: random_location(&mut arrival_rng.0, &bounds),
                };
                stream.drivers.push(record);
                world.resource_mut::<SimulationClock>().schedule_at(
                    record.time_ms,
                    EventKind::DriverArrival,
                    Some(EventSubject::Arrival(idx)),
                );
            }

            world.insert_resource(stream);
            world.insert_resource(ArrivalMode::Live);
        }
    }

    world.insert_resource(arrival_rng);
    world.insert_resource(registries);

    Ok(world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        Bounds, CarpoolingConfig, CostsConfig, DriverTypeConfig, RegionConfig, RequestsConfig,
        SimulationConfig,
    };
    use crate::routing::oracle::HaversineOracle;

    fn sample_config() -> Config {
        Config {
            simulation: SimulationConfig {
                duration: 100.0,
                initial_drivers: 2,
                max_drivers: 10,
                random_seed: 42,
            },
            region: RegionConfig {
                bounds: Bounds {
                    lat_min: 18.9,
                    lat_max: 19.3,
                    lon_min: 72.7,
                    lon_max: 73.1,
                },
            },
            carpooling: CarpoolingConfig {
                capacity: 3,
                detour_max: 1.5,
                destination_cluster_radius_km: 1.0,
                dynamic_insertion_enabled: true,
                capacity_penalty_weight: 3.0,
            },
            costs: CostsConfig {
                waiting_cost_per_sec: 0.01,
                quit_penalty: 50.0,
                detour_penalty_per_sec: 2.0,
            },
            driver_types: vec![DriverTypeConfig {
                id: 1,
                name: "Economy".into(),
                base_cost: 10.0,
                arrival_rate: 0.05,
                speed_multiplier: 1.0,
            }],
            requests: RequestsConfig {
                arrival_rate: 0.1,
                weibull_shape: 1.5,
                weibull_scale: 120.0,
            },
            metrics: None,
            map_oracle: Default::default(),
        }
    }

    #[test]
    fn build_world_spawns_initial_drivers_into_registry() {
        let config = sample_config();
        let world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, None).unwrap();
        let registries = world.resource::<Registries>();
        assert_eq!(registries.available_drivers.len(), 2);
    }

    #[test]
    fn arrival_stream_generation_is_deterministic_for_same_seed() {
        let config = sample_config();
        let a = generate_arrival_stream(&config, 42);
        let b = generate_arrival_stream(&config, 42);
        assert_eq!(a.requests.len(), b.requests.len());
        for (ra, rb) in a.requests.iter().zip(b.requests.iter()) {
            assert_eq!(ra.time_ms, rb.time_ms);
            assert_eq!(ra.origin, rb.origin);
        }
    }

    #[test]
    fn empty_arrival_rates_yield_empty_stream() {
        let mut config = sample_config();
        config.requests.arrival_rate = 0.0;
        config.driver_types[0].arrival_rate = 0.0;
        let stream = generate_arrival_stream(&config, 1);
        assert!(stream.requests.is_empty());
        assert!(stream.drivers.is_empty());
    }
}
