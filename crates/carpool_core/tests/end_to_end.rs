//! End-to-end scenarios driven entirely through the public `build_scenario`
//! / `run_until_empty` surface, with manually constructed arrival streams
//! and manually spawned drivers wherever a scenario needs precise control
//! over timing or geometry instead of seeded randomness.

use bevy_ecs::prelude::World;

use carpool_core::config::{
    Bounds, CarpoolingConfig, Config, CostsConfig, DriverTypeConfig, MapOracleConfig, MetricsConfig,
    RegionConfig, RequestsConfig, SimulationConfig,
};
use carpool_core::ecs::{Driver, DriverAvailableSince, DriverState};
use carpool_core::geo::Location;
use carpool_core::registries::Registries;
use carpool_core::routing::HaversineOracle;
use carpool_core::runner::run_until_empty;
use carpool_core::scenario::{
    build_scenario, generate_arrival_stream, ArrivalStream, DriverArrivalRecord, Policy, RequestArrivalRecord,
};
use carpool_core::telemetry::Metrics;

fn base_config() -> Config {
    Config {
        simulation: SimulationConfig { duration: 100.0, initial_drivers: 0, max_drivers: 20, random_seed: 42 },
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
        driver_types: vec![DriverTypeConfig {
            id: 1,
            name: "Economy".into(),
            base_cost: 10.0,
            arrival_rate: 0.05,
            speed_multiplier: 1.0,
        }],
        requests: RequestsConfig { arrival_rate: 0.0, weibull_shape: 1.5, weibull_scale: 120.0 },
        metrics: Some(MetricsConfig { update_interval: 10.0, enable_streaming: false, output_file: None, history_size: 100 }),
        map_oracle: MapOracleConfig::default(),
    }
}

fn spawn_driver(world: &mut World, location: Location) -> bevy_ecs::prelude::Entity {
    let entity = world
        .spawn(Driver {
            type_id: 1,
            location,
            state: DriverState::Available,
            available_since: 0,
            trip: None,
        })
        .insert(DriverAvailableSince(0))
        .id();
    world.resource_mut::<Registries>().add_available_driver(entity);
    entity
}

#[test]
fn empty_world_produces_no_matches_or_quits() {
    let config = base_config();
    let stream = ArrivalStream::default();
    let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream)).unwrap();

    let steps = run_until_empty(&mut world, 1_000);
    assert_eq!(steps, 0);

    let metrics = world.resource::<Metrics>();
    assert_eq!(metrics.total_requests, 0);
    assert_eq!(metrics.total_matches, 0);
    assert_eq!(metrics.total_quits, 0);

    let registries = world.resource::<Registries>();
    assert!(registries.active_requests.is_empty());
    assert!(registries.active_trips.is_empty());
}

#[test]
fn solo_request_gets_matched_and_trip_completes() {
    let mut config = base_config();
    config.simulation.duration = 3_000.0;
    config.requests.weibull_shape = 1.5;
    config.requests.weibull_scale = 1.0e6; // clamps the optimal threshold to its 600s ceiling

    let origin = Location::new(19.0, 72.8);
    let destination = Location::new(19.1, 72.9);
    let stream = ArrivalStream {
        requests: vec![RequestArrivalRecord { time_ms: 0, origin, destination }],
        drivers: vec![],
    };

    let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream)).unwrap();
    spawn_driver(&mut world, origin);

    run_until_empty(&mut world, 1_000_000);

    let metrics = world.resource::<Metrics>();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.total_matches, 1);
    assert_eq!(metrics.total_quits, 0);
    assert_eq!(metrics.total_trips(), 1);
    assert!((metrics.avg_detour_ratio() - 1.0).abs() < 1e-6);

    let registries = world.resource::<Registries>();
    assert!(registries.active_requests.is_empty());
    assert!(registries.active_trips.is_empty());
    assert_eq!(registries.completed_trips.len(), 1);
    assert_eq!(registries.available_drivers.len(), 1);
}

#[test]
fn unreachable_request_quits_after_its_patience_expires() {
    let mut config = base_config();
    config.simulation.duration = 6_000.0;
    config.requests.weibull_shape = 1.0;
    config.requests.weibull_scale = 5.0; // mean patience ~5s; never matched since no driver ever exists

    let stream = ArrivalStream {
        requests: vec![RequestArrivalRecord {
            time_ms: 0,
            origin: Location::new(19.0, 72.8),
            destination: Location::new(19.1, 72.9),
        }],
        drivers: vec![],
    };

    let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream)).unwrap();
    run_until_empty(&mut world, 1_000_000);

    let metrics = world.resource::<Metrics>();
    assert_eq!(metrics.total_requests, 1);
    assert_eq!(metrics.total_matches, 0);
    assert_eq!(metrics.total_quits, 1);

    let registries = world.resource::<Registries>();
    assert!(registries.active_requests.is_empty());
}

#[test]
fn three_codestinational_requests_pool_into_one_trip() {
    let mut config = base_config();
    config.simulation.duration = 3_000.0;
    config.requests.weibull_scale = 1.0e6;

    let destination = Location::new(19.2, 73.0);
    let stream = ArrivalStream {
        requests: vec![
            RequestArrivalRecord { time_ms: 0, origin: Location::new(19.0, 72.80), destination },
            RequestArrivalRecord { time_ms: 0, origin: Location::new(19.0, 72.81), destination },
            RequestArrivalRecord { time_ms: 0, origin: Location::new(19.0, 72.82), destination },
        ],
        drivers: vec![],
    };

    let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream)).unwrap();
    spawn_driver(&mut world, Location::new(19.0, 72.80));

    run_until_empty(&mut world, 1_000_000);

    let metrics = world.resource::<Metrics>();
    assert_eq!(metrics.total_requests, 3);
    assert_eq!(metrics.total_matches, 3);
    assert_eq!(metrics.total_quits, 0);

    let registries = world.resource::<Registries>();
    assert!(registries.active_requests.is_empty());
    assert_eq!(registries.completed_trips.len(), 1);
}

#[test]
fn later_request_is_dynamically_inserted_into_a_moving_trip() {
    let mut config = base_config();
    config.simulation.duration = 3_000.0;
    config.requests.weibull_scale = 1.0e6; // clamps the first request's threshold to 600s

    let driver_start = Location::new(19.0, 72.8);
    let destination = Location::new(19.1, 72.9);

    let stream = ArrivalStream {
        requests: vec![
            RequestArrivalRecord { time_ms: 0, origin: driver_start, destination },
            // Arrives while the trip is still en route to `destination`, well
            // before the 600s threshold fires again for anyone else, long
            // before TripComplete for the first passenger.
            RequestArrivalRecord { time_ms: 650_000, origin: Location::new(19.05, 72.85), destination },
        ],
        drivers: vec![],
    };

    let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream)).unwrap();
    spawn_driver(&mut world, driver_start);

    run_until_empty(&mut world, 1_000_000);

    let metrics = world.resource::<Metrics>();
    assert_eq!(metrics.total_requests, 2);
    assert_eq!(metrics.total_quits, 0);
    assert_eq!(metrics.total_dynamic_insertions, 1);
    // Each passenger's match is recorded separately (the solo match at
    // t=600s, then the inserted passenger's own match at t=650s).
    assert_eq!(metrics.total_matches, 2);

    let registries = world.resource::<Registries>();
    assert_eq!(registries.completed_trips.len(), 1);
    assert!(registries.active_requests.is_empty());
}

#[test]
fn capacity_saturation_leaves_excess_requests_waiting() {
    let mut config = base_config();
    config.simulation.duration = 3_000.0;
    config.requests.weibull_scale = 1.0e6;
    config.carpooling.capacity = 3;

    let destination = Location::new(19.2, 73.0);
    let requests = (0..10u64)
        .map(|i| RequestArrivalRecord {
            time_ms: i,
            origin: Location::new(19.10 + 0.001 * i as f64, 72.90 + 0.0005 * i as f64),
            destination,
        })
        .collect();
    let stream = ArrivalStream { requests, drivers: vec![] };

    let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream)).unwrap();
    spawn_driver(&mut world, Location::new(19.00, 72.80));
    spawn_driver(&mut world, Location::new(19.02, 72.82));
    spawn_driver(&mut world, Location::new(19.05, 72.85));

    run_until_empty(&mut world, 1_000_000);

    let metrics = world.resource::<Metrics>();
    assert_eq!(metrics.total_requests, 10);
    assert_eq!(metrics.total_quits, 0);
    assert!(metrics.total_matches >= 1);
    assert!(metrics.total_matches <= 9, "at most 3 drivers x capacity 3 can be matched");
    assert!(metrics.total_trips() <= 3);

    let registries = world.resource::<Registries>();
    assert_eq!(registries.active_requests.len() as u64, 10 - metrics.total_matches);
}

#[test]
fn live_generation_run_conserves_every_request_across_match_quit_and_waiting() {
    let mut config = base_config();
    config.simulation.duration = 1_200.0;
    config.simulation.initial_drivers = 5;
    config.requests.arrival_rate = 0.1;
    config.driver_types[0].arrival_rate = 0.03;

    let world_build = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, None);
    let mut world = world_build.unwrap();
    run_until_empty(&mut world, 1_000_000);

    let metrics = world.resource::<Metrics>();
    let registries = world.resource::<Registries>();
    assert_eq!(metrics.total_requests, metrics.total_matches + metrics.total_quits + registries.active_requests.len() as u64);
}

#[test]
fn driver_arrivals_beyond_max_drivers_are_dropped() {
    let mut config = base_config();
    config.simulation.duration = 10.0;
    config.simulation.max_drivers = 2;

    let stream = ArrivalStream {
        requests: vec![],
        drivers: (0..5u64)
            .map(|i| DriverArrivalRecord {
                time_ms: i,
                driver_type_id: 1,
                location: Location::new(19.0 + 0.001 * i as f64, 72.8),
            })
            .collect(),
    };

    let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream)).unwrap();
    run_until_empty(&mut world, 1_000);

    let registries = world.resource::<Registries>();
    assert_eq!(registries.available_drivers.len(), 2, "fleet must not grow past max_drivers");
}

#[test]
fn optimal_policy_matches_immediately_when_a_driver_is_already_available() {
    let mut config = base_config();
    config.simulation.duration = 3_000.0;
    config.requests.weibull_scale = 1.0e6; // threshold would clamp to 600s if relied on instead

    let origin = Location::new(19.0, 72.8);
    let destination = Location::new(19.1, 72.9);
    let stream = ArrivalStream {
        requests: vec![RequestArrivalRecord { time_ms: 0, origin, destination }],
        drivers: vec![],
    };

    let mut world = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream)).unwrap();
    spawn_driver(&mut world, origin);

    // A driver is available before the request even arrives, so the
    // arrival-time matching round should match it well before the 600s
    // threshold would otherwise fire.
    run_until_empty(&mut world, 1_000_000);
    let metrics = world.resource::<Metrics>();
    assert_eq!(metrics.total_matches, 1);
    let trip_duration = metrics.waiting_times_secs.first().copied().unwrap_or(f64::MAX);
    assert!(trip_duration < 600.0, "request should be matched well before the threshold fires, waited {trip_duration}s");
}

#[test]
fn generated_stream_is_deterministic_and_feeds_a_reproducible_run() {
    let mut config = base_config();
    config.requests.arrival_rate = 0.1;

    let stream_a = generate_arrival_stream(&config, config.simulation.random_seed);
    let stream_b = generate_arrival_stream(&config, config.simulation.random_seed);

    let mut world_a = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream_a)).unwrap();
    let mut world_b = build_scenario(&config, Box::new(HaversineOracle::default()), Policy::Optimal, Some(stream_b)).unwrap();

    run_until_empty(&mut world_a, 1_000_000);
    run_until_empty(&mut world_b, 1_000_000);

    let metrics_a = world_a.resource::<Metrics>();
    let metrics_b = world_b.resource::<Metrics>();
    assert_eq!(metrics_a.total_requests, metrics_b.total_requests);
    assert_eq!(metrics_a.total_matches, metrics_b.total_matches);
    assert_eq!(metrics_a.total_quits, metrics_b.total_quits);
}
