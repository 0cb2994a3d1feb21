//! Performance benchmarks for carpool_core using Criterion.rs.

use bevy_ecs::prelude::Entity;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use carpool_core::config::{
    Bounds, CarpoolingConfig, Config, CostsConfig, DriverTypeConfig, MapOracleConfig, RegionConfig,
    RequestsConfig, SimulationConfig,
};
use carpool_core::geo::Location;
use carpool_core::matching::GroupEnumerator;
use carpool_core::routing::HaversineOracle;
use carpool_core::runner::run_until_empty;
use carpool_core::scenario::{build_scenario, Policy};
use carpool_core::clustering::DestinationClusterer;

fn sample_config(arrival_rate: f64, driver_rate: f64, duration: f64) -> Config {
    Config {
        simulation: SimulationConfig { duration, initial_drivers: 5, max_drivers: 500, random_seed: 42 },
        region: RegionConfig { bounds: Bounds { lat_min: 18.9, lat_max: 19.3, lon_min: 72.7, lon_max: 73.1 } },
        carpooling: CarpoolingConfig {
            capacity: 4,
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
            arrival_rate: driver_rate,
            speed_multiplier: 1.0,
        }],
        requests: RequestsConfig { arrival_rate, weibull_shape: 1.5, weibull_scale: 120.0 },
        metrics: None,
        map_oracle: MapOracleConfig::default(),
    }
}

fn bench_simulation_run(c: &mut Criterion) {
    let scenarios = vec![
        ("small", 0.05, 0.02, 600.0),
        ("medium", 0.2, 0.08, 1_200.0),
        ("large", 0.5, 0.2, 1_800.0),
    ];

    let mut group = c.benchmark_group("simulation_run");
    for (name, req_rate, drv_rate, duration) in scenarios {
        group.bench_with_input(BenchmarkId::from_parameter(name), &(req_rate, drv_rate, duration), |b, &(req_rate, drv_rate, duration)| {
            b.iter(|| {
                let config = sample_config(req_rate, drv_rate, duration);
                let oracle = Box::new(HaversineOracle::default());
                let mut world = build_scenario(&config, oracle, Policy::Optimal, None).expect("valid config");
                black_box(run_until_empty(&mut world, 1_000_000));
            });
        });
    }
    group.finish();
}

fn bench_group_enumeration(c: &mut Criterion) {
    let oracle = HaversineOracle::default();
    let driver = Entity::from_raw(1);
    let driver_location = Location::new(19.0, 72.8);

    let mut cluster = Vec::new();
    for i in 0..8u32 {
        let offset = i as f64 * 0.001;
        cluster.push((
            Entity::from_raw(i + 2),
            Location::new(19.0 + offset, 72.8 + offset),
            Location::new(19.05, 72.85),
        ));
    }

    let mut group = c.benchmark_group("group_enumeration");
    group.bench_function("enumerate_8_requests_capacity_4", |b| {
        let mut enumerator = GroupEnumerator::new(1.0, 1.5);
        b.iter(|| {
            black_box(enumerator.enumerate_for_driver(&oracle, driver, driver_location, &cluster, 4));
        });
    });
    group.finish();
}

fn bench_destination_clustering(c: &mut Criterion) {
    let clusterer = DestinationClusterer::new(1.0);
    let mut requests = Vec::new();
    for i in 0..200u32 {
        let offset = (i % 20) as f64 * 0.002;
        requests.push((Entity::from_raw(i), Location::new(19.0 + offset, 72.8 + offset)));
    }

    c.bench_function("cluster_200_requests", |b| {
        b.iter(|| {
            black_box(clusterer.cluster_requests(&requests));
        });
    });
}

criterion_group!(benches, bench_simulation_run, bench_group_enumeration, bench_destination_clustering);
criterion_main!(benches);
