//! Renders `Metrics` into the external JSON shapes consumed by operators
//! and reporting tools: a point-in-time export, a final run summary, and
//! a time-series dump for plotting.

use serde::Serialize;
use serde_json::{json, Value};

use crate::telemetry::Metrics;

/// The point-in-time metrics export document.
#[derive(Debug, Serialize)]
pub struct MetricsExport {
    pub simulation_time: f64,
    pub cumulative: CumulativeView,
    pub carpooling: CarpoolingView,
    pub cost_breakdown: CostBreakdownView,
    pub driver_stats: serde_json::Map<String, Value>,
    pub recent_events: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct CumulativeView {
    pub total_requests: u64,
    pub total_matches: u64,
    pub total_quits: u64,
    pub match_rate: f64,
    pub total_cost: f64,
    pub avg_waiting_time: f64,
    pub avg_detour_ratio: f64,
}

#[derive(Debug, Serialize)]
pub struct CarpoolingView {
    pub pool_utilization: serde_json::Map<String, Value>,
    pub avg_pool_size: f64,
    pub total_trips: u64,
    pub dynamic_insertions: u64,
    pub insertion_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct CostBreakdownView {
    pub waiting_cost: f64,
    pub routing_cost: f64,
    pub quit_penalty: f64,
    pub detour_penalty: f64,
}

/// Final run report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_requests: u64,
    pub total_matches: u64,
    pub total_quits: u64,
    pub match_rate: f64,
    pub avg_pool_size: f64,
    pub dynamic_insertions: u64,
    pub total_cost: f64,
}

pub fn current_metrics(metrics: &Metrics, simulation_time_secs: f64) -> MetricsExport {
    let mut pool_utilization = serde_json::Map::new();
    for (pool_size, count) in &metrics.pool_size_histogram {
        pool_utilization.insert(pool_size.to_string(), json!(count));
    }

    let mut driver_stats = serde_json::Map::new();
    for (type_id, stats) in &metrics.driver_stats {
        driver_stats.insert(
            type_id.to_string(),
            json!({ "trips": stats.trips, "passengers": stats.passengers }),
        );
    }

    let recent_events: Vec<Value> = metrics
        .recent_events
        .iter()
        .rev()
        .take(10)
        .rev()
        .map(event_to_json)
        .collect();

    MetricsExport {
        simulation_time: simulation_time_secs,
        cumulative: CumulativeView {
            total_requests: metrics.total_requests,
            total_matches: metrics.total_matches,
            total_quits: metrics.total_quits,
            match_rate: metrics.match_rate(),
            total_cost: metrics.total_cost(),
            avg_waiting_time: metrics.avg_waiting_time(),
            avg_detour_ratio: metrics.avg_detour_ratio(),
        },
        carpooling: CarpoolingView {
            pool_utilization,
            avg_pool_size: metrics.avg_pool_size(),
            total_trips: metrics.total_trips(),
            dynamic_insertions: metrics.total_dynamic_insertions,
            insertion_rate: metrics.insertion_rate(),
        },
        cost_breakdown: CostBreakdownView {
            waiting_cost: metrics.total_waiting_cost,
            routing_cost: metrics.total_routing_cost,
            quit_penalty: metrics.total_quit_penalty,
            detour_penalty: metrics.total_detour_penalty,
        },
        driver_stats,
        recent_events,
    }
}

pub fn summary(metrics: &Metrics) -> Summary {
    Summary {
        total_requests: metrics.total_requests,
        total_matches: metrics.total_matches,
        total_quits: metrics.total_quits,
        match_rate: metrics.match_rate(),
        avg_pool_size: metrics.avg_pool_size(),
        dynamic_insertions: metrics.total_dynamic_insertions,
        total_cost: metrics.total_cost(),
    }
}

/// Time-series export for plotting utilities: waiting times, detour
/// ratios, match times, and the
/// raw snapshot history.
pub fn time_series(metrics: &Metrics) -> Value {
    json!({
        "waiting_times": metrics.waiting_times_secs,
        "detour_ratios": metrics.detour_ratios,
        "match_times": metrics.match_times_secs,
        "snapshots": metrics.snapshots.iter().map(|s| json!({
            "time": s.time_secs,
            "active_requests": s.active_requests,
            "available_drivers": s.available_drivers,
            "active_trips": s.active_trips,
            "passengers_in_transit": s.passengers_in_transit,
        })).collect::<Vec<_>>(),
    })
}

fn event_to_json(event: &crate::telemetry::SimEvent) -> Value {
    use crate::telemetry::SimEvent::*;
    match event {
        RequestArrival { time_secs, request, origin, destination } => json!({
            "type": "request_arrival",
            "time": time_secs,
            "request_id": format!("{request:?}"),
            "origin": { "lat": origin.lat, "lon": origin.lon },
            "destination": { "lat": destination.lat, "lon": destination.lon },
        }),
        Match { time_secs, trip, driver, passengers, pool_size, route_cost } => json!({
            "type": "match",
            "time": time_secs,
            "trip_id": format!("{trip:?}"),
            "driver_id": format!("{driver:?}"),
            "passengers": passengers.iter().map(|p| format!("{p:?}")).collect::<Vec<_>>(),
            "pool_size": pool_size,
            "route_cost": route_cost,
        }),
        Quit { time_secs, request, waiting_time_secs, penalty } => json!({
            "type": "quit",
            "time": time_secs,
            "request_id": format!("{request:?}"),
            "waiting_time": waiting_time_secs,
            "penalty": penalty,
        }),
        DynamicInsertion { time_secs, request, trip, new_pool_size } => json!({
            "type": "dynamic_insertion",
            "time": time_secs,
            "request_id": format!("{request:?}"),
            "trip_id": format!("{trip:?}"),
            "new_pool_size": new_pool_size,
        }),
        TripComplete { time_secs, trip, passengers, total_cost } => json!({
            "type": "trip_complete",
            "time": time_secs,
            "trip_id": format!("{trip:?}"),
            "passengers": passengers.iter().map(|p| format!("{p:?}")).collect::<Vec<_>>(),
            "total_cost": total_cost,
        }),
    }
}
