//! Matching round orchestration: the optimal
//! cluster/group-enumeration/IP path and the FCFS baseline, dispatched by
//! `run_matching_round` on whichever `Policy` the world was built with.

use std::collections::HashMap;

use bevy_ecs::prelude::Entity;

use crate::ecs::{Driver, DriverState, Request, RequestState, Trip};
use crate::geo::Location;
use crate::matching::fcfs::{ActiveTripView, FcfsOutcome};
use crate::matching::{solve_assignment_ip, FeasibleGroup};
use crate::routing::RoutingEngine;
use crate::scenario::Policy;

use super::ctx::HandlerCtx;
use super::trip_commit::{append_passenger, spawn_trip};

/// Entry point called after any event that can change who is waiting or
/// available: request arrival, driver arrival, and trip completion.
pub fn run_matching_round(ctx: &mut HandlerCtx) {
    match ctx.policy {
        Policy::Fcfs => run_fcfs_round(ctx),
        Policy::Optimal => run_optimal_round(ctx),
    }
}

fn waiting_requests(ctx: &HandlerCtx) -> Vec<(Entity, Location, Location)> {
    ctx.registries
        .active_requests
        .iter()
        .filter_map(|e| {
            ctx.world.get::<Request>(*e).and_then(|r| {
                if r.state == RequestState::Waiting {
                    Some((*e, r.origin, r.destination))
                } else {
                    None
                }
            })
        })
        .collect()
}

fn available_drivers(ctx: &HandlerCtx) -> Vec<(Entity, Location)> {
    ctx.registries
        .available_drivers
        .iter()
        .filter_map(|e| {
            ctx.world.get::<Driver>(*e).and_then(|d| {
                if d.state == DriverState::Available {
                    Some((*e, d.location))
                } else {
                    None
                }
            })
        })
        .collect()
}

/// FCFS baseline: walk waiting requests in arrival order, try to append
/// each to the first compatible active trip, otherwise dispatch the
/// earliest-available driver.
fn run_fcfs_round(ctx: &mut HandlerCtx) {
    let mut waiting = waiting_requests(ctx);
    waiting.sort_by_key(|(e, _, _)| ctx.world.get::<Request>(*e).map(|r| r.arrival_time).unwrap_or(0));

    for (request_entity, origin, destination) in waiting {
        // Re-check: an earlier iteration of this loop may have matched
        // this same request indirectly (it can't, since each request is
        // only ever visited once here, but a defensive re-check keeps the
        // invariant obvious without relying on iteration order subtleties).
        if ctx.world.get::<Request>(request_entity).map(|r| r.state) != Some(RequestState::Waiting) {
            continue;
        }

        let active_trip_views = build_active_trip_views(ctx);
        let available = ctx
            .registries
            .available_drivers
            .iter()
            .filter_map(|e| ctx.world.get::<Driver>(*e).map(|d| (*e, d.location, d.available_since)))
            .collect::<Vec<_>>();

        let oracle = ctx.oracle.0.as_ref();
        let outcome = ctx.fcfs.match_request(oracle, (request_entity, origin, destination), &active_trip_views, &available);

        match outcome {
            FcfsOutcome::NoDriverAvailable => {}
            FcfsOutcome::NewTrip { driver, route, pickup_leg_cost, route_cost } => {
                let passengers = vec![(request_entity, origin)];
                let actual_solo = RoutingEngine::actual_and_solo_durations(ctx.oracle.0.as_ref(), &route, destination, &passengers);
                let mut cost_by_passenger = HashMap::new();
                cost_by_passenger.insert(request_entity, route_cost);
                let mut detour_by_passenger = HashMap::new();
                detour_by_passenger.insert(request_entity, 1.0);
                spawn_trip(ctx, driver, passengers, destination, route, pickup_leg_cost, route_cost, cost_by_passenger, detour_by_passenger, actual_solo);
            }
            FcfsOutcome::AppendedToTrip { trip, new_route, route_cost, cost_by_passenger, detour_by_passenger } => {
                let remaining_passengers: Vec<(Entity, Location)> = {
                    let t = ctx.world.get::<Trip>(trip).expect("trip exists");
                    t.pickup_order[t.pickup_cursor..]
                        .iter()
                        .filter_map(|e| ctx.world.get::<Request>(*e).map(|r| (*e, r.origin)))
                        .collect()
                };
                let mut passengers_for_durations = remaining_passengers;
                passengers_for_durations.push((request_entity, origin));
                let trip_destination = ctx.world.get::<Trip>(trip).expect("trip exists").destination;
                let actual_solo = RoutingEngine::actual_and_solo_durations(ctx.oracle.0.as_ref(), &new_route, trip_destination, &passengers_for_durations);
                append_passenger(ctx, trip, (request_entity, origin), new_route, route_cost, cost_by_passenger, detour_by_passenger, actual_solo);

                let now_secs = ctx.clock.now_secs();
                let waiting_time = (ctx.clock.now().saturating_sub(
                    ctx.world.get::<Request>(request_entity).map(|r| r.arrival_time).unwrap_or(ctx.clock.now()),
                )) as f64
                    / crate::clock::ONE_SEC_MS as f64;
                let driver_for_trip = ctx.world.get::<Trip>(trip).map(|t| t.driver).unwrap_or(request_entity);
                let driver_type_id = ctx.world.get::<Driver>(driver_for_trip).map(|d| d.type_id).unwrap_or(0);
                ctx.metrics.record_match(
                    now_secs,
                    trip,
                    driver_for_trip,
                    driver_type_id,
                    &[(request_entity, waiting_time)],
                    ctx.costs.waiting_cost_per_sec,
                    route_cost,
                );
            }
        }
    }
}

fn build_active_trip_views(ctx: &HandlerCtx) -> Vec<ActiveTripView> {
    ctx.registries
        .active_trips
        .iter()
        .filter_map(|e| {
            ctx.world.get::<Trip>(*e).map(|t| {
                let passengers = t.pickup_order[t.pickup_cursor..]
                    .iter()
                    .filter_map(|p| ctx.world.get::<Request>(*p).map(|r| (*p, r.origin)))
                    .collect();
                ActiveTripView {
                    trip: *e,
                    driver: t.driver,
                    passengers,
                    route: t.route[t.pickup_cursor..].to_vec(),
                    destination: t.destination,
                    capacity: t.capacity,
                }
            })
        })
        .collect()
}

/// Optimal path: cluster the waiting pool by destination, enumerate every
/// feasible (driver, subset) group per cluster, and solve the
/// set-partitioning IP over all of them at once.
/// Only forms brand-new trips -- appending to an already-moving trip is
/// `dynamic_insertion`'s job, tried opportunistically at request arrival.
fn run_optimal_round(ctx: &mut HandlerCtx) {
    let waiting = waiting_requests(ctx);
    if waiting.is_empty() {
        return;
    }
    let drivers = available_drivers(ctx);
    if drivers.is_empty() {
        return;
    }

    let cluster_input: Vec<(Entity, Location)> = waiting.iter().map(|(e, _, d)| (*e, *d)).collect();
    let clusters = ctx.clusterer.cluster_requests(&cluster_input);

    let waiting_map: HashMap<Entity, (Location, Location)> =
        waiting.iter().map(|(e, o, d)| (*e, (*o, *d))).collect();

    let capacity = ctx.carpool.capacity as usize;
    let oracle = ctx.oracle.0.as_ref();

    let mut all_groups: Vec<FeasibleGroup> = Vec::new();
    for cluster_entities in clusters.values() {
        let cluster_tuples: Vec<(Entity, Location, Location)> = cluster_entities
            .iter()
            .map(|e| {
                let (o, d) = waiting_map[e];
                (*e, o, d)
            })
            .collect();

        for (driver, driver_location) in &drivers {
            let groups = ctx.group_enum.enumerate_for_driver(oracle, *driver, *driver_location, &cluster_tuples, capacity);
            all_groups.extend(groups);
        }
    }

    let all_request_entities: Vec<Entity> = waiting.iter().map(|(e, _, _)| *e).collect();
    let assignment = solve_assignment_ip(&all_groups, &all_request_entities, &ctx.assignment_config);

    if assignment.selected_groups.is_empty() && !all_groups.is_empty() {
        ctx.metrics.record_infeasible_round();
    }

    for idx in assignment.selected_groups {
        let group = all_groups[idx].clone();
        commit_optimal_group(ctx, &group);
    }
}

fn commit_optimal_group(ctx: &mut HandlerCtx, group: &FeasibleGroup) {
    let destination = *group.route.last().expect("feasible group always has a destination stop");
    let passengers: Vec<(Entity, Location)> = group
        .requests
        .iter()
        .filter_map(|e| ctx.world.get::<Request>(*e).map(|r| (*e, r.origin)))
        .collect();

    let actual_solo = RoutingEngine::actual_and_solo_durations(ctx.oracle.0.as_ref(), &group.route, destination, &passengers);

    spawn_trip(
        ctx,
        group.driver,
        passengers,
        destination,
        group.route.clone(),
        group.pickup_leg_cost,
        group.route_cost,
        group.cost_by_request.clone(),
        group.detour_by_request.clone(),
        actual_solo,
    );
}
