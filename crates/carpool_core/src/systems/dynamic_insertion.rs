//! Opportunistic dynamic insertion: tried once, at request arrival, against
//! every active trip with free capacity and a compatible destination,
//! before the request is left to wait for a scheduled matching round.
//! Gated by `carpooling.dynamic_insertion_enabled` and only meaningful
//! under the optimal policy -- FCFS has its own, simpler append path in
//! `matching_round::run_fcfs_round`.

use bevy_ecs::prelude::Entity;

use crate::ecs::{Driver, Request, Trip, TripState};
use crate::geo::Location;
use crate::routing::RoutingEngine;
use crate::scenario::Policy;

use super::ctx::HandlerCtx;
use super::trip_commit::append_passenger;

/// Attempts to splice `request_entity` into the cheapest compatible
/// active trip. Returns `true` if the request was matched this way.
pub fn try_dynamic_insertion(ctx: &mut HandlerCtx, request_entity: Entity) -> bool {
    if ctx.policy != Policy::Optimal || !ctx.carpool.dynamic_insertion_enabled {
        return false;
    }

    let (origin, destination) = match ctx.world.get::<Request>(request_entity) {
        Some(r) => (r.origin, r.destination),
        None => return false,
    };

    let candidate_trips: Vec<Entity> = ctx
        .registries
        .active_trips
        .iter()
        .copied()
        .filter(|t| {
            ctx.world
                .get::<Trip>(*t)
                .map(|trip| {
                    trip.state != TripState::Completed
                        && !trip.is_full()
                        && ctx.clusterer.are_compatible(trip.destination, destination)
                })
                .unwrap_or(false)
        })
        .collect();

    if candidate_trips.is_empty() {
        return false;
    }

    let max_detour = ctx.carpool.max_detour;
    let oracle = ctx.oracle.0.as_ref();

    let mut best: Option<(Entity, Vec<Location>, f64, std::collections::HashMap<Entity, f64>)> = None;

    for trip_entity in &candidate_trips {
        let (driver_location, existing_passengers) = {
            let trip = ctx.world.get::<Trip>(*trip_entity).expect("filtered above");
            let driver_location = ctx.world.get::<Driver>(trip.driver).map(|d| d.location).unwrap_or(origin);
            let existing_passengers: Vec<(Entity, Location)> = trip.pickup_order[trip.pickup_cursor..]
                .iter()
                .filter_map(|e| ctx.world.get::<Request>(*e).map(|r| (*e, r.origin)))
                .collect();
            (driver_location, existing_passengers)
        };

        if let Some((route, cost, detours)) =
            RoutingEngine::try_insert_request(oracle, driver_location, &existing_passengers, (request_entity, origin), destination, max_detour)
        {
            let better = best.as_ref().map(|(_, _, best_cost, _)| cost < *best_cost).unwrap_or(true);
            if better {
                best = Some((*trip_entity, route, cost, detours));
            }
        }
    }

    let (trip_entity, route, route_cost, detours) = match best {
        Some(b) => b,
        None => return false,
    };

    let trip_destination = ctx.world.get::<Trip>(trip_entity).expect("trip exists").destination;
    let remaining_passengers: Vec<(Entity, Location)> = {
        let trip = ctx.world.get::<Trip>(trip_entity).expect("trip exists");
        let mut v: Vec<(Entity, Location)> = trip.pickup_order[trip.pickup_cursor..]
            .iter()
            .filter_map(|e| ctx.world.get::<Request>(*e).map(|r| (*e, r.origin)))
            .collect();
        v.push((request_entity, origin));
        v
    };
    let actual_solo = RoutingEngine::actual_and_solo_durations(ctx.oracle.0.as_ref(), &route, trip_destination, &remaining_passengers);
    let cost_by_passenger = RoutingEngine::split_costs_by_detour(route_cost, &detours);

    append_passenger(ctx, trip_entity, (request_entity, origin), route, route_cost, cost_by_passenger, detours, actual_solo);

    let now_secs = ctx.clock.now_secs();
    let pool_size = ctx.world.get::<Trip>(trip_entity).map(|t| t.passengers.len()).unwrap_or(1);
    ctx.metrics.record_dynamic_insertion(now_secs, request_entity, trip_entity, pool_size);

    let driver = ctx.world.get::<Trip>(trip_entity).map(|t| t.driver).unwrap();
    let driver_type_id = ctx.world.get::<Driver>(driver).map(|d| d.type_id).unwrap_or(0);
    let waiting_time = (ctx.clock.now().saturating_sub(
        ctx.world.get::<Request>(request_entity).map(|r| r.arrival_time).unwrap_or(ctx.clock.now()),
    )) as f64
        / crate::clock::ONE_SEC_MS as f64;
    ctx.metrics.record_match(
        now_secs,
        trip_entity,
        driver,
        driver_type_id,
        &[(request_entity, waiting_time)],
        ctx.costs.waiting_cost_per_sec,
        route_cost,
    );

    true
}
