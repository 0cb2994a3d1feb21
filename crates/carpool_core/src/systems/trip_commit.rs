//! Shared trip-creation and route-mutation bookkeeping used by the
//! optimal group commit, the FCFS append path, and dynamic insertion
//!.

use std::collections::HashMap;

use bevy_ecs::prelude::Entity;

use crate::clock::{EventKind, EventSubject, ONE_SEC_MS};
use crate::ecs::{Driver, DriverState, Request, RequestState, Trip, TripState};
use crate::geo::Location;
use crate::routing::RoutingEngine;

use super::ctx::HandlerCtx;

/// Spawns a brand-new `Trip` for `driver` carrying `passengers`, wires up
/// the driver/request components and registries, records the match, and
/// schedules the first leg.
#[allow(clippy::too_many_arguments)]
pub fn spawn_trip(
    ctx: &mut HandlerCtx,
    driver: Entity,
    passengers: Vec<(Entity, Location)>,
    destination: Location,
    route: Vec<Location>,
    pickup_leg_cost: f64,
    route_cost: f64,
    cost_by_passenger: HashMap<Entity, f64>,
    detour_by_passenger: HashMap<Entity, f64>,
    actual_solo: HashMap<Entity, (f64, f64)>,
) -> Entity {
    let now = ctx.clock.now();

    let pickups: Vec<Location> = route[..route.len() - 1].to_vec();
    let pickup_order = RoutingEngine::match_pickups_to_entities(&pickups, &passengers);

    let trip = Trip {
        driver,
        passengers: passengers.iter().map(|(e, _)| *e).collect(),
        route,
        pickup_order,
        destination,
        capacity: ctx.carpool.capacity,
        started_at: now,
        completed_at: None,
        pickup_cursor: 0,
        next_leg_due_at: now,
        completed_pickups: Vec::new(),
        total_route_cost: pickup_leg_cost + route_cost,
        pickup_leg_cost,
        route_cost,
        completed_leg_cost: 0.0,
        cost_by_passenger: cost_by_passenger.clone(),
        detour_by_passenger: detour_by_passenger.clone(),
        state: TripState::PickingUp,
    };
    let trip_entity = ctx.world.spawn(trip).id();

    if let Some(mut d) = ctx.world.get_mut::<Driver>(driver) {
        d.state = DriverState::EnRoutePickup;
        d.trip = Some(trip_entity);
    }
    ctx.registries.remove_available_driver(driver);
    ctx.registries.add_active_trip(trip_entity);

    for (passenger, _origin) in &passengers {
        let (actual, solo) = actual_solo.get(passenger).copied().unwrap_or((0.0, 0.0));
        let detour = detour_by_passenger.get(passenger).copied().unwrap_or(1.0);
        let cost_share = cost_by_passenger.get(passenger).copied().unwrap_or(0.0);
        if let Some(mut req) = ctx.world.get_mut::<Request>(*passenger) {
            req.state = RequestState::Matched;
            req.matched_at = Some(now);
            req.driver = Some(driver);
            req.trip = Some(trip_entity);
            req.solo_trip_duration = Some(solo);
            req.actual_trip_duration = Some(actual);
            req.detour_ratio = Some(detour);
            req.cost_share = Some(cost_share);
        }
        ctx.registries.remove_active_request(*passenger);
    }

    let waiting_time_entries: Vec<(Entity, f64)> = passengers
        .iter()
        .map(|(e, _)| {
            let arrival_time = ctx.world.get::<Request>(*e).map(|r| r.arrival_time).unwrap_or(now);
            (*e, (now.saturating_sub(arrival_time)) as f64 / ONE_SEC_MS as f64)
        })
        .collect();
    let driver_type_id = ctx.world.get::<Driver>(driver).map(|d| d.type_id).unwrap_or(0);

    ctx.metrics.record_match(
        now as f64 / ONE_SEC_MS as f64,
        trip_entity,
        driver,
        driver_type_id,
        &waiting_time_entries,
        ctx.costs.waiting_cost_per_sec,
        pickup_leg_cost + route_cost,
    );

    reschedule_next_leg(ctx, trip_entity);

    trip_entity
}

/// Splices a newly accepted passenger into an already-moving trip's
/// *remaining* route (everything from `pickup_cursor` onward). The prefix
/// of `route`/`pickup_order` for stops already reached is never touched,
/// preserving the sunk `completed_leg_cost`.
#[allow(clippy::too_many_arguments)]
pub fn append_passenger(
    ctx: &mut HandlerCtx,
    trip_entity: Entity,
    new_passenger: (Entity, Location),
    new_remaining_route: Vec<Location>,
    remaining_route_cost: f64,
    cost_by_passenger: HashMap<Entity, f64>,
    detour_by_passenger: HashMap<Entity, f64>,
    actual_solo: HashMap<Entity, (f64, f64)>,
) {
    let now = ctx.clock.now();

    let remaining_pickups: Vec<Location> = new_remaining_route[..new_remaining_route.len() - 1].to_vec();
    let remaining_passengers: Vec<(Entity, Location)> = {
        let trip = ctx.world.get::<Trip>(trip_entity).expect("trip exists");
        let mut out: Vec<(Entity, Location)> = trip.pickup_order[trip.pickup_cursor..]
            .iter()
            .filter_map(|e| ctx.world.get::<Request>(*e).map(|r| (*e, r.origin)))
            .collect();
        out.push(new_passenger);
        out
    };
    let new_pickup_order_suffix = RoutingEngine::match_pickups_to_entities(&remaining_pickups, &remaining_passengers);

    let driver;
    {
        let mut trip = ctx.world.get_mut::<Trip>(trip_entity).expect("trip exists");
        let cursor = trip.pickup_cursor;
        trip.route.truncate(cursor);
        trip.route.extend(new_remaining_route);
        trip.pickup_order.truncate(cursor);
        trip.pickup_order.extend(new_pickup_order_suffix);
        trip.passengers.push(new_passenger.0);
        trip.route_cost = trip.completed_leg_cost + remaining_route_cost;
        for (entity, cost) in &cost_by_passenger {
            trip.cost_by_passenger.insert(*entity, *cost);
        }
        for (entity, detour) in &detour_by_passenger {
            trip.detour_by_passenger.insert(*entity, *detour);
        }
        trip.recompute_total_route_cost();
        driver = trip.driver;
    }

    for (entity, (actual, solo)) in &actual_solo {
        let detour = detour_by_passenger.get(entity).copied().unwrap_or(1.0);
        let cost_share = cost_by_passenger.get(entity).copied().unwrap_or(0.0);
        if let Some(mut req) = ctx.world.get_mut::<Request>(*entity) {
            req.solo_trip_duration = Some(*solo);
            req.actual_trip_duration = Some(*actual);
            req.detour_ratio = Some(detour);
            req.cost_share = Some(cost_share);
        }
    }

    if let Some(mut req) = ctx.world.get_mut::<Request>(new_passenger.0) {
        req.state = RequestState::Matched;
        req.matched_at = Some(now);
        req.driver = Some(driver);
        req.trip = Some(trip_entity);
    }
    ctx.registries.remove_active_request(new_passenger.0);

    reschedule_next_leg(ctx, trip_entity);
}

/// Recomputes the ETA of the current `pickup_cursor` waypoint and
/// (re)schedules the event for it, stamping `Trip::next_leg_due_at` so a
/// now-stale previously-scheduled event can recognize itself as
/// superseded.
pub fn reschedule_next_leg(ctx: &mut HandlerCtx, trip_entity: Entity) {
    let driver = ctx.world.get::<Trip>(trip_entity).expect("trip exists").driver;
    let driver_location = ctx.world.get::<Driver>(driver).expect("driver exists").location;

    let (cursor, next_stop, route_len) = {
        let trip = ctx.world.get::<Trip>(trip_entity).expect("trip exists");
        (trip.pickup_cursor, trip.route[trip.pickup_cursor], trip.route.len())
    };

    let delta_secs = ctx.oracle().duration_secs(driver_location, next_stop);
    let due_at = ctx.clock.now() + (delta_secs * ONE_SEC_MS as f64).round() as u64;

    if let Some(mut trip) = ctx.world.get_mut::<Trip>(trip_entity) {
        trip.next_leg_due_at = due_at;
    }

    let kind = if cursor + 1 == route_len {
        EventKind::TripComplete
    } else {
        EventKind::PickupComplete
    };
    ctx.clock.schedule_at(due_at, kind, Some(EventSubject::Trip(trip_entity)));
}
