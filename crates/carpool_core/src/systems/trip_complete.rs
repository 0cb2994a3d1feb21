//! `TripComplete` handler: the driver
//! reaches the shared destination. Finalizes trip/request state and frees
//! the driver, then immediately retries matching since a driver just
//! became available.

use crate::clock::{Event, EventSubject};
use crate::ecs::{Driver, DriverAvailableSince, DriverState, Request, RequestState, Trip, TripState};

use super::ctx::HandlerCtx;
use super::matching_round::run_matching_round;

pub fn handle_trip_complete(ctx: &mut HandlerCtx, event: Event) {
    let trip_entity = match event.subject {
        Some(EventSubject::Trip(e)) => e,
        _ => return,
    };

    let stale = ctx
        .world
        .get::<Trip>(trip_entity)
        .map(|t| t.next_leg_due_at != event.timestamp)
        .unwrap_or(true);
    if stale {
        return;
    }

    let now = ctx.clock.now();

    let (driver, passengers, total_route_cost, destination) = {
        let mut trip = ctx.world.get_mut::<Trip>(trip_entity).expect("trip exists");
        trip.completed_at = Some(now);
        trip.state = TripState::Completed;
        (trip.driver, trip.passengers.clone(), trip.total_route_cost, trip.destination)
    };

    let mut detour_ratios = Vec::with_capacity(passengers.len());
    for passenger in &passengers {
        if let Some(mut request) = ctx.world.get_mut::<Request>(*passenger) {
            request.state = RequestState::Completed;
            request.completed_at = Some(now);
            let ratio = request.detour_ratio.unwrap_or(1.0);
            let actual = request.actual_trip_duration.unwrap_or(0.0);
            let solo = request.solo_trip_duration.unwrap_or(0.0);
            detour_ratios.push((ratio, actual, solo));
        }
    }

    if let Some(mut d) = ctx.world.get_mut::<Driver>(driver) {
        d.location = destination;
        d.state = DriverState::Available;
        d.available_since = now;
        d.trip = None;
    }
    ctx.world.entity_mut(driver).insert(DriverAvailableSince(now));
    ctx.registries.complete_trip(trip_entity);
    ctx.registries.add_available_driver(driver);

    ctx.metrics.record_trip_complete(
        ctx.clock.now_secs(),
        trip_entity,
        &passengers,
        total_route_cost,
        &detour_ratios,
        ctx.costs.detour_penalty_per_sec,
    );

    run_matching_round(ctx);
}
