//! `PickupComplete` handler: the driver reaches the
//! next waypoint in its route. Stale events (superseded by a route
//! mutation that rescheduled this leg) are recognized via
//! `Trip::next_leg_due_at` and dropped.

use crate::clock::Event;
use crate::clock::EventSubject;
use crate::ecs::{Driver, DriverState, Request, RequestState, Trip};
use crate::routing::oracle::MapOracle;

use super::ctx::HandlerCtx;
use super::trip_commit::reschedule_next_leg;

pub fn handle_pickup_complete(ctx: &mut HandlerCtx, event: Event) {
    let trip_entity = match event.subject {
        Some(EventSubject::Trip(e)) => e,
        _ => return,
    };

    let (idx, passenger, leg_cost, stop, route_len) = {
        let trip = match ctx.world.get::<Trip>(trip_entity) {
            Some(t) => t,
            None => return,
        };
        if trip.next_leg_due_at != event.timestamp {
            return;
        }
        let idx = trip.pickup_cursor;
        if idx >= trip.pickup_order.len() {
            ctx.metrics.record_inconsistent_state();
            return;
        }
        let passenger = trip.pickup_order[idx];
        let stop = trip.route[idx];
        let leg_cost = if idx == 0 {
            trip.pickup_leg_cost
        } else {
            ctx.oracle.0.as_ref().duration_secs(trip.route[idx - 1], stop)
        };
        (idx, passenger, leg_cost, stop, trip.route.len())
    };

    let now = ctx.clock.now();

    if let Some(mut request) = ctx.world.get_mut::<Request>(passenger) {
        request.state = RequestState::InTransit;
        request.pickup_at = Some(now);
    }

    let driver = {
        let mut trip = ctx.world.get_mut::<Trip>(trip_entity).expect("trip exists");
        trip.completed_pickups.push(passenger);
        trip.pickup_cursor = idx + 1;
        trip.completed_leg_cost += leg_cost;
        trip.driver
    };

    if let Some(mut d) = ctx.world.get_mut::<Driver>(driver) {
        d.location = stop;
        if idx + 1 == route_len - 1 {
            d.state = DriverState::InTrip;
        }
    }

    reschedule_next_leg(ctx, trip_entity);
}
