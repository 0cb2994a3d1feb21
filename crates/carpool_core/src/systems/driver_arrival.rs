//! `DriverArrival` handler: materializes the driver as `Available` and
//! immediately tries a matching round, since a freshly arrived driver can
//! satisfy requests that are already waiting. Materialization is skipped
//! once the fleet is at `max_drivers` (available + in-trip); the next
//! arrival is still scheduled regardless, so the fleet can grow again once
//! a trip completes and frees a slot.

use rand::Rng;

use crate::clock::{Event, EventKind, EventSubject, ONE_SEC_MS};
use crate::ecs::{Driver, DriverAvailableSince, DriverState};
use crate::scenario::{random_location, ArrivalMode, DriverArrivalRecord};

use super::ctx::HandlerCtx;
use super::matching_round::run_matching_round;

pub fn handle_driver_arrival(ctx: &mut HandlerCtx, event: Event) {
    let idx = match event.subject {
        Some(EventSubject::Arrival(i)) => i as usize,
        _ => return,
    };
    let record = match ctx.arrival_stream.drivers.get(idx).copied() {
        Some(r) => r,
        None => return,
    };
    let now = ctx.clock.now();

    if ctx.arrival_mode == ArrivalMode::Live {
        schedule_next_driver_arrival(ctx, record.driver_type_id);
    }

    let fleet_size = ctx.registries.available_drivers.len() + ctx.registries.active_trips.len();
    if fleet_size >= ctx.fleet.max_drivers as usize {
        return;
    }

    let entity = ctx
        .world
        .spawn(Driver {
            type_id: record.driver_type_id,
            location: record.location,
            state: DriverState::Available,
            available_since: now,
            trip: None,
        })
        .insert(DriverAvailableSince(now))
        .id();
    ctx.registries.add_available_driver(entity);

    run_matching_round(ctx);
}

fn schedule_next_driver_arrival(ctx: &mut HandlerCtx, driver_type_id: u32) {
    let rate = ctx.driver_types.get(driver_type_id).map(|dt| dt.arrival_rate).unwrap_or(0.0);
    if rate <= 0.0 {
        return;
    }
    let now = ctx.clock.now();
    let u: f64 = ctx.arrival_rng.0.gen::<f64>().max(1e-12);
    let gap_ms = ((-u.ln() / rate) * ONE_SEC_MS as f64).round() as u64;
    let time_ms = now + gap_ms;

    let location = random_location(&mut ctx.arrival_rng.0, &ctx.bounds);
    let idx = ctx.arrival_stream.drivers.len() as u64;
    ctx.arrival_stream.drivers.push(DriverArrivalRecord { time_ms, driver_type_id, location });
    ctx.clock.schedule_at(time_ms, EventKind::DriverArrival, Some(EventSubject::Arrival(idx)));
}
