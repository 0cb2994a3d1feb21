//! `RequestArrival` handler: spawns the request, tries an immediate dynamic
//! insertion, and otherwise schedules its quit timer and runs a matching
//! round right away under both policies. Under `Optimal` a `ThresholdReached`
//! event is also scheduled, so a request that isn't matched on arrival
//! still gets a forced retry once it has waited long enough to be worth
//! matching alone rather than holding out for a pool.

use rand::Rng;

use crate::clock::{Event, EventKind, EventSubject, ONE_SEC_MS};
use crate::distributions::sample_patience_secs;
use crate::ecs::{Request, RequestState};
use crate::scenario::{random_location, ArrivalMode, Policy, RequestArrivalRecord};

use super::ctx::HandlerCtx;
use super::dynamic_insertion::try_dynamic_insertion;
use super::matching_round::run_matching_round;

pub fn handle_request_arrival(ctx: &mut HandlerCtx, event: Event) {
    let idx = match event.subject {
        Some(EventSubject::Arrival(i)) => i as usize,
        _ => return,
    };
    let record = match ctx.arrival_stream.requests.get(idx).copied() {
        Some(r) => r,
        None => return,
    };
    let now = ctx.clock.now();

    if ctx.arrival_mode == ArrivalMode::Live {
        schedule_next_request_arrival(ctx);
    }

    let request = Request {
        origin: record.origin,
        destination: record.destination,
        arrival_time: now,
        weibull_shape: ctx.spawn_params.weibull_shape,
        weibull_scale: ctx.spawn_params.weibull_scale,
        waiting_cost_rate: ctx.spawn_params.waiting_cost_rate,
        state: RequestState::Waiting,
        matched_at: None,
        pickup_at: None,
        completed_at: None,
        quit_at: None,
        driver: None,
        trip: None,
        solo_trip_duration: None,
        actual_trip_duration: None,
        detour_ratio: None,
        cost_share: None,
    };
    let request_entity = ctx.world.spawn(request).id();
    ctx.registries.add_active_request(request_entity);
    ctx.metrics.record_request_arrival(ctx.clock.now_secs(), request_entity, record.origin, record.destination);

    if try_dynamic_insertion(ctx, request_entity) {
        return;
    }

    let patience_secs = sample_patience_secs(&mut ctx.patience_rng.0, ctx.spawn_params.weibull_shape, ctx.spawn_params.weibull_scale);
    ctx.clock.schedule_in_secs(patience_secs, EventKind::RequestQuit, Some(EventSubject::Request(request_entity)));

    if ctx.policy == Policy::Optimal {
        let active_pool_size = ctx.registries.active_requests.len() as u32;
        let threshold_secs = ctx
            .threshold_policy
            .compute_threshold(ctx.spawn_params.weibull_shape, ctx.spawn_params.weibull_scale, active_pool_size, ctx.carpool.capacity)
            .min(patience_secs);
        ctx.clock
            .schedule_in_secs(threshold_secs, EventKind::ThresholdReached, Some(EventSubject::Request(request_entity)));
    }

    run_matching_round(ctx);
}

fn schedule_next_request_arrival(ctx: &mut HandlerCtx) {
    if ctx.spawn_params.arrival_rate <= 0.0 {
        return;
    }
    let now = ctx.clock.now();
    let u: f64 = ctx.arrival_rng.0.gen::<f64>().max(1e-12);
    let gap_ms = ((-u.ln() / ctx.spawn_params.arrival_rate) * ONE_SEC_MS as f64).round() as u64;
    let time_ms = now + gap_ms;

    let origin = random_location(&mut ctx.arrival_rng.0, &ctx.bounds);
    let destination = random_location(&mut ctx.arrival_rng.0, &ctx.bounds);
    let idx = ctx.arrival_stream.requests.len() as u64;
    ctx.arrival_stream.requests.push(RequestArrivalRecord { time_ms, origin, destination });
    ctx.clock.schedule_at(time_ms, EventKind::RequestArrival, Some(EventSubject::Arrival(idx)));
}
