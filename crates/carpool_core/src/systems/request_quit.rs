//! `RequestQuit` handler: fires
//! unconditionally at the sampled patience deadline, but is a no-op if the
//! request was matched or already quit in the meantime -- lazy
//! cancellation, since the kernel never removes an already-scheduled event.

use crate::clock::{Event, EventSubject};
use crate::ecs::{Request, RequestState};

use super::ctx::HandlerCtx;

pub fn handle_request_quit(ctx: &mut HandlerCtx, event: Event) {
    let request_entity = match event.subject {
        Some(EventSubject::Request(e)) => e,
        _ => return,
    };

    let now = ctx.clock.now();
    let arrival_time = match ctx.world.get::<Request>(request_entity) {
        Some(r) if r.state == RequestState::Waiting => r.arrival_time,
        _ => return,
    };

    let waiting_time_secs = (now.saturating_sub(arrival_time)) as f64 / crate::clock::ONE_SEC_MS as f64;

    if let Some(mut request) = ctx.world.get_mut::<Request>(request_entity) {
        request.state = RequestState::Quit;
        request.quit_at = Some(now);
    }
    ctx.registries.remove_active_request(request_entity);
    ctx.metrics.record_quit(ctx.clock.now_secs(), request_entity, waiting_time_secs, ctx.costs.quit_penalty);
}
