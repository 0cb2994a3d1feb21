//! `ThresholdReached` handler: the optimal policy's
//! signal to stop waiting for more poolers and run a batch matching round
//! over the current waiting pool. A no-op if the request was already
//! matched or quit before its threshold fired.

use crate::clock::{Event, EventSubject};
use crate::ecs::{Request, RequestState};

use super::ctx::HandlerCtx;
use super::matching_round::run_matching_round;

pub fn handle_threshold_reached(ctx: &mut HandlerCtx, event: Event) {
    let request_entity = match event.subject {
        Some(EventSubject::Request(e)) => e,
        _ => return,
    };

    let still_waiting = ctx
        .world
        .get::<Request>(request_entity)
        .map(|r| r.state == RequestState::Waiting)
        .unwrap_or(false);
    if !still_waiting {
        return;
    }

    run_matching_round(ctx);
}
