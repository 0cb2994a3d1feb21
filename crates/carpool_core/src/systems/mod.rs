//! Event handlers and matching orchestration.
//!
//! A bevy `Schedule` of narrow systems, each scoped to the single entity
//! the current event names, would be a natural fit for most handlers
//! here. The matching round is inherently wide, though -- one round reads
//! every waiting request and every available driver at once -- so instead
//! of forcing that through a `Query` tuple wide enough to cover it, every
//! resource a handler might need is pulled out of the `World` once per
//! event into [`ctx::HandlerCtx`] and handed to a plain function; see
//! `dispatch_event` for the extraction/reinsertion and `DESIGN.md` for why.

mod ctx;
mod driver_arrival;
mod dynamic_insertion;
mod matching_round;
mod pickup_complete;
mod request_arrival;
mod request_quit;
mod threshold_reached;
mod trip_commit;
mod trip_complete;

pub use ctx::{dispatch_event, HandlerCtx};
pub use matching_round::run_matching_round;
