//! Simulation time: millisecond-scale timeline advanced by a priority queue
//! of future events.
//!
//! All timestamps are in **simulation milliseconds**. The queue is a
//! `BinaryHeap` ordered as a min-heap by `(timestamp, sequence)`: this
//! kernel must dispatch same-timestamp events in strict insertion order,
//! so every scheduled event is stamped with a monotonically increasing
//! sequence number at schedule time rather than tie-broken by event kind.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bevy_ecs::prelude::{Entity, Resource};

pub const ONE_SEC_MS: u64 = 1000;
pub const ONE_MIN_MS: u64 = 60 * ONE_SEC_MS;

/// The six event kinds of the matching simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RequestArrival,
    DriverArrival,
    RequestQuit,
    ThresholdReached,
    PickupComplete,
    TripComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    Request(Entity),
    Driver(Entity),
    Trip(Entity),
    /// Index into the pre-generated `ArrivalStream`: `RequestArrival`/
    /// `DriverArrival` events carry this instead of an `Entity` because
    /// the entity doesn't exist until the handler spawns it.
    Arrival(u64),
}

/// A scheduled event. `seq` is assigned by `SimulationClock::schedule` and
/// is the sole tie-breaker for same-timestamp events, giving strict FIFO
/// ordering within equal keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub timestamp: u64,
    pub kind: EventKind,
    pub subject: Option<EventSubject>,
    seq: u64,
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: reverse both timestamp and seq so `BinaryHeap::pop`
        // returns the earliest-scheduled event with the smallest timestamp.
        other
            .timestamp
            .cmp(&self.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, Resource)]
pub struct CurrentEvent(pub Event);

/// Priority queue of pending events plus the current simulation clock.
#[derive(Debug, Clone, Resource)]
pub struct SimulationClock {
    now: u64,
    events: BinaryHeap<Event>,
    next_seq: u64,
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self {
            now: 0,
            events: BinaryHeap::new(),
            next_seq: 0,
        }
    }
}

impl SimulationClock {
    pub fn now(&self) -> u64 {
        self.now
    }

    pub fn now_secs(&self) -> f64 {
        self.now as f64 / ONE_SEC_MS as f64
    }

    pub fn schedule_at(&mut self, at_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule(Event {
            timestamp: at_ms,
            kind,
            subject,
            seq: 0,
        });
    }

    pub fn schedule_at_secs(&mut self, at_secs: f64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at((at_secs * ONE_SEC_MS as f64).round() as u64, kind, subject);
    }

    pub fn schedule_in(&mut self, delta_ms: u64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_at(self.now.saturating_add(delta_ms), kind, subject);
    }

    pub fn schedule_in_secs(&mut self, delta_secs: f64, kind: EventKind, subject: Option<EventSubject>) {
        self.schedule_in((delta_secs * ONE_SEC_MS as f64).round() as u64, kind, subject);
    }

    /// Schedule a fully-formed event. `seq` is overwritten with the next
    /// monotonic sequence number regardless of what the caller supplied.
    pub fn schedule(&mut self, mut event: Event) {
        debug_assert!(
            event.timestamp >= self.now,
            "event timestamp must be >= current time"
        );
        event.seq = self.next_seq;
        self.next_seq += 1;
        self.events.push(event);
    }

    pub fn pop_next(&mut self) -> Option<Event> {
        let event = self.events.pop()?;
        self.now = event.timestamp;
        Some(event)
    }

    pub fn next_event_time(&self) -> Option<u64> {
        self.events.peek().map(|event| event.timestamp)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn pending_event_count(&self) -> usize {
        self.events.len()
    }
}
