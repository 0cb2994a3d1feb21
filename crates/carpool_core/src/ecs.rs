//! ECS components and resources for the carpool matching world.
//!
//! `Trip` is n-passenger carpool, not one-rider-per-trip: a driver,
//! 1..=capacity passengers, and a route of pickups followed by the
//! shared destination, all addressed by plain `geo::Location`.

use std::collections::HashMap;

use bevy_ecs::prelude::{Component, Entity, Resource};

use crate::geo::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Spawned at scenario build time but not yet arrived; activated to
    /// `Available` by its `DriverArrival` event.
    Pending,
    Available,
    EnRoutePickup,
    InTrip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Spawned at scenario build time but not yet arrived; activated to
    /// `Waiting` by its `RequestArrival` event.
    Pending,
    Waiting,
    Matched,
    InTransit,
    Completed,
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripState {
    PickingUp,
    EnRouteDestination,
    Completed,
}

/// Immutable driver-type economics, looked up by id from a `Vec<DriverType>`
/// resource built at scenario setup.
#[derive(Debug, Clone)]
pub struct DriverType {
    pub id: u32,
    pub name: String,
    pub base_cost: f64,
    pub arrival_rate: f64,
    pub speed_multiplier: f64,
}

#[derive(Resource, Debug, Clone, Default)]
pub struct DriverTypes(pub Vec<DriverType>);

impl DriverTypes {
    pub fn get(&self, id: u32) -> Option<&DriverType> {
        self.0.iter().find(|dt| dt.id == id)
    }

    /// Driver types sorted by ascending base cost (`threshold_policy`'s
    /// "cheapest type" convention).
    pub fn sorted_by_cost(&self) -> Vec<&DriverType> {
        let mut v: Vec<&DriverType> = self.0.iter().collect();
        v.sort_by(|a, b| a.base_cost.partial_cmp(&b.base_cost).unwrap());
        v
    }
}

#[derive(Component, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverAvailableSince(pub u64);

/// A driver entity. `trip` is `Some` iff `state == InTrip` or
/// `EnRoutePickup`.
#[derive(Component, Debug, Clone)]
pub struct Driver {
    pub type_id: u32,
    pub location: Location,
    pub state: DriverState,
    pub available_since: u64,
    pub trip: Option<Entity>,
}

/// A ride request. Derived carpool fields are populated once the request
/// is matched into a trip.
#[derive(Component, Debug, Clone)]
pub struct Request {
    pub origin: Location,
    pub destination: Location,
    pub arrival_time: u64,
    pub weibull_shape: f64,
    pub weibull_scale: f64,
    pub waiting_cost_rate: f64,
    pub state: RequestState,
    pub matched_at: Option<u64>,
    pub pickup_at: Option<u64>,
    pub completed_at: Option<u64>,
    pub quit_at: Option<u64>,
    pub driver: Option<Entity>,
    pub trip: Option<Entity>,
    pub solo_trip_duration: Option<f64>,
    pub actual_trip_duration: Option<f64>,
    pub detour_ratio: Option<f64>,
    pub cost_share: Option<f64>,
}

impl Request {
    pub fn is_active(&self) -> bool {
        matches!(self.state, RequestState::Waiting)
    }
}

/// A carpool trip: one driver, 1..=capacity passengers, a route of
/// pickups followed by the shared destination.
#[derive(Component, Debug, Clone)]
pub struct Trip {
    pub driver: Entity,
    pub passengers: Vec<Entity>,
    /// `[pickup_1, ..., pickup_k, destination]`.
    pub route: Vec<Location>,
    /// Passenger owning each of `route`'s first `route.len() - 1` entries,
    /// in the same order. Kept as an explicit parallel array (rather than
    /// re-deriving it from coordinate matches) so the kernel always knows
    /// which passenger is "locked in" as the immediate next stop, which a
    /// dynamic insertion must never displace (see `systems::try_dynamic_insertion`).
    pub pickup_order: Vec<Entity>,
    pub destination: Location,
    pub capacity: u32,
    pub started_at: u64,
    pub completed_at: Option<u64>,
    /// Index of the next route waypoint not yet reached.
    pub pickup_cursor: usize,
    /// Timestamp the currently-scheduled `PickupComplete`/`TripComplete`
    /// event for `pickup_cursor` is expected to fire at. A route mutation
    /// (FCFS append, dynamic insertion) can change the ETA of that same
    /// waypoint after the old event is already queued; since the kernel
    /// has no way to cancel a queued event, the handler compares its own
    /// timestamp against this field and no-ops if they disagree, treating
    /// itself as superseded by the event the mutation rescheduled.
    pub next_leg_due_at: u64,
    pub completed_pickups: Vec<Entity>,
    /// `pickup_leg_cost + tsp_route_cost`, always (see resolved Open
    /// Question: this never drops the pickup leg, including after
    /// insertion).
    pub total_route_cost: f64,
    pub pickup_leg_cost: f64,
    pub route_cost: f64,
    /// Sunk cost of legs already driven (updated at each `PickupComplete`).
    /// `route_cost` after a dynamic insertion is this plus the freshly
    /// re-solved remaining-leg cost, so already-traveled distance is never
    /// re-priced.
    pub completed_leg_cost: f64,
    pub cost_by_passenger: HashMap<Entity, f64>,
    pub detour_by_passenger: HashMap<Entity, f64>,
    pub state: TripState,
}

impl Trip {
    pub fn is_full(&self) -> bool {
        self.passengers.len() as u32 >= self.capacity
    }

    pub fn recompute_total_route_cost(&mut self) {
        self.total_route_cost = self.pickup_leg_cost + self.route_cost;
    }
}
