//! World-state registries: the active-requests set, available-drivers
//! pool, active-trips set, and completed-trips list that sit alongside
//! the ECS components themselves. Kept as an explicit `Resource` rather
//! than re-deriving membership from component state on every query.

use bevy_ecs::prelude::{Entity, Resource};

/// Membership lists for the four world-state sets. A driver or request's
/// presence here, not just its component `state` field, is what the
/// kernel's handlers consult -- keeping both in sync is the handlers'
/// responsibility.
#[derive(Resource, Debug, Clone, Default)]
pub struct Registries {
    pub active_requests: Vec<Entity>,
    pub available_drivers: Vec<Entity>,
    pub active_trips: Vec<Entity>,
    pub completed_trips: Vec<Entity>,
}

impl Registries {
    pub fn add_active_request(&mut self, request: Entity) {
        self.active_requests.push(request);
    }

    pub fn remove_active_request(&mut self, request: Entity) {
        self.active_requests.retain(|r| *r != request);
    }

    pub fn add_available_driver(&mut self, driver: Entity) {
        if !self.available_drivers.contains(&driver) {
            self.available_drivers.push(driver);
        }
    }

    pub fn remove_available_driver(&mut self, driver: Entity) {
        self.available_drivers.retain(|d| *d != driver);
    }

    pub fn add_active_trip(&mut self, trip: Entity) {
        self.active_trips.push(trip);
    }

    pub fn complete_trip(&mut self, trip: Entity) {
        self.active_trips.retain(|t| *t != trip);
        self.completed_trips.push(trip);
    }
}
