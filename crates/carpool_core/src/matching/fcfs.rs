//! First-come-first-served baseline matcher: appends a request to a
//! compatible in-progress trip if one exists, otherwise dispatches the
//! earliest-available driver.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::geo::Location;
use crate::routing::oracle::MapOracle;

/// Outcome of an FCFS match attempt for a single request.
pub enum FcfsOutcome {
    /// Appended to an already-active trip at the given index.
    AppendedToTrip {
        trip: Entity,
        new_route: Vec<Location>,
        route_cost: f64,
        cost_by_passenger: HashMap<Entity, f64>,
        detour_by_passenger: HashMap<Entity, f64>,
    },
    /// A new trip was created with the earliest-available driver.
    NewTrip {
        driver: Entity,
        route: Vec<Location>,
        pickup_leg_cost: f64,
        route_cost: f64,
    },
    /// No driver is available; the request remains waiting.
    NoDriverAvailable,
}

/// Minimal view of an active trip the FCFS matcher needs to decide
/// whether a request can be appended.
pub struct ActiveTripView {
    pub trip: Entity,
    pub driver: Entity,
    pub passengers: Vec<(Entity, Location)>,
    pub route: Vec<Location>,
    pub destination: Location,
    pub capacity: u32,
}

#[derive(Resource)]
pub struct FcfsMatcher {
    /// Loose destination-to-destination compatibility bound, in km
    /// (`fcfs_matcher.py`'s 5 km check, done via the map oracle's
    /// distance rather than a fixed haversine distance).
    pub compatibility_km: f64,
}

impl Default for FcfsMatcher {
    fn default() -> Self {
        FcfsMatcher { compatibility_km: 5.0 }
    }
}

impl FcfsMatcher {
    /// Sum of consecutive-segment durations along `route`, starting from
    /// `start` (the driver's current location). No TSP re-optimization --
    /// this is the naive "append and re-sum" the original uses.
    fn simple_route_cost(&self, oracle: &dyn MapOracle, start: Location, route: &[Location]) -> f64 {
        let mut total = 0.0;
        let mut current = start;
        for stop in route {
            total += oracle.duration_secs(current, *stop);
            current = *stop;
        }
        total
    }

    fn simple_detours(
        &self,
        oracle: &dyn MapOracle,
        route: &[Location],
        destination: Location,
        passengers: &[(Entity, Location)],
    ) -> HashMap<Entity, f64> {
        let mut out = HashMap::new();
        for (i, (entity, origin)) in passengers.iter().enumerate() {
            let idx = route.iter().position(|s| s.approx_eq(*origin)).unwrap_or(i);
            let mut actual = 0.0;
            let mut current = *origin;
            for stop in &route[idx.min(route.len().saturating_sub(1))..] {
                actual += oracle.duration_secs(current, *stop);
                current = *stop;
            }
            let solo = oracle.duration_secs(*origin, destination);
            out.insert(*entity, if solo > 1e-9 { actual / solo } else { 1.0 });
        }
        out
    }

    /// Try to append the request to the first active trip (in caller
    /// order) with free capacity and a compatible destination; otherwise
    /// create a new trip with the earliest-available driver.
    pub fn match_request(
        &self,
        oracle: &dyn MapOracle,
        request: (Entity, Location, Location),
        active_trips: &[ActiveTripView],
        available_drivers: &[(Entity, Location, u64)], // (entity, location, available_since)
    ) -> FcfsOutcome {
        let (req_entity, origin, destination) = request;

        for view in active_trips {
            if view.passengers.len() as u32 >= view.capacity {
                continue;
            }
            let dest_gap = oracle.distance_km(view.destination, destination);
            if dest_gap > self.compatibility_km {
                continue;
            }

            // Append the pickup before the destination (last element).
            let mut new_route = view.route.clone();
            let insert_at = new_route.len().saturating_sub(1);
            new_route.insert(insert_at, origin);

            let driver_location = view.route.first().copied().unwrap_or(origin);
            let route_cost = self.simple_route_cost(oracle, driver_location, &new_route);

            let mut passengers = view.passengers.clone();
            passengers.push((req_entity, origin));

            let detours = self.simple_detours(oracle, &new_route, view.destination, &passengers);

            let equal_share = route_cost / passengers.len() as f64;
            let cost_by_passenger: HashMap<Entity, f64> =
                passengers.iter().map(|(e, _)| (*e, equal_share)).collect();

            return FcfsOutcome::AppendedToTrip {
                trip: view.trip,
                new_route,
                route_cost,
                cost_by_passenger,
                detour_by_passenger: detours,
            };
        }

        match available_drivers.iter().min_by_key(|(_, _, since)| *since) {
            Some((driver, driver_location, _)) => {
                let route = vec![origin, destination];
                let pickup_leg_cost = oracle.duration_secs(*driver_location, origin);
                let route_cost = oracle.duration_secs(origin, destination);
                FcfsOutcome::NewTrip {
                    driver: *driver,
                    route,
                    pickup_leg_cost,
                    route_cost,
                }
            }
            None => FcfsOutcome::NoDriverAvailable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::oracle::HaversineOracle;

    fn e(id: u32) -> Entity {
        Entity::from_raw(id)
    }

    #[test]
    fn creates_new_trip_with_earliest_driver() {
        let oracle = HaversineOracle::default();
        let matcher = FcfsMatcher::default();
        let origin = Location::new(19.0, 72.8);
        let dest = Location::new(19.2, 73.0);
        let drivers = vec![
            (e(1), Location::new(19.01, 72.81), 100),
            (e(2), Location::new(19.02, 72.82), 50),
        ];
        let outcome = matcher.match_request(&oracle, (e(10), origin, dest), &[], &drivers);
        match outcome {
            FcfsOutcome::NewTrip { driver, .. } => assert_eq!(driver, e(2)),
            _ => panic!("expected a new trip"),
        }
    }

    #[test]
    fn no_driver_leaves_request_waiting() {
        let oracle = HaversineOracle::default();
        let matcher = FcfsMatcher::default();
        let origin = Location::new(19.0, 72.8);
        let dest = Location::new(19.2, 73.0);
        let outcome = matcher.match_request(&oracle, (e(10), origin, dest), &[], &[]);
        assert!(matches!(outcome, FcfsOutcome::NoDriverAvailable));
    }
}
