//! Feasible-group enumeration: for each (driver, destination cluster) pair,
//! builds every subset of the cluster the driver could plausibly pick up
//! and evaluates its route cost.

use std::collections::HashMap;

use bevy_ecs::prelude::{Entity, Resource};

use crate::geo::{distance_km, Location};
use crate::routing::oracle::MapOracle;
use crate::routing::RoutingEngine;

/// A candidate (driver, request-subset) assignment, fully costed and
/// detour-checked, ready for the IP solver.
#[derive(Debug, Clone)]
pub struct FeasibleGroup {
    pub driver: Entity,
    pub requests: Vec<Entity>,
    pub route: Vec<Location>,
    pub pickup_leg_cost: f64,
    pub route_cost: f64,
    pub total_cost: f64,
    pub cost_by_request: HashMap<Entity, f64>,
    pub detour_by_request: HashMap<Entity, f64>,
}

fn combinations<T: Clone>(items: &[T], k: usize) -> Vec<Vec<T>> {
    if k == 0 {
        return vec![vec![]];
    }
    if items.len() < k {
        return vec![];
    }
    let mut out = Vec::new();
    for i in 0..=(items.len() - k) {
        let head = items[i].clone();
        for mut tail in combinations(&items[i + 1..], k - 1) {
            let mut combo = vec![head.clone()];
            combo.append(&mut tail);
            out.push(combo);
        }
    }
    out
}

#[derive(Resource)]
pub struct GroupEnumerator {
    /// Pairwise destination-compatibility re-check radius, independent of
    /// the clusterer's own radius (`_are_close` in the original: 1.0 km).
    pub compatibility_radius_km: f64,
    pub max_detour: f64,
    memo: std::collections::HashMap<(Entity, Vec<Entity>), Option<FeasibleGroup>>,
}

impl Default for GroupEnumerator {
    fn default() -> Self {
        GroupEnumerator {
            compatibility_radius_km: 1.0,
            max_detour: 1.5,
            memo: HashMap::new(),
        }
    }
}

impl GroupEnumerator {
    pub fn new(compatibility_radius_km: f64, max_detour: f64) -> Self {
        GroupEnumerator {
            compatibility_radius_km,
            max_detour,
            memo: HashMap::new(),
        }
    }

    fn all_pairwise_close(&self, destinations: &[Location]) -> bool {
        for i in 0..destinations.len() {
            for j in (i + 1)..destinations.len() {
                if distance_km(destinations[i], destinations[j]) > self.compatibility_radius_km {
                    return false;
                }
            }
        }
        true
    }

    fn evaluate_group(
        &mut self,
        oracle: &dyn MapOracle,
        driver: Entity,
        driver_location: Location,
        requests: &[(Entity, Location, Location)], // (entity, origin, destination)
    ) -> Option<FeasibleGroup> {
        let mut ids: Vec<Entity> = requests.iter().map(|(e, _, _)| *e).collect();
        ids.sort();
        let key = (driver, ids.clone());
        if let Some(cached) = self.memo.get(&key) {
            return cached.clone();
        }

        let destinations: Vec<Location> = requests.iter().map(|(_, _, d)| *d).collect();
        if !self.all_pairwise_close(&destinations) {
            self.memo.insert(key, None);
            return None;
        }

        let destination = destinations[0];
        let pickups: Vec<Location> = requests.iter().map(|(_, o, _)| *o).collect();
        let solution = RoutingEngine::solve_tsp_pickups(oracle, driver_location, &pickups, destination);

        let mut route = solution.ordered_pickups.clone();
        route.push(destination);

        let passengers: Vec<(Entity, Location)> = requests.iter().map(|(e, o, _)| (*e, *o)).collect();
        let detours = RoutingEngine::compute_detour_ratios(oracle, &route, destination, &passengers);
        if detours.values().any(|d| *d > self.max_detour) {
            self.memo.insert(key, None);
            return None;
        }

        let route_cost = solution.route_cost_secs;
        let cost_by_request = RoutingEngine::split_costs_by_detour(route_cost, &detours);
        let pickup_leg_cost = oracle.duration_secs(driver_location, pickups[0]);

        let group = FeasibleGroup {
            driver,
            requests: ids,
            route,
            pickup_leg_cost,
            route_cost,
            total_cost: pickup_leg_cost + route_cost,
            cost_by_request,
            detour_by_request: detours,
        };

        self.memo.insert(key, Some(group.clone()));
        Some(group)
    }

    /// Enumerate every feasible (driver, subset-of-cluster) group, subset
    /// sizes from `min(cluster.len(), capacity)` down to 1, largest first
    /// so the TSP cache warms on the costliest routes before the cheaper
    /// smaller subsets reuse them.
    pub fn enumerate_for_driver(
        &mut self,
        oracle: &dyn MapOracle,
        driver: Entity,
        driver_location: Location,
        cluster: &[(Entity, Location, Location)],
        capacity: usize,
    ) -> Vec<FeasibleGroup> {
        let mut out = Vec::new();
        let max_size = cluster.len().min(capacity);
        for size in (1..=max_size).rev() {
            for combo in combinations(cluster, size) {
                if let Some(group) = self.evaluate_group(oracle, driver, driver_location, &combo) {
                    out.push(group);
                }
            }
        }
        out
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
    fn solo_group_has_detour_ratio_one() {
        let oracle = HaversineOracle::default();
        let mut ge = GroupEnumerator::default();
        let driver_loc = Location::new(19.0, 72.8);
        let cluster = vec![(e(1), Location::new(19.01, 72.81), Location::new(19.2, 73.0))];
        let groups = ge.enumerate_for_driver(&oracle, e(100), driver_loc, &cluster, 3);
        assert_eq!(groups.len(), 1);
        assert!((groups[0].detour_by_request[&e(1)] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn far_apart_destinations_are_rejected() {
        let oracle = HaversineOracle::default();
        let mut ge = GroupEnumerator::new(1.0, 1.5);
        let driver_loc = Location::new(19.0, 72.8);
        let cluster = vec![
            (e(1), Location::new(19.01, 72.81), Location::new(19.2, 73.0)),
            (e(2), Location::new(19.02, 72.82), Location::new(25.0, 80.0)),
        ];
        let groups = ge.enumerate_for_driver(&oracle, e(100), driver_loc, &cluster, 3);
        // The size-2 group must be rejected; only the two size-1 groups survive.
        assert_eq!(groups.len(), 2);
        assert!(groups.iter().all(|g| g.requests.len() == 1));
    }
}
