//! Pickup ordering, detour computation, cost splitting, and insertion
//! trial.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use bevy_ecs::prelude::Entity;
use lru::LruCache;

use crate::geo::Location;
use crate::routing::oracle::MapOracle;

/// Result of solving the pickup-ordering TSP: the full route
/// `[pickup_1, ..., pickup_k, destination]` and its total duration.
#[derive(Debug, Clone)]
pub struct TspSolution {
    pub ordered_pickups: Vec<Location>,
    pub route_cost_secs: f64,
}

fn route_cost(oracle: &dyn MapOracle, start: Location, stops: &[Location]) -> f64 {
    let mut total = 0.0;
    let mut current = start;
    for stop in stops {
        total += oracle.duration_secs(current, *stop);
        current = *stop;
    }
    total
}

fn permutations(items: &[Location]) -> Vec<Vec<Location>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut out = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            let mut perm = vec![head];
            perm.append(&mut tail);
            out.push(perm);
        }
    }
    out
}

fn nearest_neighbor_order(oracle: &dyn MapOracle, start: Location, pickups: &[Location]) -> Vec<Location> {
    let mut remaining: Vec<Location> = pickups.to_vec();
    let mut ordered = Vec::with_capacity(pickups.len());
    let mut current = start;
    while !remaining.is_empty() {
        let (idx, _) = remaining
            .iter()
            .enumerate()
            .map(|(i, p)| (i, oracle.duration_secs(current, *p)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap())
            .expect("remaining is non-empty");
        current = remaining.remove(idx);
        ordered.push(current);
    }
    ordered
}

/// Cache key: driver location, destination, and the pickup set sorted by
/// rounded coordinates so order-independent lookups hit the same entry.
type TspCacheKey = ((i64, i64), Vec<(i64, i64)>, (i64, i64));

fn round6(l: Location) -> (i64, i64) {
    ((l.lat * 1e6).round() as i64, (l.lon * 1e6).round() as i64)
}

fn tsp_cache() -> &'static Mutex<LruCache<TspCacheKey, TspSolution>> {
    use std::sync::OnceLock;
    static CACHE: OnceLock<Mutex<LruCache<TspCacheKey, TspSolution>>> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(LruCache::new(NonZeroUsize::new(10_000).unwrap())))
}

/// Owns pickup-ordering, detour, cost-split, and insertion logic. Stateless
/// aside from the process-wide TSP cache; holds no reference to a `World`.
pub struct RoutingEngine;

impl RoutingEngine {
    /// Solve the pickup-ordering problem: brute force for `|pickups| <= 3`,
    /// nearest-neighbor for `|pickups| >= 4`.
    pub fn solve_tsp_pickups(
        oracle: &dyn MapOracle,
        driver_location: Location,
        pickups: &[Location],
        destination: Location,
    ) -> TspSolution {
        let mut sorted_keys: Vec<(i64, i64)> = pickups.iter().map(|p| round6(*p)).collect();
        sorted_keys.sort();
        let key: TspCacheKey = (round6(driver_location), sorted_keys, round6(destination));

        if let Some(hit) = tsp_cache().lock().unwrap().get(&key) {
            return hit.clone();
        }

        let solution = if pickups.len() <= 3 {
            let mut best: Option<TspSolution> = None;
            for perm in permutations(pickups) {
                let mut stops = perm.clone();
                stops.push(destination);
                let cost = route_cost(oracle, driver_location, &stops);
                if best.as_ref().map(|b| cost < b.route_cost_secs).unwrap_or(true) {
                    best = Some(TspSolution {
                        ordered_pickups: perm,
                        route_cost_secs: cost,
                    });
                }
            }
            best.unwrap_or(TspSolution {
                ordered_pickups: vec![],
                route_cost_secs: 0.0,
            })
        } else {
            let ordered = nearest_neighbor_order(oracle, driver_location, pickups);
            let mut stops = ordered.clone();
            stops.push(destination);
            let cost = route_cost(oracle, driver_location, &stops);
            TspSolution {
                ordered_pickups: ordered,
                route_cost_secs: cost,
            }
        };

        tsp_cache().lock().unwrap().put(key, solution.clone());
        solution
    }

    /// For each passenger, find their pickup index in `route` by
    /// coordinate match (1e-4 degree tolerance), falling back to their
    /// position in `passenger_order` if not found.
    fn pickup_index(route: &[Location], origin: Location, positional_fallback: usize) -> usize {
        route
            .iter()
            .position(|stop| stop.approx_eq(origin))
            .unwrap_or(positional_fallback)
    }

    /// Raw actual (pickup-to-destination, along the solved route) and solo
    /// (direct origin-to-destination) durations per passenger, in seconds.
    /// `compute_detour_ratios` derives its ratios from this; callers that
    /// need the raw excess (e.g. the detour-penalty cost channel) use it
    /// directly instead of re-deriving seconds from a ratio.
    pub fn actual_and_solo_durations(
        oracle: &dyn MapOracle,
        route: &[Location],
        destination: Location,
        passengers: &[(Entity, Location)],
    ) -> HashMap<Entity, (f64, f64)> {
        let mut out = HashMap::new();
        for (i, (entity, origin)) in passengers.iter().enumerate() {
            let idx = Self::pickup_index(route, *origin, i);
            let actual = route_cost(oracle, *origin, &route[idx.min(route.len().saturating_sub(1))..]);
            let solo = oracle.duration_secs(*origin, destination);
            out.insert(*entity, (actual, solo));
        }
        out
    }

    /// Detour ratio per passenger: actual in-vehicle duration (from pickup
    /// index to end of route) divided by solo duration (origin directly to
    /// destination), guarded against 0/0.
    pub fn compute_detour_ratios(
        oracle: &dyn MapOracle,
        route: &[Location],
        destination: Location,
        passengers: &[(Entity, Location)],
    ) -> HashMap<Entity, f64> {
        Self::actual_and_solo_durations(oracle, route, destination, passengers)
            .into_iter()
            .map(|(entity, (actual, solo))| {
                let ratio = if solo > 1e-9 { actual / solo } else { 1.0 };
                (entity, ratio)
            })
            .collect()
    }

    /// Reverse-map a solved route's ordered pickup locations back to the
    /// passenger entities that produced them, by coordinate match with
    /// positional fallback. Used wherever a `Trip.pickup_order`
    /// must be reconstructed from a route of bare `Location`s: group commit,
    /// FCFS append, and dynamic insertion.
    pub fn match_pickups_to_entities(
        route_pickups: &[Location],
        passengers: &[(Entity, Location)],
    ) -> Vec<Entity> {
        let mut remaining = passengers.to_vec();
        route_pickups
            .iter()
            .enumerate()
            .map(|(i, loc)| {
                let pos = remaining
                    .iter()
                    .position(|(_, p_loc)| p_loc.approx_eq(*loc))
                    .unwrap_or_else(|| i.min(remaining.len().saturating_sub(1)));
                remaining.remove(pos).0
            })
            .collect()
    }

    /// Split `total` proportionally by each passenger's detour ratio;
    /// equal split if the ratios sum to zero.
    pub fn split_costs_by_detour(total: f64, detours: &HashMap<Entity, f64>) -> HashMap<Entity, f64> {
        let sum: f64 = detours.values().sum();
        if sum.abs() < 1e-9 {
            let share = if detours.is_empty() { 0.0 } else { total / detours.len() as f64 };
            return detours.keys().map(|k| (*k, share)).collect();
        }
        detours.iter().map(|(k, ratio)| (*k, total * (ratio / sum))).collect()
    }

    /// Try inserting a new pickup into an existing route at every possible
    /// position; keep the cheapest candidate whose detour ratios all stay
    /// within `max_detour`. Returns the new route, its cost, and the
    /// recomputed detour map, or `None` if no position is feasible.
    #[allow(clippy::too_many_arguments)]
    pub fn try_insert_request(
        oracle: &dyn MapOracle,
        driver_location: Location,
        existing_passengers: &[(Entity, Location)],
        new_passenger: (Entity, Location),
        destination: Location,
        max_detour: f64,
    ) -> Option<(Vec<Location>, f64, HashMap<Entity, f64>)> {
        let mut best: Option<(Vec<Location>, f64, HashMap<Entity, f64>)> = None;

        for insert_at in 0..=existing_passengers.len() {
            let mut candidate_passengers: Vec<(Entity, Location)> = existing_passengers.to_vec();
            candidate_passengers.insert(insert_at, new_passenger);

            let pickups: Vec<Location> = candidate_passengers.iter().map(|(_, loc)| loc.clone()).collect();
            let solution = Self::solve_tsp_pickups(oracle, driver_location, &pickups, destination);

            let mut route = solution.ordered_pickups.clone();
            route.push(destination);

            let detours = Self::compute_detour_ratios(oracle, &route, destination, &candidate_passengers);
            if detours.values().any(|d| *d > max_detour) {
                continue;
            }

            let cost = solution.route_cost_secs;
            if best.as_ref().map(|(_, best_cost, _)| cost < *best_cost).unwrap_or(true) {
                best = Some((route, cost, detours));
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routing::oracle::HaversineOracle;

    fn loc(lat: f64, lon: f64) -> Location {
        Location::new(lat, lon)
    }

    #[test]
    fn single_pickup_route_visits_pickup_then_destination() {
        let oracle = HaversineOracle::default();
        let driver = loc(19.0, 72.8);
        let dest = loc(19.2, 73.0);
        let pickup = loc(19.05, 72.85);
        let sol = RoutingEngine::solve_tsp_pickups(&oracle, driver, &[pickup], dest);
        assert_eq!(sol.ordered_pickups, vec![pickup]);
    }

    #[test]
    fn solo_passenger_detour_ratio_is_one() {
        let oracle = HaversineOracle::default();
        let origin = loc(19.0, 72.8);
        let dest = loc(19.2, 73.0);
        let route = vec![origin, dest];
        let e = Entity::from_raw(1);
        let detours = RoutingEngine::compute_detour_ratios(&oracle, &route, dest, &[(e, origin)]);
        assert!((detours[&e] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn cost_split_sums_to_total() {
        let e1 = Entity::from_raw(1);
        let e2 = Entity::from_raw(2);
        let mut detours = HashMap::new();
        detours.insert(e1, 1.2);
        detours.insert(e2, 1.5);
        let split = RoutingEngine::split_costs_by_detour(100.0, &detours);
        let sum: f64 = split.values().sum();
        assert!((sum - 100.0).abs() < 1e-6);
    }

    #[test]
    fn cost_split_equal_when_detours_sum_to_zero() {
        let e1 = Entity::from_raw(1);
        let e2 = Entity::from_raw(2);
        let mut detours = HashMap::new();
        detours.insert(e1, 0.0);
        detours.insert(e2, 0.0);
        let split = RoutingEngine::split_costs_by_detour(100.0, &detours);
        assert!((split[&e1] - 50.0).abs() < 1e-9);
        assert!((split[&e2] - 50.0).abs() < 1e-9);
    }

    #[test]
    fn brute_force_tsp_not_worse_than_nearest_neighbor_for_small_p() {
        let oracle = HaversineOracle::default();
        let driver = loc(19.0, 72.8);
        let dest = loc(19.3, 73.1);
        let pickups = vec![loc(19.05, 72.9), loc(19.1, 72.95), loc(19.2, 73.0)];
        let brute = RoutingEngine::solve_tsp_pickups(&oracle, driver, &pickups, dest);
        let nn_order = nearest_neighbor_order(&oracle, driver, &pickups);
        let mut stops = nn_order;
        stops.push(dest);
        let nn_cost = route_cost(&oracle, driver, &stops);
        assert!(brute.route_cost_secs <= nn_cost + 1e-6);
    }
}
