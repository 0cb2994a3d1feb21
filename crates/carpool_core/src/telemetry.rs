//! Metrics accumulator: cumulative counters, cost channels, histograms,
//! and a bounded event/snapshot history, kept one instance per policy run.

use std::collections::{HashMap, VecDeque};

use bevy_ecs::prelude::{Entity, Resource};

use crate::geo::Location;

#[derive(Debug, Clone)]
pub enum SimEvent {
    RequestArrival {
        time_secs: f64,
        request: Entity,
        origin: Location,
        destination: Location,
    },
    Match {
        time_secs: f64,
        trip: Entity,
        driver: Entity,
        passengers: Vec<Entity>,
        pool_size: usize,
        route_cost: f64,
    },
    Quit {
        time_secs: f64,
        request: Entity,
        waiting_time_secs: f64,
        penalty: f64,
    },
    DynamicInsertion {
        time_secs: f64,
        request: Entity,
        trip: Entity,
        new_pool_size: usize,
    },
    TripComplete {
        time_secs: f64,
        trip: Entity,
        passengers: Vec<Entity>,
        total_cost: f64,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DriverTypeStats {
    pub trips: u64,
    pub passengers: u64,
}

#[derive(Debug, Clone)]
pub struct LiveSnapshot {
    pub time_secs: f64,
    pub active_requests: usize,
    pub available_drivers: HashMap<u32, usize>,
    pub active_trips: usize,
    pub passengers_in_transit: usize,
}

/// Cumulative counters, cost channels, time series, and bounded history.
/// One instance per policy -- FCFS and optimal each own their own
/// `Metrics` so a dual-driver comparison never mixes their state.
#[derive(Resource, Debug, Default)]
pub struct Metrics {
    pub total_requests: u64,
    pub total_matches: u64,
    pub total_quits: u64,
    pub total_dynamic_insertions: u64,

    pub total_waiting_cost: f64,
    pub total_routing_cost: f64,
    pub total_quit_penalty: f64,
    pub total_detour_penalty: f64,

    pub pool_size_histogram: HashMap<u32, u64>,
    pub waiting_times_secs: Vec<f64>,
    pub detour_ratios: Vec<f64>,
    pub match_times_secs: Vec<f64>,
    pub driver_stats: HashMap<u32, DriverTypeStats>,

    history_size: usize,
    pub recent_events: VecDeque<SimEvent>,

    update_interval_secs: f64,
    last_snapshot_time_secs: f64,
    pub snapshots: VecDeque<LiveSnapshot>,

    /// Count of defensive fallbacks taken: pickup coordinates not found in
    /// route, empty route at trip creation, and similar.
    pub inconsistent_state_count: u64,
    /// Count of map-oracle transport failures that degraded to the
    /// haversine fallback.
    pub map_oracle_fallback_count: u64,
    /// Count of matching rounds that returned an empty assignment due to
    /// IP infeasibility or exceeding the search budget.
    pub infeasible_round_count: u64,
}

impl Metrics {
    pub fn new(history_size: usize, update_interval_secs: f64) -> Self {
        Metrics {
            history_size,
            update_interval_secs,
            ..Default::default()
        }
    }

    fn push_event(&mut self, event: SimEvent) {
        if self.recent_events.len() >= self.history_size {
            self.recent_events.pop_front();
        }
        self.recent_events.push_back(event);
    }

    pub fn record_request_arrival(&mut self, time_secs: f64, request: Entity, origin: Location, destination: Location) {
        self.total_requests += 1;
        self.push_event(SimEvent::RequestArrival { time_secs, request, origin, destination });
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_match(
        &mut self,
        time_secs: f64,
        trip: Entity,
        driver: Entity,
        driver_type_id: u32,
        passengers: &[(Entity, f64)], // (entity, waiting_time_secs)
        waiting_cost_rate: f64,
        total_route_cost: f64,
    ) {
        self.total_matches += passengers.len() as u64;
        let pool_size = passengers.len();
        *self.pool_size_histogram.entry(pool_size as u32).or_insert(0) += 1;

        let stats = self.driver_stats.entry(driver_type_id).or_default();
        stats.trips += 1;
        stats.passengers += pool_size as u64;

        for (_, waiting_time) in passengers {
            self.waiting_times_secs.push(*waiting_time);
            self.match_times_secs.push(time_secs);
            self.total_waiting_cost += waiting_time * waiting_cost_rate;
        }

        self.total_routing_cost += total_route_cost;

        self.push_event(SimEvent::Match {
            time_secs,
            trip,
            driver,
            passengers: passengers.iter().map(|(e, _)| *e).collect(),
            pool_size,
            route_cost: total_route_cost,
        });
    }

    pub fn record_quit(&mut self, time_secs: f64, request: Entity, waiting_time_secs: f64, quit_penalty: f64) {
        self.total_quits += 1;
        self.total_quit_penalty += quit_penalty;
        self.push_event(SimEvent::Quit { time_secs, request, waiting_time_secs, penalty: quit_penalty });
    }

    pub fn record_dynamic_insertion(&mut self, time_secs: f64, request: Entity, trip: Entity, new_pool_size: usize) {
        self.total_dynamic_insertions += 1;
        self.push_event(SimEvent::DynamicInsertion { time_secs, request, trip, new_pool_size });
    }

    /// Detour penalty accrues only when ratio exceeds 1.5 (`max_detour` is
    /// a distinct, configurable cap on *acceptance*; the 1.5 penalty
    /// threshold is fixed, independent of whatever `max_detour` the run
    /// configures).
    pub fn record_trip_complete(
        &mut self,
        time_secs: f64,
        trip: Entity,
        passengers: &[Entity],
        total_cost: f64,
        detour_ratios: &[(f64, f64, f64)], // (ratio, actual_duration_secs, solo_duration_secs)
        detour_penalty_weight: f64,
    ) {
        for (ratio, actual, solo) in detour_ratios {
            self.detour_ratios.push(*ratio);
            if *ratio > 1.5 {
                let excess = actual - 1.5 * solo;
                self.total_detour_penalty += excess.max(0.0) * detour_penalty_weight;
            }
        }
        self.push_event(SimEvent::TripComplete {
            time_secs,
            trip,
            passengers: passengers.to_vec(),
            total_cost,
        });
    }

    pub fn record_inconsistent_state(&mut self) {
        self.inconsistent_state_count += 1;
    }

    pub fn record_map_oracle_fallback(&mut self) {
        self.map_oracle_fallback_count += 1;
    }

    pub fn record_infeasible_round(&mut self) {
        self.infeasible_round_count += 1;
    }

    pub fn maybe_snapshot(
        &mut self,
        time_secs: f64,
        active_requests: usize,
        available_drivers: HashMap<u32, usize>,
        active_trips: usize,
        passengers_in_transit: usize,
    ) {
        if time_secs - self.last_snapshot_time_secs < self.update_interval_secs {
            return;
        }
        self.last_snapshot_time_secs = time_secs;
        self.snapshots.push_back(LiveSnapshot {
            time_secs,
            active_requests,
            available_drivers,
            active_trips,
            passengers_in_transit,
        });
    }

    pub fn match_rate(&self) -> f64 {
        let completed = self.total_matches + self.total_quits;
        if completed == 0 {
            0.0
        } else {
            self.total_matches as f64 / completed as f64
        }
    }

    pub fn avg_waiting_time(&self) -> f64 {
        average(&self.waiting_times_secs)
    }

    pub fn avg_detour_ratio(&self) -> f64 {
        average(&self.detour_ratios)
    }

    pub fn total_trips(&self) -> u64 {
        self.pool_size_histogram.values().sum()
    }

    pub fn avg_pool_size(&self) -> f64 {
        let total_trips = self.total_trips();
        if total_trips == 0 {
            0.0
        } else {
            let weighted: u64 = self.pool_size_histogram.iter().map(|(k, v)| *k as u64 * v).sum();
            weighted as f64 / total_trips as f64
        }
    }

    pub fn insertion_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.total_dynamic_insertions as f64 / self.total_requests as f64
        }
    }

    pub fn total_cost(&self) -> f64 {
        self.total_waiting_cost + self.total_routing_cost + self.total_quit_penalty + self.total_detour_penalty
    }
}

fn average(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_rate_zero_when_nothing_completed() {
        let m = Metrics::new(100, 10.0);
        assert_eq!(m.match_rate(), 0.0);
    }

    #[test]
    fn recent_events_ring_buffer_is_bounded() {
        let mut m = Metrics::new(2, 10.0);
        for i in 0..5u32 {
            m.record_request_arrival(i as f64, Entity::from_raw(i), Location::new(0.0, 0.0), Location::new(0.0, 0.0));
        }
        assert_eq!(m.recent_events.len(), 2);
    }

    #[test]
    fn total_cost_sums_four_channels() {
        let mut m = Metrics::new(100, 10.0);
        m.total_waiting_cost = 1.0;
        m.total_routing_cost = 2.0;
        m.total_quit_penalty = 3.0;
        m.total_detour_penalty = 4.0;
        assert_eq!(m.total_cost(), 10.0);
    }
}
