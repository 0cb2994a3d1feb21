//! Error taxonomy for the carpool simulator.
//!
//! `ConfigError` covers fatal problems discovered before a single event is
//! dispatched -- the simulation never starts. Everything else the engine
//! encounters at runtime (a stale map-oracle response, a detour that can't
//! be matched to a pickup index, a non-optimal assignment round) is
//! recoverable by design and is folded into `Metrics` counters instead of
//! propagated as an `Err`; see `telemetry::Metrics`.

use thiserror::Error;

/// Fatal configuration problems, detected by [`crate::config::Config::validate`]
/// before `scenario::build_scenario` constructs a `World`.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("region bounds are degenerate: lat_min={lat_min} lat_max={lat_max} lon_min={lon_min} lon_max={lon_max}")]
    DegenerateRegion {
        lat_min: f64,
        lat_max: f64,
        lon_min: f64,
        lon_max: f64,
    },

    #[error("vehicle capacity must be at least 1, got {0}")]
    InvalidCapacity(u32),

    #[error("max_detour must be greater than 1.0, got {0}")]
    InvalidMaxDetour(f64),

    #[error("no driver types configured")]
    NoDriverTypes,

    #[error("driver type {id} has non-positive arrival_rate {arrival_rate}")]
    InvalidArrivalRate { id: u32, arrival_rate: f64 },

    #[error("driver type {id} has non-positive base_cost {base_cost}")]
    InvalidBaseCost { id: u32, base_cost: f64 },

    #[error("request arrival_rate must be positive, got {0}")]
    InvalidRequestRate(f64),

    #[error("weibull_shape must be positive, got {0}")]
    InvalidWeibullShape(f64),

    #[error("weibull_scale must be positive, got {0}")]
    InvalidWeibullScale(f64),

    #[error("simulation duration must be positive, got {0}")]
    InvalidDuration(f64),

    #[error("quit_penalty must be positive, got {0}")]
    InvalidQuitPenalty(f64),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Rare but surfaced runtime inconsistencies. These never halt a running
/// simulation; they are attached to `Metrics::inconsistent_state_count`
/// and, where useful, logged via `eprintln!`.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("assignment round exceeded its search budget without proving optimality")]
    AssignmentSearchBudgetExceeded,

    #[error("map oracle request failed: {0}")]
    MapOracleTransport(String),

    #[cfg(feature = "precomputed")]
    #[error("precomputed route table could not be loaded from {path}: {source}")]
    PrecomputedTableLoad {
        path: String,
        #[source]
        source: bincode::Error,
    },
}
