//! Deserializable configuration shape, matching the external interface
//! contract: the core only ever accepts a fully-parsed `Config`; reading a
//! file from disk and parsing TOML/JSON is left to the CLI shell.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimulationConfig {
    pub duration: f64,
    pub initial_drivers: u32,
    pub max_drivers: u32,
    pub random_seed: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Bounds {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RegionConfig {
    pub bounds: Bounds,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CarpoolingConfig {
    pub capacity: u32,
    pub detour_max: f64,
    pub destination_cluster_radius_km: f64,
    pub dynamic_insertion_enabled: bool,
    /// The assignment IP's capacity-penalty weight:
    /// `C_cap = capacity_penalty_weight * max_g cost_g`. Default 3.0.
    #[serde(default = "default_capacity_penalty_weight")]
    pub capacity_penalty_weight: f64,
}

fn default_capacity_penalty_weight() -> f64 {
    3.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CostsConfig {
    pub waiting_cost_per_sec: f64,
    pub quit_penalty: f64,
    pub detour_penalty_per_sec: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DriverTypeConfig {
    pub id: u32,
    pub name: String,
    pub base_cost: f64,
    pub arrival_rate: f64,
    pub speed_multiplier: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RequestsConfig {
    pub arrival_rate: f64,
    pub weibull_shape: f64,
    pub weibull_scale: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default = "default_update_interval")]
    pub update_interval: f64,
    #[serde(default)]
    pub enable_streaming: bool,
    pub output_file: Option<String>,
    #[serde(default = "default_history_size")]
    pub history_size: usize,
}

fn default_update_interval() -> f64 {
    10.0
}

fn default_history_size() -> usize {
    100
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MapOracleConfig {
    #[serde(default)]
    pub server_url: Option<String>,
    /// Path to a bincode-serialized route table (feature `precomputed`).
    /// Checked before `server_url`: a run wired up for offline replay
    /// never needs a live map service configured alongside it.
    #[serde(default)]
    pub precomputed_path: Option<String>,
    #[serde(default = "default_cache_size")]
    pub cache_size: usize,
    #[serde(default = "default_avg_speed_kmh")]
    pub avg_speed_kmh: f64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_cache_size() -> usize {
    10_000
}

fn default_avg_speed_kmh() -> f64 {
    40.0
}

fn default_timeout_ms() -> u64 {
    5_000
}

impl Default for MapOracleConfig {
    fn default() -> Self {
        MapOracleConfig {
            server_url: None,
            precomputed_path: None,
            cache_size: default_cache_size(),
            avg_speed_kmh: default_avg_speed_kmh(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub simulation: SimulationConfig,
    pub region: RegionConfig,
    pub carpooling: CarpoolingConfig,
    pub costs: CostsConfig,
    pub driver_types: Vec<DriverTypeConfig>,
    pub requests: RequestsConfig,
    #[serde(default)]
    pub metrics: Option<MetricsConfig>,
    #[serde(default)]
    pub map_oracle: MapOracleConfig,
}

impl Config {
    /// Rejects structurally invalid configuration before any event is
    /// dispatched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.region.bounds;
        if !(b.lat_min < b.lat_max) || !(b.lon_min < b.lon_max) {
            return Err(ConfigError::DegenerateRegion {
                lat_min: b.lat_min,
                lat_max: b.lat_max,
                lon_min: b.lon_min,
                lon_max: b.lon_max,
            });
        }
        if self.carpooling.capacity == 0 {
            return Err(ConfigError::InvalidCapacity(self.carpooling.capacity));
        }
        if !(self.carpooling.detour_max > 1.0) {
            return Err(ConfigError::InvalidMaxDetour(self.carpooling.detour_max));
        }
        if self.driver_types.is_empty() {
            return Err(ConfigError::NoDriverTypes);
        }
        for dt in &self.driver_types {
            if !(dt.arrival_rate > 0.0) {
                return Err(ConfigError::InvalidArrivalRate {
                    id: dt.id,
                    arrival_rate: dt.arrival_rate,
                });
            }
            if !(dt.base_cost > 0.0) {
                return Err(ConfigError::InvalidBaseCost {
                    id: dt.id,
                    base_cost: dt.base_cost,
                });
            }
        }
        if !(self.requests.arrival_rate >= 0.0) {
            return Err(ConfigError::InvalidRequestRate(self.requests.arrival_rate));
        }
        if !(self.requests.weibull_shape > 0.0) {
            return Err(ConfigError::InvalidWeibullShape(self.requests.weibull_shape));
        }
        if !(self.requests.weibull_scale > 0.0) {
            return Err(ConfigError::InvalidWeibullScale(self.requests.weibull_scale));
        }
        if !(self.simulation.duration > 0.0) {
            return Err(ConfigError::InvalidDuration(self.simulation.duration));
        }
        if !(self.costs.quit_penalty > 0.0) {
            return Err(ConfigError::InvalidQuitPenalty(self.costs.quit_penalty));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Config {
        Config {
            simulation: SimulationConfig {
                duration: 100.0,
                initial_drivers: 2,
                max_drivers: 10,
                random_seed: 42,
            },
            region: RegionConfig {
                bounds: Bounds {
                    lat_min: 18.9,
                    lat_max: 19.3,
                    lon_min: 72.7,
                    lon_max: 73.1,
                },
            },
            carpooling: CarpoolingConfig {
                capacity: 3,
                detour_max: 1.5,
                destination_cluster_radius_km: 1.0,
                dynamic_insertion_enabled: true,
                capacity_penalty_weight: 3.0,
            },
            costs: CostsConfig {
                waiting_cost_per_sec: 0.01,
                quit_penalty: 50.0,
                detour_penalty_per_sec: 2.0,
            },
            driver_types: vec![DriverTypeConfig {
                id: 1,
                name: "Economy".into(),
                base_cost: 10.0,
                arrival_rate: 0.05,
                speed_multiplier: 1.0,
            }],
            requests: RequestsConfig {
                arrival_rate: 0.1,
                weibull_shape: 1.5,
                weibull_scale: 120.0,
            },
            metrics: None,
            map_oracle: MapOracleConfig::default(),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut c = sample();
        c.carpooling.capacity = 0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidCapacity(0))));
    }

    #[test]
    fn degenerate_region_rejected() {
        let mut c = sample();
        c.region.bounds.lat_max = c.region.bounds.lat_min;
        assert!(matches!(c.validate(), Err(ConfigError::DegenerateRegion { .. })));
    }

    #[test]
    fn detour_max_must_exceed_one() {
        let mut c = sample();
        c.carpooling.detour_max = 1.0;
        assert!(matches!(c.validate(), Err(ConfigError::InvalidMaxDetour(_))));
    }
}
