//! Routing: the Map Oracle client (`oracle`) and the pickup-ordering /
//! detour / insertion engine built on top of it (`engine`).

pub mod engine;
pub mod oracle;

pub use engine::RoutingEngine;
pub use oracle::{build_map_oracle, CachedMapOracle, HaversineOracle, MapOracle};
