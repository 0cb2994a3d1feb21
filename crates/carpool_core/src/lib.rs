//! Carpool matching discrete-event simulation core.
//!
//! A `bevy_ecs::World` plus a millisecond-scale event clock drive request
//! pooling end to end: destination clustering, TSP-based route
//! construction, set-partitioning assignment, and opportunistic dynamic
//! insertion into already-moving trips. See `DESIGN.md` for the grounding
//! ledger behind each module.

pub mod clock;
pub mod clustering;
pub mod config;
pub mod distributions;
pub mod dual_driver;
pub mod ecs;
pub mod error;
pub mod geo;
pub mod matching;
pub mod registries;
pub mod routing;
pub mod runner;
pub mod scenario;
pub mod systems;
pub mod telemetry;
pub mod telemetry_export;

pub use config::Config;
pub use dual_driver::{run_comparison, Comparison};
pub use error::{ConfigError, SimError};
pub use runner::{run_next_event, run_until_empty};
pub use scenario::{build_scenario, generate_arrival_stream, Policy};
