//! Matching: the optimal set-partitioning path (`group_enum` + `assignment`),
//! the FCFS baseline (`fcfs`), and the threshold policy shared by both.

pub mod assignment;
pub mod fcfs;
pub mod group_enum;
pub mod threshold;

pub use assignment::{solve_assignment_ip, AssignmentConfig};
pub use fcfs::FcfsMatcher;
pub use group_enum::{FeasibleGroup, GroupEnumerator};
pub use threshold::ThresholdPolicy;
