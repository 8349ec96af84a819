//! Waypoint mission CLI.
//!
//! Binaries:
//! - plan_mission: validate a plan file and print the assembled mission
//! - fly_mission: fly a plan against the simulated vehicle

pub mod config;

pub use config::Config;
