//! Runtime glue that wires configs, clocks, telemetry, and runner orchestration.

pub mod clock;
pub mod config;
pub mod runner;
pub mod telemetry;
