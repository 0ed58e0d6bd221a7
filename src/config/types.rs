//! Configuration enums and default value functions used by the Config struct.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// How event log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// `[HH:MM:SS] SOURCE: message` (default).
    #[default]
    Text,
    /// One JSON object per line.
    Ndjson,
}

/// How a train walks its route. Also accepted by `run --mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum RouteMode {
    /// Acquire, hold, and release each intersection in turn.
    StepWise,
    /// Acquire every intersection of the route in order, then release them all
    /// (default). This is the mode in which crossing routes can deadlock.
    #[default]
    HoldAll,
}

impl std::fmt::Display for RouteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RouteMode::StepWise => write!(f, "step_wise"),
            RouteMode::HoldAll => write!(f, "hold_all"),
        }
    }
}

// Default value functions for serde
pub(crate) fn default_resources_file() -> String {
    "intersections.txt".to_string()
}
pub(crate) fn default_routes_file() -> String {
    "trains.txt".to_string()
}
pub(crate) fn default_log_file() -> String {
    "simulation.log".to_string()
}
pub(crate) fn default_hold_ms() -> u64 {
    100
}
pub(crate) fn default_max_resources() -> usize {
    50
}
pub(crate) fn default_max_capacity() -> u32 {
    10
}
pub(crate) fn default_true() -> bool {
    true
}
