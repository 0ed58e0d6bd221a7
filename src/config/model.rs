//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};

/// File name looked up in the working directory when `--config` is not given.
pub const CONFIG_FILE_NAME: &str = "interlock.yaml";

/// Configuration for a simulation run.
///
/// This struct represents the contents of `interlock.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Input files
    // =========================================================================
    /// Intersections file, one `Name:capacity` per line.
    #[serde(default = "default_resources_file")]
    pub resources_file: String,

    /// Train routes file, one `Train:R1,R2,...` per line.
    #[serde(default = "default_routes_file")]
    pub routes_file: String,

    // =========================================================================
    // Logging
    // =========================================================================
    /// Event log path. Appended to, created on demand.
    #[serde(default = "default_log_file")]
    pub log_file: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Mirror every log line to stderr.
    #[serde(default)]
    pub echo_log: bool,

    /// Include the emitting thread name in text log lines.
    #[serde(default = "default_true")]
    pub tag_thread: bool,

    // =========================================================================
    // Simulation
    // =========================================================================
    #[serde(default)]
    pub route_mode: RouteMode,

    /// How long a train holds an intersection before moving on.
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,

    /// Delay between starting consecutive train threads.
    #[serde(default)]
    pub start_delay_ms: u64,

    // =========================================================================
    // Input limits
    // =========================================================================
    #[serde(default = "default_max_resources")]
    pub max_resources: usize,

    #[serde(default = "default_max_capacity")]
    pub max_capacity: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resources_file: default_resources_file(),
            routes_file: default_routes_file(),
            log_file: default_log_file(),
            log_format: LogFormat::default(),
            echo_log: false,
            tag_thread: default_true(),
            route_mode: RouteMode::default(),
            hold_ms: default_hold_ms(),
            start_delay_ms: 0,
            max_resources: default_max_resources(),
            max_capacity: default_max_capacity(),
        }
    }
}
