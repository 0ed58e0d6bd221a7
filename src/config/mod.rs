//! Configuration model for interlock.
//!
//! This module defines the Config struct that represents `interlock.yaml`.
//! Unknown fields are ignored, every field has a default, and values are
//! validated after parsing.

mod model;
mod operations;
pub mod types;


pub use model::{CONFIG_FILE_NAME, Config};
pub use types::{LogFormat, RouteMode};
