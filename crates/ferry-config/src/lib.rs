//! Configuration parsing for Ferry CI.
//!
//! This crate handles parsing of:
//! - Build plans (`.drone.yml`), including repository parameter injection
//! - System configuration (`ferry.kdl`)

pub mod error;
pub mod params;
pub mod plan;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use plan::{YamlParser, parse_build};
pub use system::{SystemConfig, parse_system_config};
