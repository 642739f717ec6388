//! Core library modules for gtfs-forge
//!
//! This module contains the internal implementation details of the gtfs-forge library.

pub mod advisor;
pub mod config;
pub mod error;
pub mod geo;
pub mod geocoder;
pub mod modes;
pub mod router;
pub mod shape;
pub mod synthesizer;

// Re-export main types for internal use
pub use config::{env_config, ForgeConfig};
pub use synthesizer::RouteSynthesizer;
