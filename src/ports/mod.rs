//! Trait seams between the simulation core and the outside world.

pub mod artifact_port;
pub mod config_port;
pub mod data_port;
pub mod report_port;
