//! CLI command implementations.

pub mod analyze;
pub mod bench;
pub mod common;
pub mod config;
pub mod engines;
