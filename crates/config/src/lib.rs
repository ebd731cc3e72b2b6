//! Configuration and catalog loading for rollout
//!
//! This crate owns everything that is read from disk before planning starts:
//! planner settings, task catalogs, and the per-release snapshot registry.

pub mod config;
pub mod loader;
pub mod registry;

pub use config::*;
pub use loader::*;
pub use registry::*;
