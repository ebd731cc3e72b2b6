//! Core domain types, errors, and constants for `rollout`.
//!
//! ## Key Components
//!
//! - **`errors`**: the `Error` enum and `Result` alias shared by every stage of
//!   the planning pipeline.
//! - **`types`**: task templates, merged tasks, deployment nodes and the
//!   serialized per-node plan.
//! - **`constants`**: synthetic group names and parameter defaults.

pub mod constants;
pub mod errors;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, Result},
    types::*,
};
