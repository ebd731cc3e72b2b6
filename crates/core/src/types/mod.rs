//! Core domain types for `rollout`.
//!
//! - **`tasks`**: catalog templates, merged tasks, task types and roles
//! - **`catalog`**: the immutable per-release template collection
//! - **`nodes`**: deployment nodes and synthetic stages
//! - **`commands`**: normalized per-node command records and plans

pub mod catalog;
pub mod commands;
pub mod nodes;
pub mod tasks;

pub use catalog::*;
pub use commands::*;
pub use nodes::*;
pub use tasks::*;
