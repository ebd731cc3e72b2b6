//! Shared utilities for rollout

pub mod tracing;
