//! Shared test fixtures and utilities for Kestrel crates.
//!
//! Provides canonical problems (hover weights, double integrator), bound
//! presets, and deterministic random systems.

pub mod fixtures;
pub mod rng;

// ---------------------------------------------------------------------------
// Re-exports for convenience
// ---------------------------------------------------------------------------

pub use fixtures::{
    adaptive_hover_config, double_integrator, double_integrator_problem, hover_bounds,
    hover_config, hover_weights, wide_bounds,
};
pub use rng::{RandomSystem, deterministic_vec, random_stable_system, seeded_rng};
