//! ADMM linear MPC with an infinite-horizon LQR cache and online penalty
//! adaptation.
//!
//! The pipeline per control step:
//!
//! 1. **Cache**: `Kinf`, `Pinf`, `C1`, `C2` for the current penalty rho,
//!    computed once by a bounded Riccati recursion
//! 2. **ADMM solve**: warm-started backward/forward Riccati passes, box
//!    projection and dual ascent until the residuals meet tolerance or the
//!    iteration cap is hit
//! 3. **Rho adaptation** (optional): residual balancing on the stacked KKT
//!    system, followed by a first-order or exact cache update
//!
//! # Architecture
//!
//! Everything the solve touches is allocated when the solver is built, so
//! the per-step cost is bounded and allocation-free. The first-order cache
//! update uses derivatives of the Riccati recursion with respect to rho
//! ([`sensitivity`]), which replaces a full recomputation with four
//! matrix additions.

pub mod adapter;
pub mod cache;
pub mod controller;
pub mod kkt;
pub mod sensitivity;
pub mod solver;
pub mod types;

pub use adapter::RhoAdapter;
pub use cache::{Cache, DEFAULT_RICCATI_SWEEPS};
pub use controller::Mpc;
pub use kkt::{KktFormat, KktResiduals};
pub use sensitivity::{CacheSensitivity, cache_with_sensitivity};
pub use solver::AdmmSolver;
pub use types::{
    Bounds, ConstraintViolation, ProblemDefinition, Reference, Residuals, SolveOutcome,
    SolveStatus,
};
