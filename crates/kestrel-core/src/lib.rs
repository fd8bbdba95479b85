//! Shared error taxonomy and configuration for the Kestrel MPC crates.
//!
//! Setup problems surface as [`ConfigError`], fatal numerical trouble during
//! a solve as [`SolveError`]. Iteration-cap exhaustion is reported as data by
//! the solver, never through these types.

pub mod config;
pub mod error;

pub use config::{
    AdaptationMethod, AdapterConfig, CacheUpdate, MpcConfig, SensitivityMethod, SolverSettings,
};
pub use error::{ConfigError, KestrelError, SolveError};
