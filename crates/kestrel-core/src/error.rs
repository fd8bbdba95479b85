use thiserror::Error;

/// Top-level error type for the Kestrel crates.
#[derive(Debug, Error)]
pub enum KestrelError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Solve error: {0}")]
    Solve(#[from] SolveError),
}

/// Setup-time errors. All of these are fatal to the configuration they were
/// raised for: a solver is never built from a rejected configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid horizon: {0} (must be >= 2)")]
    InvalidHorizon(usize),

    #[error("Invalid rho: {0} (must be finite and > 0)")]
    InvalidRho(f64),

    #[error(
        "Dimension mismatch for {what}: expected {expected_rows}x{expected_cols}, got {rows}x{cols}"
    )]
    DimensionMismatch {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("{0} must be symmetric")]
    NotSymmetric(&'static str),

    #[error("{0} contains NaN or Inf")]
    NonFinite(&'static str),

    #[error("Singular matrix while computing {0}")]
    SingularMatrix(&'static str),

    #[error("Riccati recursion diverged at rho = {rho}")]
    RiccatiDiverged { rho: f64 },

    #[error("Invalid {which} bounds at index {index}: min {min} > max {max}")]
    InvalidBounds {
        which: &'static str,
        index: usize,
        min: f64,
        max: f64,
    },

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

impl ConfigError {
    /// Shorthand for [`ConfigError::InvalidValue`].
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Solve-time errors.
///
/// Copy + static messages for cheap propagation in the control loop. Hitting
/// the iteration cap is not an error; see the solver's status instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SolveError {
    #[error("Bounds must be set before the first solve")]
    BoundsNotSet,

    #[error("Warm start {what} has shape {rows}x{cols}, expected {expected_rows}x{expected_cols}")]
    WarmStartShape {
        what: &'static str,
        expected_rows: usize,
        expected_cols: usize,
        rows: usize,
        cols: usize,
    },

    #[error("Warm start contains NaN or Inf")]
    NonFiniteInput,

    #[error("Numerical divergence: NaN detected at iteration {iteration}")]
    NumericalDivergence { iteration: usize },
}
