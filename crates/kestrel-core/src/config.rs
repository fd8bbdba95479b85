use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_horizon() -> usize {
    10
}
const fn default_rho() -> f64 {
    85.0
}
const fn default_riccati_iterations() -> usize {
    500
}
const fn default_max_iter() -> usize {
    100
}
const fn default_abs_tol() -> f64 {
    1e-3
}
const fn default_rel_tol() -> f64 {
    1e-3
}
const fn default_check_every() -> usize {
    1
}
const fn default_rho_base() -> f64 {
    85.0
}
const fn default_rho_min() -> f64 {
    60.0
}
const fn default_rho_max() -> f64 {
    100.0
}
const fn default_tolerance() -> f64 {
    1.1
}
const fn default_adapt_every() -> u32 {
    1
}
const fn default_exact_every() -> u32 {
    10
}
const fn default_fd_step() -> f64 {
    1e-4
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// How the adapter turns a residual ratio into a new penalty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationMethod {
    /// `rho * sqrt(primal_ratio / dual_ratio)`, clipped.
    #[default]
    Analytical,
    /// Multiply or divide by `tolerance` when the ratio leaves
    /// `[1/tolerance, tolerance]`.
    Heuristic,
}

/// How the cache sensitivities d(cache)/d(rho) are obtained.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityMethod {
    /// Forward-mode differentiation of the Riccati sweeps.
    #[default]
    Analytical,
    /// Central differences of two exact recomputations.
    FiniteDifference,
}

/// How the cache follows a change of rho.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheUpdate {
    /// First-order Taylor step from the stored sensitivities.
    #[default]
    FirstOrder,
    /// Full Riccati recomputation on every change.
    Exact,
    /// First-order steps with an exact recomputation every
    /// `exact_every` adaptations.
    Hybrid,
}

// ---------------------------------------------------------------------------
// SolverSettings
// ---------------------------------------------------------------------------

/// ADMM termination settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverSettings {
    /// Hard iteration cap (default: 100).
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,

    /// Absolute residual tolerance (default: 1e-3).
    #[serde(default = "default_abs_tol")]
    pub abs_tol: f64,

    /// Relative residual tolerance (default: 1e-3).
    #[serde(default = "default_rel_tol")]
    pub rel_tol: f64,

    /// Residuals are checked every `check_every` iterations (default: 1).
    #[serde(default = "default_check_every")]
    pub check_every: usize,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iter: default_max_iter(),
            abs_tol: default_abs_tol(),
            rel_tol: default_rel_tol(),
            check_every: default_check_every(),
        }
    }
}

impl SolverSettings {
    /// Validate settings. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iter == 0 {
            return Err(ConfigError::invalid("max_iter", "must be > 0"));
        }
        if self.check_every == 0 {
            return Err(ConfigError::invalid("check_every", "must be > 0"));
        }
        if !(self.abs_tol >= 0.0 && self.abs_tol.is_finite()) {
            return Err(ConfigError::invalid("abs_tol", "must be finite and >= 0"));
        }
        if !(self.rel_tol >= 0.0 && self.rel_tol.is_finite()) {
            return Err(ConfigError::invalid("rel_tol", "must be finite and >= 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// AdapterConfig
// ---------------------------------------------------------------------------

/// Online penalty adaptation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Penalty the adapter starts from (default: 85).
    #[serde(default = "default_rho_base")]
    pub rho_base: f64,

    /// Lower clip for predicted penalties (default: 60).
    #[serde(default = "default_rho_min")]
    pub rho_min: f64,

    /// Upper clip for predicted penalties (default: 100).
    #[serde(default = "default_rho_max")]
    pub rho_max: f64,

    /// Ratio band and step factor of the heuristic method (default: 1.1).
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    #[serde(default)]
    pub method: AdaptationMethod,

    #[serde(default)]
    pub sensitivity: SensitivityMethod,

    /// Step used by [`SensitivityMethod::FiniteDifference`] (default: 1e-4).
    #[serde(default = "default_fd_step")]
    pub fd_step: f64,

    #[serde(default)]
    pub cache_update: CacheUpdate,

    /// Exact recomputation period for [`CacheUpdate::Hybrid`] (default: 10).
    #[serde(default = "default_exact_every")]
    pub exact_every: u32,

    /// Adapt after every `adapt_every` solves (default: 1).
    #[serde(default = "default_adapt_every")]
    pub adapt_every: u32,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            rho_base: default_rho_base(),
            rho_min: default_rho_min(),
            rho_max: default_rho_max(),
            tolerance: default_tolerance(),
            method: AdaptationMethod::default(),
            sensitivity: SensitivityMethod::default(),
            fd_step: default_fd_step(),
            cache_update: CacheUpdate::default(),
            exact_every: default_exact_every(),
            adapt_every: default_adapt_every(),
        }
    }
}

impl AdapterConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("rho_base", self.rho_base),
            ("rho_min", self.rho_min),
            ("rho_max", self.rho_max),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::invalid(field, "must be finite and > 0"));
            }
        }
        if self.rho_min > self.rho_max {
            return Err(ConfigError::invalid("rho_min", "must be <= rho_max"));
        }
        if self.rho_base < self.rho_min || self.rho_base > self.rho_max {
            return Err(ConfigError::invalid("rho_base", "must lie in [rho_min, rho_max]"));
        }
        if !(self.tolerance >= 1.0 && self.tolerance.is_finite()) {
            return Err(ConfigError::invalid("tolerance", "must be finite and >= 1"));
        }
        if !(self.fd_step > 0.0 && self.fd_step.is_finite()) {
            return Err(ConfigError::invalid("fd_step", "must be finite and > 0"));
        }
        if self.adapt_every == 0 {
            return Err(ConfigError::invalid("adapt_every", "must be > 0"));
        }
        if self.exact_every == 0 {
            return Err(ConfigError::invalid("exact_every", "must be > 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// MpcConfig
// ---------------------------------------------------------------------------

/// Controller configuration. The plant and weight matrices are supplied
/// separately; this covers everything that can live in a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MpcConfig {
    /// Number of knot points N (default: 10). Must be >= 2.
    #[serde(default = "default_horizon")]
    pub horizon: usize,

    /// Initial ADMM penalty (default: 85).
    #[serde(default = "default_rho")]
    pub rho: f64,

    /// Fixed number of Riccati sweeps for the cache (default: 500).
    #[serde(default = "default_riccati_iterations")]
    pub riccati_iterations: usize,

    #[serde(default)]
    pub solver: SolverSettings,

    /// Enables online penalty adaptation when present.
    #[serde(default)]
    pub adapter: Option<AdapterConfig>,

    /// Force an exact cache recomputation on every penalty change.
    #[serde(default)]
    pub recache: bool,
}

impl Default for MpcConfig {
    fn default() -> Self {
        Self {
            horizon: default_horizon(),
            rho: default_rho(),
            riccati_iterations: default_riccati_iterations(),
            solver: SolverSettings::default(),
            adapter: None,
            recache: false,
        }
    }
}

impl MpcConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.horizon < 2 {
            return Err(ConfigError::InvalidHorizon(self.horizon));
        }
        if !(self.rho > 0.0 && self.rho.is_finite()) {
            return Err(ConfigError::InvalidRho(self.rho));
        }
        if self.riccati_iterations == 0 {
            return Err(ConfigError::invalid("riccati_iterations", "must be > 0"));
        }
        self.solver.validate()?;
        if let Some(adapter) = &self.adapter {
            adapter.validate()?;
        }
        Ok(())
    }

    /// Builder-style helper to enable adaptation.
    #[must_use]
    pub fn with_adapter(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Effective cache update strategy, taking `recache` into account.
    pub fn cache_update(&self) -> Option<CacheUpdate> {
        self.adapter.map(|adapter| {
            if self.recache {
                CacheUpdate::Exact
            } else {
                adapter.cache_update
            }
        })
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
