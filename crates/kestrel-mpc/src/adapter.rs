//! Online penalty (rho) adaptation.
//!
//! After each solve the iterate is stacked into KKT form, its primal and
//! dual residuals are normalised, and rho is moved to balance them:
//!
//! ```text
//! ρ' = clip(ρ · sqrt((r_p / s_p) / (r_d / s_d)), ρ_min, ρ_max)
//! ```
//!
//! The cache then follows the new penalty, either with a first-order step
//! from stored sensitivities (no factorisation, no Riccati sweep) or with an
//! exact recomputation.

use kestrel_core::{AdaptationMethod, AdapterConfig, CacheUpdate, ConfigError, SensitivityMethod};
use tracing::{debug, info};

use crate::cache::Cache;
use crate::kkt::{KktFormat, KktResiduals};
use crate::sensitivity::{CacheSensitivity, cache_with_sensitivity};
use crate::solver::AdmmSolver;
use crate::types::ProblemDefinition;

/// Penalty adapter bound to one problem size.
#[derive(Clone, Debug)]
pub struct RhoAdapter {
    config: AdapterConfig,
    cache_update: CacheUpdate,
    sweeps: usize,
    kkt: KktFormat,
    sensitivity: Option<CacheSensitivity>,
    rho_history: Vec<f64>,
    residual_history: Vec<KktResiduals>,
    solves_seen: u64,
    rho_changes: u64,
}

impl RhoAdapter {
    /// Allocate KKT buffers for `problem`. `sweeps` is the Riccati sweep
    /// count used for exact recomputation and sensitivities.
    pub fn new(
        config: AdapterConfig,
        problem: &ProblemDefinition,
        sweeps: usize,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cache_update: config.cache_update,
            config,
            sweeps,
            kkt: KktFormat::new(problem),
            sensitivity: None,
            rho_history: vec![config.rho_base],
            residual_history: Vec::new(),
            solves_seen: 0,
            rho_changes: 0,
        })
    }

    /// Override the cache update strategy from the config.
    #[must_use]
    pub fn with_cache_update(mut self, cache_update: CacheUpdate) -> Self {
        self.cache_update = cache_update;
        self
    }

    /// Evaluate d(cache)/d(rho) at the cache's current penalty.
    pub fn initialize_derivatives(
        &mut self,
        problem: &ProblemDefinition,
        cache: &Cache,
    ) -> Result<(), ConfigError> {
        let sensitivity = CacheSensitivity::compute(
            self.config.sensitivity,
            problem,
            cache.rho(),
            self.sweeps,
            self.config.fd_step,
        )?;
        debug!(rho = cache.rho(), "initialised cache sensitivities");
        self.sensitivity = Some(sensitivity);
        Ok(())
    }

    /// Stack the solver's current iterate for residual computation.
    pub fn format_matrices(&mut self, solver: &AdmmSolver) {
        self.kkt.format_matrices(solver);
    }

    /// KKT residuals of the last formatted iterate.
    pub fn compute_residuals(&mut self) -> KktResiduals {
        self.kkt.compute_residuals()
    }

    /// New penalty for the given residuals, always inside `[rho_min, rho_max]`.
    pub fn predict_rho(&self, residuals: &KktResiduals, current_rho: f64) -> f64 {
        let ratio = residuals.ratio();
        let raw = match self.config.method {
            AdaptationMethod::Analytical => current_rho * ratio.sqrt(),
            AdaptationMethod::Heuristic => {
                let tol = self.config.tolerance;
                if ratio > tol {
                    current_rho * tol
                } else if ratio < 1.0 / tol {
                    current_rho / tol
                } else {
                    current_rho
                }
            }
        };
        let raw = if raw.is_finite() { raw } else { current_rho };
        raw.max(self.config.rho_min).min(self.config.rho_max)
    }

    /// Move `cache` to `new_rho` using the configured strategy.
    ///
    /// Asking for the penalty the cache already holds leaves it untouched
    /// and does not count towards the `Hybrid` refresh period.
    pub fn update_matrices(
        &mut self,
        problem: &ProblemDefinition,
        cache: &mut Cache,
        new_rho: f64,
    ) -> Result<(), ConfigError> {
        if same_rho(cache.rho(), new_rho) {
            return Ok(());
        }
        self.rho_changes += 1;
        let exact = match self.cache_update {
            CacheUpdate::FirstOrder => false,
            CacheUpdate::Exact => true,
            CacheUpdate::Hybrid => self.rho_changes % u64::from(self.config.exact_every) == 0,
        };

        if exact {
            self.recompute(problem, cache, new_rho)
        } else {
            if self.sensitivity.is_none() {
                self.initialize_derivatives(problem, cache)?;
            }
            if let Some(sensitivity) = &self.sensitivity {
                cache.apply_first_order(sensitivity, new_rho);
            }
            Ok(())
        }
    }

    fn recompute(
        &mut self,
        problem: &ProblemDefinition,
        cache: &mut Cache,
        new_rho: f64,
    ) -> Result<(), ConfigError> {
        match self.cache_update {
            CacheUpdate::Exact => {
                *cache = Cache::compute(problem, new_rho, self.sweeps)?;
                self.sensitivity = None;
            }
            CacheUpdate::FirstOrder | CacheUpdate::Hybrid => {
                if self.config.sensitivity == SensitivityMethod::Analytical {
                    let (fresh, sensitivity) =
                        cache_with_sensitivity(problem, new_rho, self.sweeps)?;
                    *cache = fresh;
                    self.sensitivity = Some(sensitivity);
                } else {
                    *cache = Cache::compute(problem, new_rho, self.sweeps)?;
                    self.initialize_derivatives(problem, cache)?;
                }
            }
        }
        info!(rho = new_rho, "recomputed LQR cache");
        Ok(())
    }

    /// One adaptation cycle after a solve. Returns the penalty for the next
    /// solve. Runs only every `adapt_every` calls; skipped calls return the
    /// current penalty untouched.
    pub fn adapt(&mut self, solver: &mut AdmmSolver) -> Result<f64, ConfigError> {
        self.solves_seen += 1;
        let current = solver.rho();
        if self.solves_seen % u64::from(self.config.adapt_every) != 0 {
            return Ok(current);
        }

        self.format_matrices(solver);
        let residuals = self.compute_residuals();
        self.residual_history.push(residuals);

        let new_rho = self.predict_rho(&residuals, current);
        if !same_rho(current, new_rho) {
            let (problem, cache) = solver.problem_and_cache_mut();
            self.update_matrices(problem, cache, new_rho)?;
            debug!(
                old_rho = current,
                new_rho,
                primal = residuals.normalized_primal(),
                dual = residuals.normalized_dual(),
                "rho adapted"
            );
        }
        self.rho_history.push(new_rho);
        Ok(new_rho)
    }

    pub const fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub const fn cache_update(&self) -> CacheUpdate {
        self.cache_update
    }

    /// Penalties in effect after each adaptation, starting with `rho_base`.
    pub fn rho_history(&self) -> &[f64] {
        &self.rho_history
    }

    pub fn residual_history(&self) -> &[KktResiduals] {
        &self.residual_history
    }

    pub const fn sensitivity(&self) -> Option<&CacheSensitivity> {
        self.sensitivity.as_ref()
    }

    pub const fn kkt(&self) -> &KktFormat {
        &self.kkt
    }
}

fn same_rho(current: f64, new_rho: f64) -> bool {
    (new_rho - current).abs() <= f64::EPSILON * current
}
