//! Controller facade: solver plus optional penalty adapter.

use kestrel_core::{CacheUpdate, ConfigError, KestrelError, MpcConfig};
use nalgebra::{DMatrix, DVector};
use tracing::info;

use crate::adapter::RhoAdapter;
use crate::cache::Cache;
use crate::solver::AdmmSolver;
use crate::types::{Bounds, ProblemDefinition, Reference, SolveOutcome};

/// Linear MPC controller.
///
/// Owns one [`AdmmSolver`] and, when configured, one [`RhoAdapter`] that runs
/// after every solve. Instances share no state, so independent controllers
/// can run side by side.
#[derive(Clone, Debug)]
pub struct Mpc {
    solver: AdmmSolver,
    adapter: Option<RhoAdapter>,
    sweeps: usize,
}

impl Mpc {
    /// Build from a validated problem and a configuration.
    ///
    /// With an adapter configured the controller starts from the adapter's
    /// `rho_base`; otherwise from `config.rho`.
    pub fn new(problem: ProblemDefinition, config: &MpcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        if problem.horizon() != config.horizon {
            return Err(ConfigError::invalid(
                "horizon",
                format!(
                    "problem has {} knot points, config asks for {}",
                    problem.horizon(),
                    config.horizon
                ),
            ));
        }

        let sweeps = config.riccati_iterations;
        let rho = config.adapter.map_or(config.rho, |adapter| adapter.rho_base);
        let cache = Cache::compute(&problem, rho, sweeps)?;

        let adapter = match (config.adapter, config.cache_update()) {
            (Some(adapter_config), Some(cache_update)) => {
                let mut adapter = RhoAdapter::new(adapter_config, &problem, sweeps)?
                    .with_cache_update(cache_update);
                if cache_update != CacheUpdate::Exact {
                    adapter.initialize_derivatives(&problem, &cache)?;
                }
                Some(adapter)
            }
            _ => None,
        };

        info!(
            nx = problem.nx(),
            nu = problem.nu(),
            horizon = problem.horizon(),
            rho,
            adaptive = adapter.is_some(),
            "MPC controller ready"
        );

        let solver = AdmmSolver::new(problem, cache, config.solver)?;
        Ok(Self {
            solver,
            adapter,
            sweeps,
        })
    }

    /// Build from raw parts with default settings and no adaptation.
    pub fn from_parts(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        horizon: usize,
        rho: f64,
    ) -> Result<Self, ConfigError> {
        let problem = ProblemDefinition::new(a, b, q, r, horizon)?;
        let config = MpcConfig {
            horizon,
            rho,
            ..MpcConfig::default()
        };
        Self::new(problem, &config)
    }

    pub fn set_bounds(
        &mut self,
        u_max: DVector<f64>,
        u_min: DVector<f64>,
        x_max: DVector<f64>,
        x_min: DVector<f64>,
    ) -> Result<(), ConfigError> {
        self.solver.set_bounds(u_max, u_min, x_max, x_min)
    }

    pub fn install_bounds(&mut self, bounds: Bounds) -> Result<(), ConfigError> {
        self.solver.install_bounds(bounds)
    }

    pub fn set_reference(&mut self, reference: &Reference) -> Result<(), ConfigError> {
        self.solver.set_reference(reference)
    }

    /// Solve, then run one adaptation cycle if an adapter is configured.
    ///
    /// The returned outcome describes the solve itself; a penalty change
    /// takes effect from the next call.
    pub fn solve(
        &mut self,
        x_init: &DMatrix<f64>,
        u_init: &DMatrix<f64>,
    ) -> Result<SolveOutcome, KestrelError> {
        let outcome = self.solver.solve(x_init, u_init)?;
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.adapt(&mut self.solver)?;
        }
        Ok(outcome)
    }

    /// Exact cache recomputation at `rho`, refreshing any sensitivities.
    pub fn recache(&mut self, rho: f64) -> Result<(), ConfigError> {
        let cache = Cache::compute(self.solver.problem(), rho, self.sweeps)?;
        self.solver.replace_cache(cache)?;
        if let Some(adapter) = self.adapter.as_mut() {
            if adapter.cache_update() != CacheUpdate::Exact {
                adapter.initialize_derivatives(self.solver.problem(), self.solver.cache())?;
            }
        }
        Ok(())
    }

    /// Clear trajectory, slack and dual state.
    pub fn reset(&mut self) {
        self.solver.reset();
    }

    pub const fn solver(&self) -> &AdmmSolver {
        &self.solver
    }

    pub const fn adapter(&self) -> Option<&RhoAdapter> {
        self.adapter.as_ref()
    }

    pub const fn cache(&self) -> &Cache {
        self.solver.cache()
    }

    pub const fn problem(&self) -> &ProblemDefinition {
        self.solver.problem()
    }

    pub const fn rho(&self) -> f64 {
        self.solver.rho()
    }

    pub const fn states(&self) -> &DMatrix<f64> {
        self.solver.states()
    }

    pub const fn inputs(&self) -> &DMatrix<f64> {
        self.solver.inputs()
    }

    pub fn first_input(&self) -> DVector<f64> {
        self.solver.first_input()
    }
}
