//! Infinite-horizon LQR cache for the ADMM primal update.
//!
//! The ADMM primal step is an unconstrained LQ problem with the penalty
//! folded into the weights:
//!
//! ```text
//! Q̃ = Q + ρI        R̃ = R + ρI
//! K = (R̃ + BᵀPB)⁻¹ BᵀPA
//! P ← Q̃ + AᵀP(A − BK)
//! ```
//!
//! The recursion runs for a fixed number of sweeps starting from `P = Q̃`,
//! so its cost is bounded and known ahead of time. Each sweep ends with
//! `P ← (P + Pᵀ)/2`; `R̃ + BᵀPB` is factored from its lower triangle only
//! and needs a symmetric `P`. The cache then holds
//!
//! ```text
//! Kinf = K(Pinf)      C1 = (R̃ + BᵀPinfB)⁻¹      C2 = A − B·Kinf
//! ```

use kestrel_core::ConfigError;
use nalgebra::linalg::Cholesky;
use nalgebra::{DMatrix, Dyn};
use tracing::debug;

use crate::sensitivity::CacheSensitivity;
use crate::types::ProblemDefinition;

/// Default number of Riccati sweeps.
pub const DEFAULT_RICCATI_SWEEPS: usize = 500;

/// Precomputed gains for one penalty value.
#[derive(Clone, Debug, PartialEq)]
pub struct Cache {
    pub(crate) rho: f64,
    pub(crate) kinf: DMatrix<f64>,
    pub(crate) pinf: DMatrix<f64>,
    pub(crate) c1: DMatrix<f64>,
    pub(crate) c2: DMatrix<f64>,
}

impl Cache {
    /// Run `sweeps` Riccati iterations at penalty `rho` and build the cache.
    ///
    /// Fails when `rho` is not a positive finite number, when `R̃ + BᵀPB`
    /// stops being positive definite, or when the recursion blows up (for
    /// example an unstabilisable `(A, B)` pair).
    pub fn compute(
        problem: &ProblemDefinition,
        rho: f64,
        sweeps: usize,
    ) -> Result<Self, ConfigError> {
        check_rho(rho)?;
        let (q_rho, r_rho) = penalised_weights(problem, rho);

        let mut p = q_rho.clone();
        for _ in 0..sweeps {
            let (_, k) = lqr_gain(problem, &r_rho, &p)?;
            p = riccati_update(problem, &q_rho, &p, &k);
        }

        let cache = Self::from_value_function(problem, rho, &r_rho, p)?;
        debug!(
            rho,
            sweeps,
            residual = cache.fixed_point_residual(problem),
            "computed LQR cache"
        );
        Ok(cache)
    }

    /// Build the cache from a converged value function `pinf`.
    pub(crate) fn from_value_function(
        problem: &ProblemDefinition,
        rho: f64,
        r_rho: &DMatrix<f64>,
        pinf: DMatrix<f64>,
    ) -> Result<Self, ConfigError> {
        if !pinf.iter().all(|v| v.is_finite()) {
            return Err(ConfigError::RiccatiDiverged { rho });
        }
        let (chol, kinf) = lqr_gain(problem, r_rho, &pinf)?;
        let c1 = chol.inverse();
        let c2 = &problem.a - &problem.b * &kinf;
        if !(kinf.iter().chain(c1.iter()).chain(c2.iter())).all(|v| v.is_finite()) {
            return Err(ConfigError::RiccatiDiverged { rho });
        }
        Ok(Self {
            rho,
            kinf,
            pinf,
            c1,
            c2,
        })
    }

    pub const fn rho(&self) -> f64 {
        self.rho
    }

    /// Feedback gain Kinf (m×n).
    pub const fn kinf(&self) -> &DMatrix<f64> {
        &self.kinf
    }

    /// Terminal value function Pinf (n×n), symmetric.
    ///
    /// This is the fixed point of the penalised recursion, so it carries the
    /// `ρI` state coupling: `Pinf = Q + ρI + AᵀPinf(A − B·Kinf)`, not the
    /// plain LQR value function of `(Q, R)`.
    pub const fn pinf(&self) -> &DMatrix<f64> {
        &self.pinf
    }

    /// `(R + ρI + BᵀPinfB)⁻¹` (m×m).
    pub const fn c1(&self) -> &DMatrix<f64> {
        &self.c1
    }

    /// Closed-loop matrix `A − B·Kinf` (n×n).
    pub const fn c2(&self) -> &DMatrix<f64> {
        &self.c2
    }

    /// `‖Pinf − (Q̃ + AᵀPinf(A − B·Kinf))‖∞`, zero at an exact fixed point.
    pub fn fixed_point_residual(&self, problem: &ProblemDefinition) -> f64 {
        let (q_rho, _) = penalised_weights(problem, self.rho);
        let next = riccati_update(problem, &q_rho, &self.pinf, &self.kinf);
        (&self.pinf - next).amax()
    }

    /// Move the cache to `new_rho` with a first-order Taylor step.
    ///
    /// The step is taken from the current penalty using derivatives that may
    /// have been evaluated at an older one; refresh them with an exact
    /// recomputation when that drift matters.
    pub fn apply_first_order(&mut self, sensitivity: &CacheSensitivity, new_rho: f64) {
        let delta = new_rho - self.rho;
        add_scaled(&mut self.kinf, &sensitivity.dkinf, delta);
        add_scaled(&mut self.pinf, &sensitivity.dpinf, delta);
        add_scaled(&mut self.c1, &sensitivity.dc1, delta);
        add_scaled(&mut self.c2, &sensitivity.dc2, delta);
        self.rho = new_rho;
    }
}

fn add_scaled(target: &mut DMatrix<f64>, derivative: &DMatrix<f64>, delta: f64) {
    for (t, d) in target.iter_mut().zip(derivative.iter()) {
        *t += delta * d;
    }
}

// ---------------------------------------------------------------------------
// Riccati building blocks, shared with the sensitivity recursion
// ---------------------------------------------------------------------------

pub(crate) fn check_rho(rho: f64) -> Result<(), ConfigError> {
    if rho > 0.0 && rho.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidRho(rho))
    }
}

/// `(Q + ρI, R + ρI)`.
pub(crate) fn penalised_weights(
    problem: &ProblemDefinition,
    rho: f64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let nx = problem.nx();
    let nu = problem.nu();
    let q_rho = &problem.q + DMatrix::identity(nx, nx) * rho;
    let r_rho = &problem.r + DMatrix::identity(nu, nu) * rho;
    (q_rho, r_rho)
}

/// Factor `S = R̃ + BᵀPB` and solve for `K = S⁻¹BᵀPA`.
pub(crate) fn lqr_gain(
    problem: &ProblemDefinition,
    r_rho: &DMatrix<f64>,
    p: &DMatrix<f64>,
) -> Result<(Cholesky<f64, Dyn>, DMatrix<f64>), ConfigError> {
    let bt_p = problem.b.transpose() * p;
    let s = r_rho + &bt_p * &problem.b;
    let chol = Cholesky::new(s).ok_or(ConfigError::SingularMatrix("R + rho*I + B'PB"))?;
    let k = chol.solve(&(bt_p * &problem.a));
    Ok((chol, k))
}

/// `Q̃ + AᵀP(A − BK)`, symmetrised.
pub(crate) fn riccati_update(
    problem: &ProblemDefinition,
    q_rho: &DMatrix<f64>,
    p: &DMatrix<f64>,
    k: &DMatrix<f64>,
) -> DMatrix<f64> {
    let closed_loop = &problem.a - &problem.b * k;
    symmetrize(q_rho + problem.a.transpose() * p * closed_loop)
}

/// `(M + Mᵀ)/2`.
pub(crate) fn symmetrize(mut m: DMatrix<f64>) -> DMatrix<f64> {
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            let mean = 0.5 * (m[(i, j)] + m[(j, i)]);
            m[(i, j)] = mean;
            m[(j, i)] = mean;
        }
    }
    m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn double_integrator(horizon: usize) -> ProblemDefinition {
        let dt = 0.1;
        ProblemDefinition::new(
            DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
            DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]),
            DMatrix::from_diagonal(&nalgebra::DVector::from_vec(vec![10.0, 1.0])),
            DMatrix::from_element(1, 1, 0.1),
            horizon,
        )
        .unwrap()
    }

    #[test]
    fn riccati_reaches_fixed_point() {
        let problem = double_integrator(10);
        let cache = Cache::compute(&problem, 5.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        assert!(cache.fixed_point_residual(&problem) < 1e-8);
    }

    #[test]
    fn kinf_matches_closed_form() {
        let problem = double_integrator(10);
        let rho = 5.0;
        let cache = Cache::compute(&problem, rho, DEFAULT_RICCATI_SWEEPS).unwrap();

        let b = problem.b();
        let p = cache.pinf();
        let s = problem.r() + DMatrix::identity(1, 1) * rho + b.transpose() * p * b;
        let s_inv = s.clone().try_inverse().unwrap();
        let k = &s_inv * b.transpose() * p * problem.a();

        assert_relative_eq!(cache.kinf().clone(), k, epsilon = 1e-10);
        assert_relative_eq!(cache.c1().clone(), s_inv, epsilon = 1e-10);
        assert_relative_eq!(
            cache.c2().clone(),
            problem.a() - b * cache.kinf(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn pinf_is_symmetric() {
        let problem = double_integrator(10);
        let cache = Cache::compute(&problem, 1.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        let p = cache.pinf();
        assert_eq!(p, &p.transpose());
    }

    #[test]
    fn symmetrize_averages_off_diagonal() {
        let m = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 4.0, 3.0]);
        assert_eq!(symmetrize(m), DMatrix::from_row_slice(2, 2, &[1.0, 3.0, 3.0, 3.0]));
    }

    #[test]
    fn closed_loop_is_stable() {
        let problem = double_integrator(10);
        let cache = Cache::compute(&problem, 5.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        // Spectral radius < 1 shows up as a decaying power.
        let mut m = cache.c2().clone();
        for _ in 0..200 {
            m = &m * cache.c2();
        }
        assert!(m.amax() < 1e-3);
    }

    #[test]
    fn larger_rho_shrinks_c1() {
        let problem = double_integrator(10);
        let low = Cache::compute(&problem, 1.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        let high = Cache::compute(&problem, 100.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        assert!(high.c1().amax() < low.c1().amax());
    }

    #[test]
    fn non_positive_rho_rejected() {
        let problem = double_integrator(10);
        assert!(matches!(
            Cache::compute(&problem, 0.0, 10),
            Err(ConfigError::InvalidRho(_))
        ));
        assert!(matches!(
            Cache::compute(&problem, f64::NAN, 10),
            Err(ConfigError::InvalidRho(_))
        ));
    }

    #[test]
    fn unstabilisable_system_fails() {
        let problem = ProblemDefinition::new(
            DMatrix::identity(2, 2) * 3.0,
            DMatrix::zeros(2, 1),
            DMatrix::identity(2, 2),
            DMatrix::identity(1, 1),
            5,
        )
        .unwrap();
        let result = Cache::compute(&problem, 1.0, 1000);
        assert!(matches!(
            result,
            Err(ConfigError::RiccatiDiverged { .. } | ConfigError::SingularMatrix(_))
        ));
    }

    #[test]
    fn zero_step_first_order_update_is_identity() {
        let problem = double_integrator(10);
        let mut cache = Cache::compute(&problem, 5.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        let sensitivity =
            CacheSensitivity::analytical(&problem, 5.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        let before = cache.clone();
        cache.apply_first_order(&sensitivity, 5.0);
        assert_eq!(cache, before);
    }
}
