//! Derivatives of the LQR cache with respect to the penalty.
//!
//! The analytical path differentiates the bounded Riccati recursion itself,
//! one sweep at a time, in forward mode. With `S = R̃ + BᵀPB` and
//! `K = S⁻¹BᵀPA`, one sweep and its tangent are
//!
//! ```text
//! P' = Q̃ + AᵀP(A − BK)
//! dS  = I + BᵀdP B
//! dK  = S⁻¹(BᵀdP A − dS·K)
//! dP' = I + AᵀdP(A − BK) − AᵀPB·dK
//! ```
//!
//! starting from `dP = I` (since `P₀ = Q̃`). `P'` and `dP'` are both
//! symmetrised each sweep, as in [`Cache::compute`]. The cache tangents follow as
//! `dC1 = −C1·dS·C1` and `dC2 = −B·dK`. Because the same number of sweeps is
//! differentiated as is run by [`Cache::compute`], the result is the exact
//! derivative of the computed cache, converged or not.
//!
//! The finite-difference path is kept as a fallback. With a central
//! difference of step `h` its truncation error is O(h²) and its rounding
//! error O(ε·|cache|/h).

use kestrel_core::{ConfigError, SensitivityMethod};
use nalgebra::DMatrix;

use crate::cache::{Cache, check_rho, lqr_gain, penalised_weights, riccati_update, symmetrize};
use crate::types::ProblemDefinition;

/// d(cache)/d(rho), each shaped like its base matrix.
#[derive(Clone, Debug, PartialEq)]
pub struct CacheSensitivity {
    /// Penalty the derivatives were evaluated at.
    pub(crate) rho: f64,
    pub(crate) dkinf: DMatrix<f64>,
    pub(crate) dpinf: DMatrix<f64>,
    pub(crate) dc1: DMatrix<f64>,
    pub(crate) dc2: DMatrix<f64>,
}

impl CacheSensitivity {
    /// Dispatch on `method`.
    pub fn compute(
        method: SensitivityMethod,
        problem: &ProblemDefinition,
        rho: f64,
        sweeps: usize,
        fd_step: f64,
    ) -> Result<Self, ConfigError> {
        match method {
            SensitivityMethod::Analytical => Self::analytical(problem, rho, sweeps),
            SensitivityMethod::FiniteDifference => {
                Self::finite_difference(problem, rho, sweeps, fd_step)
            }
        }
    }

    /// Forward-mode derivative of the Riccati sweeps.
    pub fn analytical(
        problem: &ProblemDefinition,
        rho: f64,
        sweeps: usize,
    ) -> Result<Self, ConfigError> {
        cache_with_sensitivity(problem, rho, sweeps).map(|(_, sensitivity)| sensitivity)
    }

    /// Central difference with relative step `step` (absolute step
    /// `step * max(rho, 1)`, halved until it stays below `rho`).
    ///
    /// `step` must be finite and positive.
    pub fn finite_difference(
        problem: &ProblemDefinition,
        rho: f64,
        sweeps: usize,
        step: f64,
    ) -> Result<Self, ConfigError> {
        check_rho(rho)?;
        if !(step > 0.0 && step.is_finite()) {
            return Err(ConfigError::invalid("fd_step", "must be finite and > 0"));
        }
        let mut h = step * rho.max(1.0);
        while h >= rho {
            h *= 0.5;
        }
        let plus = Cache::compute(problem, rho + h, sweeps)?;
        let minus = Cache::compute(problem, rho - h, sweeps)?;
        let scale = 0.5 / h;
        Ok(Self {
            rho,
            dkinf: (plus.kinf - minus.kinf) * scale,
            dpinf: (plus.pinf - minus.pinf) * scale,
            dc1: (plus.c1 - minus.c1) * scale,
            dc2: (plus.c2 - minus.c2) * scale,
        })
    }

    pub const fn rho(&self) -> f64 {
        self.rho
    }

    pub const fn dkinf(&self) -> &DMatrix<f64> {
        &self.dkinf
    }

    pub const fn dpinf(&self) -> &DMatrix<f64> {
        &self.dpinf
    }

    pub const fn dc1(&self) -> &DMatrix<f64> {
        &self.dc1
    }

    pub const fn dc2(&self) -> &DMatrix<f64> {
        &self.dc2
    }
}

/// Run the Riccati sweeps together with their tangent, returning the cache
/// and its derivatives from a single pass.
pub fn cache_with_sensitivity(
    problem: &ProblemDefinition,
    rho: f64,
    sweeps: usize,
) -> Result<(Cache, CacheSensitivity), ConfigError> {
    check_rho(rho)?;
    let nx = problem.nx();
    let nu = problem.nu();
    let (q_rho, r_rho) = penalised_weights(problem, rho);
    let eye_x = DMatrix::<f64>::identity(nx, nx);
    let eye_u = DMatrix::<f64>::identity(nu, nu);
    let a = &problem.a;
    let b = &problem.b;
    let a_t = a.transpose();
    let b_t = b.transpose();

    let mut p = q_rho.clone();
    let mut dp = eye_x.clone();
    for _ in 0..sweeps {
        let (chol, k) = lqr_gain(problem, &r_rho, &p)?;
        let ds = &eye_u + &b_t * &dp * b;
        let dk = chol.solve(&(&b_t * &dp * a - &ds * &k));

        let next_dp = symmetrize(&eye_x + &a_t * &dp * (a - b * &k) - &a_t * &p * b * &dk);
        p = riccati_update(problem, &q_rho, &p, &k);
        dp = next_dp;
    }

    let cache = Cache::from_value_function(problem, rho, &r_rho, p)?;
    let (chol, _) = lqr_gain(problem, &r_rho, &cache.pinf)?;
    let ds = &eye_u + &b_t * &dp * b;
    let dk = chol.solve(&(&b_t * &dp * a - &ds * &cache.kinf));
    let dc1 = -(&cache.c1 * &ds * &cache.c1);
    let dc2 = -(b * &dk);

    if !(dk.iter().chain(dp.iter()).chain(dc1.iter())).all(|v| v.is_finite()) {
        return Err(ConfigError::RiccatiDiverged { rho });
    }

    let sensitivity = CacheSensitivity {
        rho,
        dkinf: dk,
        dpinf: dp,
        dc1,
        dc2,
    };
    Ok((cache, sensitivity))
}
