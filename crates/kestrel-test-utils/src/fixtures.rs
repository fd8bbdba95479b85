//! Canonical problems shared across crate tests.

use kestrel_core::{AdapterConfig, MpcConfig, SolverSettings};
use kestrel_mpc::{Bounds, ProblemDefinition};
use nalgebra::{DMatrix, DVector};

/// Allowed deviation per error-state component for the hover weights:
/// position, attitude (Rodrigues), velocity, body rate.
pub const HOVER_MAX_DEVIATION: [f64; 12] = [
    0.1, 0.1, 0.1, 0.5, 0.5, 0.05, 0.5, 0.5, 0.5, 0.7, 0.7, 0.2,
];

/// Allowed deviation of each motor command from hover.
pub const HOVER_MAX_INPUT_DEVIATION: f64 = 0.5;

/// Hover penalty used by the closed-loop scenarios.
pub const HOVER_RHO: f64 = 85.0;

/// Horizon used by the closed-loop scenarios.
pub const HOVER_HORIZON: usize = 10;

/// ADMM iteration cap for the hover scenarios. The first step of the
/// 0.2 m recovery needs up to about 290 iterations at rho 85.
pub const HOVER_MAX_ITER: usize = 400;

/// Bryson-style weights `Q = diag(1 / max_dev²)`, `R = diag(1 / 0.5²)`.
pub fn hover_weights() -> (DMatrix<f64>, DMatrix<f64>) {
    let q = DMatrix::from_diagonal(&DVector::from_iterator(
        12,
        HOVER_MAX_DEVIATION.iter().map(|d| 1.0 / (d * d)),
    ));
    let r = DMatrix::from_diagonal(&DVector::from_element(
        4,
        1.0 / (HOVER_MAX_INPUT_DEVIATION * HOVER_MAX_INPUT_DEVIATION),
    ));
    (q, r)
}

/// Fixed-penalty hover configuration.
pub fn hover_config() -> MpcConfig {
    MpcConfig {
        horizon: HOVER_HORIZON,
        rho: HOVER_RHO,
        solver: SolverSettings {
            max_iter: HOVER_MAX_ITER,
            ..SolverSettings::default()
        },
        ..MpcConfig::default()
    }
}

/// Hover configuration with the default adapter (85 within [60, 100]).
pub fn adaptive_hover_config() -> MpcConfig {
    hover_config().with_adapter(AdapterConfig::default())
}

/// Deviation-coordinate motor bounds around `hover_thrust`, with states
/// effectively unbounded.
pub fn hover_bounds(hover_thrust: f64) -> Bounds {
    Bounds {
        u_min: DVector::from_element(4, -hover_thrust),
        u_max: DVector::from_element(4, 1.0 - hover_thrust),
        x_min: DVector::from_element(12, -1000.0),
        x_max: DVector::from_element(12, 1000.0),
    }
}

/// Limits wide enough never to activate.
pub fn wide_bounds(nx: usize, nu: usize) -> Bounds {
    Bounds {
        u_min: DVector::from_element(nu, -1e3),
        u_max: DVector::from_element(nu, 1e3),
        x_min: DVector::from_element(nx, -1e3),
        x_max: DVector::from_element(nx, 1e3),
    }
}

/// Position/velocity double integrator discretised at `dt`.
pub fn double_integrator(dt: f64) -> (DMatrix<f64>, DMatrix<f64>) {
    (
        DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
        DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]),
    )
}

/// Double integrator at `dt = 0.1` with `Q = diag(10, 1)`, `R = 0.1`.
pub fn double_integrator_problem(horizon: usize) -> ProblemDefinition {
    let (a, b) = double_integrator(0.1);
    let q = DMatrix::from_diagonal(&DVector::from_vec(vec![10.0, 1.0]));
    let r = DMatrix::from_element(1, 1, 0.1);
    ProblemDefinition::new(a, b, q, r, horizon)
        .unwrap_or_else(|e| panic!("double integrator fixture is valid: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hover_weights_match_deviations() {
        let (q, r) = hover_weights();
        assert!((q[(0, 0)] - 100.0).abs() < 1e-9);
        assert!((q[(5, 5)] - 400.0).abs() < 1e-9);
        assert!((r[(3, 3)] - 4.0).abs() < 1e-12);
    }

    #[test]
    fn fixtures_validate() {
        assert!(hover_config().validate().is_ok());
        assert!(adaptive_hover_config().validate().is_ok());
        assert_eq!(adaptive_hover_config().solver.max_iter, HOVER_MAX_ITER);
        assert!(hover_bounds(0.58).validate().is_ok());
        assert!(wide_bounds(3, 2).check_dims(3, 2).is_ok());
        assert_eq!(double_integrator_problem(8).horizon(), 8);
    }
}
