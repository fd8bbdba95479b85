//! Problem, bound and result types shared by the solver and the adapter.

use kestrel_core::ConfigError;
use nalgebra::{DMatrix, DVector};

/// Relative tolerance used when checking Q and R for symmetry.
const SYMMETRY_TOL: f64 = 1e-9;

// ---------------------------------------------------------------------------
// ProblemDefinition
// ---------------------------------------------------------------------------

/// Discrete LTI plant with quadratic stage weights over a fixed horizon.
///
/// `x_{k+1} = A x_k + B u_k`, cost `Σ x_kᵀ Q x_k + u_kᵀ R u_k`. Immutable once
/// built; every dimension check happens here so the solve path does not need
/// to repeat them.
#[derive(Clone, Debug)]
pub struct ProblemDefinition {
    pub(crate) a: DMatrix<f64>,
    pub(crate) b: DMatrix<f64>,
    pub(crate) q: DMatrix<f64>,
    pub(crate) r: DMatrix<f64>,
    pub(crate) horizon: usize,
}

impl ProblemDefinition {
    /// Validate and bundle the plant and weights.
    ///
    /// # Arguments
    /// * `a` - state transition (n×n)
    /// * `b` - input matrix (n×m)
    /// * `q` - symmetric PSD state weight (n×n)
    /// * `r` - symmetric PD input weight (m×m)
    /// * `horizon` - number of knot points N, at least 2
    pub fn new(
        a: DMatrix<f64>,
        b: DMatrix<f64>,
        q: DMatrix<f64>,
        r: DMatrix<f64>,
        horizon: usize,
    ) -> Result<Self, ConfigError> {
        if horizon < 2 {
            return Err(ConfigError::InvalidHorizon(horizon));
        }
        let nx = a.nrows();
        let nu = b.ncols();
        if nx == 0 || nu == 0 {
            return Err(ConfigError::invalid(
                "dimensions",
                "state and input dimensions must be non-zero",
            ));
        }
        check_shape("A", &a, nx, nx)?;
        check_shape("B", &b, nx, nu)?;
        check_shape("Q", &q, nx, nx)?;
        check_shape("R", &r, nu, nu)?;
        for (name, m) in [("A", &a), ("B", &b), ("Q", &q), ("R", &r)] {
            if !m.iter().all(|v| v.is_finite()) {
                return Err(ConfigError::NonFinite(name));
            }
        }
        check_symmetric("Q", &q)?;
        check_symmetric("R", &r)?;

        Ok(Self {
            a,
            b,
            q,
            r,
            horizon,
        })
    }

    pub const fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub const fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub const fn q(&self) -> &DMatrix<f64> {
        &self.q
    }

    pub const fn r(&self) -> &DMatrix<f64> {
        &self.r
    }

    /// Number of knot points N.
    pub const fn horizon(&self) -> usize {
        self.horizon
    }

    /// State dimension n.
    pub fn nx(&self) -> usize {
        self.a.nrows()
    }

    /// Input dimension m.
    pub fn nu(&self) -> usize {
        self.b.ncols()
    }
}

fn check_shape(
    what: &'static str,
    m: &DMatrix<f64>,
    rows: usize,
    cols: usize,
) -> Result<(), ConfigError> {
    if m.nrows() == rows && m.ncols() == cols {
        Ok(())
    } else {
        Err(ConfigError::DimensionMismatch {
            what,
            expected_rows: rows,
            expected_cols: cols,
            rows: m.nrows(),
            cols: m.ncols(),
        })
    }
}

fn check_symmetric(what: &'static str, m: &DMatrix<f64>) -> Result<(), ConfigError> {
    let scale = m.amax().max(1.0);
    let n = m.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            if (m[(i, j)] - m[(j, i)]).abs() > SYMMETRY_TOL * scale {
                return Err(ConfigError::NotSymmetric(what));
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Bounds
// ---------------------------------------------------------------------------

/// Per-step box constraints, broadcast across the whole horizon.
///
/// Infinite limits are allowed; NaN and `min > max` are not.
#[derive(Clone, Debug, PartialEq)]
pub struct Bounds {
    pub u_min: DVector<f64>,
    pub u_max: DVector<f64>,
    pub x_min: DVector<f64>,
    pub x_max: DVector<f64>,
}

impl Bounds {
    pub fn new(
        u_min: DVector<f64>,
        u_max: DVector<f64>,
        x_min: DVector<f64>,
        x_max: DVector<f64>,
    ) -> Result<Self, ConfigError> {
        let bounds = Self {
            u_min,
            u_max,
            x_min,
            x_max,
        };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Same limits on every component: inputs in `u`, states in `x`.
    pub fn uniform(
        nx: usize,
        nu: usize,
        u: (f64, f64),
        x: (f64, f64),
    ) -> Result<Self, ConfigError> {
        Self::new(
            DVector::from_element(nu, u.0),
            DVector::from_element(nu, u.1),
            DVector::from_element(nx, x.0),
            DVector::from_element(nx, x.1),
        )
    }

    /// No constraints at all.
    pub fn unbounded(nx: usize, nu: usize) -> Self {
        Self {
            u_min: DVector::from_element(nu, f64::NEG_INFINITY),
            u_max: DVector::from_element(nu, f64::INFINITY),
            x_min: DVector::from_element(nx, f64::NEG_INFINITY),
            x_max: DVector::from_element(nx, f64::INFINITY),
        }
    }

    /// Check `min <= max` component-wise (NaN fails the comparison).
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.u_min.len() != self.u_max.len() {
            return Err(vector_mismatch("u_max", self.u_min.len(), self.u_max.len()));
        }
        if self.x_min.len() != self.x_max.len() {
            return Err(vector_mismatch("x_max", self.x_min.len(), self.x_max.len()));
        }
        for (which, lo, hi) in [
            ("input", &self.u_min, &self.u_max),
            ("state", &self.x_min, &self.x_max),
        ] {
            for (index, (&min, &max)) in lo.iter().zip(hi.iter()).enumerate() {
                #[allow(clippy::neg_cmp_op_on_partial_ord)]
                if !(min <= max) {
                    return Err(ConfigError::InvalidBounds {
                        which,
                        index,
                        min,
                        max,
                    });
                }
            }
        }
        Ok(())
    }

    /// Check the vectors against the problem dimensions.
    pub fn check_dims(&self, nx: usize, nu: usize) -> Result<(), ConfigError> {
        if self.u_min.len() != nu {
            return Err(vector_mismatch("u_min", nu, self.u_min.len()));
        }
        if self.x_min.len() != nx {
            return Err(vector_mismatch("x_min", nx, self.x_min.len()));
        }
        Ok(())
    }
}

fn vector_mismatch(what: &'static str, expected: usize, got: usize) -> ConfigError {
    ConfigError::DimensionMismatch {
        what,
        expected_rows: expected,
        expected_cols: 1,
        rows: got,
        cols: 1,
    }
}

// ---------------------------------------------------------------------------
// Reference
// ---------------------------------------------------------------------------

/// Goal state and reference input the controller regulates towards.
///
/// In error coordinates both are zero; a hover controller working in
/// deviation coordinates keeps them that way and folds the hover thrust into
/// the plant side.
#[derive(Clone, Debug, PartialEq)]
pub struct Reference {
    pub state: DVector<f64>,
    pub input: DVector<f64>,
}

impl Reference {
    pub fn new(state: DVector<f64>, input: DVector<f64>) -> Self {
        Self { state, input }
    }

    pub fn zeros(nx: usize, nu: usize) -> Self {
        Self {
            state: DVector::zeros(nx),
            input: DVector::zeros(nu),
        }
    }
}

// ---------------------------------------------------------------------------
// Solve results
// ---------------------------------------------------------------------------

/// How an ADMM solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    /// Both residuals met their tolerances.
    Converged,
    /// The iteration cap was hit. The trajectory is a best-effort iterate
    /// and still usable as a control command.
    MaxIterations,
}

/// Primal and dual residuals of one ADMM iterate (∞-norms).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Residuals {
    pub primal: f64,
    pub dual: f64,
}

/// Sum of positive bound excess of the raw primal trajectories.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ConstraintViolation {
    pub input: f64,
    pub state: f64,
}

impl ConstraintViolation {
    pub fn total(&self) -> f64 {
        self.input + self.state
    }
}

/// Summary of one `solve` call. Trajectories stay in the solver and are read
/// through its accessors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveOutcome {
    pub status: SolveStatus,
    /// Iterations actually run.
    pub iterations: usize,
    /// Residuals at the last check.
    pub residuals: Residuals,
    /// Penalty the solve ran with.
    pub rho: f64,
    pub violation: ConstraintViolation,
}

impl SolveOutcome {
    pub fn converged(&self) -> bool {
        self.status == SolveStatus::Converged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_problem(horizon: usize) -> Result<ProblemDefinition, ConfigError> {
        ProblemDefinition::new(
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            DMatrix::identity(2, 2),
            DMatrix::identity(1, 1),
            horizon,
        )
    }

    #[test]
    fn valid_problem_dimensions() {
        let problem = identity_problem(5).unwrap();
        assert_eq!(problem.nx(), 2);
        assert_eq!(problem.nu(), 1);
        assert_eq!(problem.horizon(), 5);
    }

    #[test]
    fn horizon_below_two_rejected() {
        assert!(matches!(
            identity_problem(1),
            Err(ConfigError::InvalidHorizon(1))
        ));
    }

    #[test]
    fn wrong_b_shape_rejected() {
        let result = ProblemDefinition::new(
            DMatrix::identity(2, 2),
            DMatrix::zeros(3, 1),
            DMatrix::identity(2, 2),
            DMatrix::identity(1, 1),
            5,
        );
        assert!(matches!(
            result,
            Err(ConfigError::DimensionMismatch { what: "B", .. })
        ));
    }

    #[test]
    fn asymmetric_q_rejected() {
        let result = ProblemDefinition::new(
            DMatrix::identity(2, 2),
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.0, 1.0]),
            DMatrix::identity(1, 1),
            5,
        );
        assert!(matches!(result, Err(ConfigError::NotSymmetric("Q"))));
    }

    #[test]
    fn nan_in_a_rejected() {
        let mut a = DMatrix::identity(2, 2);
        a[(0, 1)] = f64::NAN;
        let result = ProblemDefinition::new(
            a,
            DMatrix::from_row_slice(2, 1, &[0.0, 1.0]),
            DMatrix::identity(2, 2),
            DMatrix::identity(1, 1),
            5,
        );
        assert!(matches!(result, Err(ConfigError::NonFinite("A"))));
    }

    #[test]
    fn inverted_bounds_rejected() {
        let result = Bounds::new(
            DVector::from_vec(vec![-1.0, 2.0]),
            DVector::from_vec(vec![1.0, 1.0]),
            DVector::from_element(3, -1.0),
            DVector::from_element(3, 1.0),
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidBounds {
                which: "input",
                index: 1,
                ..
            })
        ));
    }

    #[test]
    fn nan_bound_rejected() {
        let result = Bounds::uniform(2, 1, (-1.0, 1.0), (f64::NAN, 1.0));
        assert!(matches!(
            result,
            Err(ConfigError::InvalidBounds { which: "state", .. })
        ));
    }

    #[test]
    fn unbounded_is_valid() {
        let bounds = Bounds::unbounded(3, 2);
        assert!(bounds.validate().is_ok());
        assert!(bounds.check_dims(3, 2).is_ok());
        assert!(bounds.check_dims(2, 2).is_err());
    }

    #[test]
    fn violation_total() {
        let v = ConstraintViolation {
            input: 0.25,
            state: 0.5,
        };
        assert!((v.total() - 0.75).abs() < 1e-15);
    }
}
