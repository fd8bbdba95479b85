//! ADMM solver for box-constrained linear MPC.
//!
//! Splits the horizon problem into an unconstrained LQ tracking step, solved
//! with the precomputed [`Cache`], and a projection onto the box bounds:
//!
//! ```text
//! minimise   Σ (x_k − x̄_k)ᵀQ(x_k − x̄_k) + (u_k − ū_k)ᵀR(u_k − ū_k)
//! subject to x_{k+1} = A x_k + B u_k
//!            u_min ≤ v_k ≤ u_max,  x_min ≤ z_k ≤ x_max
//!            u_k = v_k,  x_k = z_k
//! ```
//!
//! Slack naming: `v` input slack, `z` state slack, `g` input dual, `y` state
//! dual (all scaled duals). Every buffer is sized at construction; `solve`
//! only writes into them.

use kestrel_core::{ConfigError, SolveError, SolverSettings};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, trace, warn};

use crate::cache::Cache;
use crate::types::{
    Bounds, ConstraintViolation, ProblemDefinition, Reference, Residuals, SolveOutcome,
    SolveStatus,
};

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

/// Trajectories, slacks, duals and Riccati terms for one horizon.
#[derive(Clone, Debug)]
struct Workspace {
    x: DMatrix<f64>,
    u: DMatrix<f64>,
    /// State slack.
    z: DMatrix<f64>,
    /// Input slack.
    v: DMatrix<f64>,
    /// State dual.
    y: DMatrix<f64>,
    /// Input dual.
    g: DMatrix<f64>,
    z_prev: DMatrix<f64>,
    v_prev: DMatrix<f64>,
    q: DMatrix<f64>,
    r: DMatrix<f64>,
    p: DMatrix<f64>,
    d: DMatrix<f64>,
    x_ref: DMatrix<f64>,
    u_ref: DMatrix<f64>,
    x_tmp: DVector<f64>,
    u_tmp: DVector<f64>,
}

impl Workspace {
    fn new(nx: usize, nu: usize, n: usize) -> Self {
        Self {
            x: DMatrix::zeros(nx, n),
            u: DMatrix::zeros(nu, n - 1),
            z: DMatrix::zeros(nx, n),
            v: DMatrix::zeros(nu, n - 1),
            y: DMatrix::zeros(nx, n),
            g: DMatrix::zeros(nu, n - 1),
            z_prev: DMatrix::zeros(nx, n),
            v_prev: DMatrix::zeros(nu, n - 1),
            q: DMatrix::zeros(nx, n),
            r: DMatrix::zeros(nu, n - 1),
            p: DMatrix::zeros(nx, n),
            d: DMatrix::zeros(nu, n - 1),
            x_ref: DMatrix::zeros(nx, n),
            u_ref: DMatrix::zeros(nu, n - 1),
            x_tmp: DVector::zeros(nx),
            u_tmp: DVector::zeros(nu),
        }
    }

    fn horizon(&self) -> usize {
        self.x.ncols()
    }

    /// Riccati backward pass for the affine terms `d_k` and `p_k`.
    fn backward_pass(&mut self, cache: &Cache, b: &DMatrix<f64>) {
        for k in (0..self.horizon() - 1).rev() {
            // d_k = C1 (Bᵀ p_{k+1} + r_k)
            self.u_tmp.copy_from(&self.r.column(k));
            self.u_tmp.gemv_tr(1.0, b, &self.p.column(k + 1), 1.0);
            self.d.column_mut(k).gemv(1.0, &cache.c1, &self.u_tmp, 0.0);

            // p_k = q_k + C2ᵀ p_{k+1} − Kinfᵀ r_k
            self.x_tmp.copy_from(&self.q.column(k));
            self.x_tmp.gemv_tr(1.0, &cache.c2, &self.p.column(k + 1), 1.0);
            self.x_tmp.gemv_tr(-1.0, &cache.kinf, &self.r.column(k), 1.0);
            self.p.column_mut(k).copy_from(&self.x_tmp);
        }
    }

    /// Roll the feedback policy out from `x_0`.
    fn forward_pass(&mut self, cache: &Cache, a: &DMatrix<f64>, b: &DMatrix<f64>) {
        for k in 0..self.horizon() - 1 {
            let mut u_k = self.u.column_mut(k);
            u_k.gemv(-1.0, &cache.kinf, &self.x.column(k), 0.0);
            u_k.axpy(-1.0, &self.d.column(k), 1.0);

            self.x_tmp.gemv(1.0, a, &self.x.column(k), 0.0);
            self.x_tmp.gemv(1.0, b, &self.u.column(k), 1.0);
            self.x.column_mut(k + 1).copy_from(&self.x_tmp);
        }
    }

    fn primal_is_finite(&self) -> bool {
        self.x.iter().chain(self.u.iter()).all(|v| v.is_finite())
    }

    /// Project primal plus dual onto the box.
    fn update_slack(&mut self, bounds: &Bounds) {
        project(&mut self.v, &self.u, &self.g, &bounds.u_min, &bounds.u_max);
        project(&mut self.z, &self.x, &self.y, &bounds.x_min, &bounds.x_max);
    }

    fn update_dual(&mut self) {
        self.g += &self.u;
        self.g -= &self.v;
        self.y += &self.x;
        self.y -= &self.z;
    }

    /// Linear cost terms seen by the next backward pass.
    fn update_linear_cost(&mut self, problem: &ProblemDefinition, cache: &Cache) {
        let rho = cache.rho;
        let n = self.horizon();
        for k in 0..n - 1 {
            // r_k = −R ū_k − ρ(v_k − g_k)
            let mut r_k = self.r.column_mut(k);
            r_k.gemv(-1.0, &problem.r, &self.u_ref.column(k), 0.0);
            r_k.axpy(-rho, &self.v.column(k), 1.0);
            r_k.axpy(rho, &self.g.column(k), 1.0);
        }
        for k in 0..n {
            // q_k = −Q x̄_k − ρ(z_k − y_k)
            let mut q_k = self.q.column_mut(k);
            q_k.gemv(-1.0, &problem.q, &self.x_ref.column(k), 0.0);
            q_k.axpy(-rho, &self.z.column(k), 1.0);
            q_k.axpy(rho, &self.y.column(k), 1.0);
        }
        // p_N = −Pinf x̄_N − ρ(z_N − y_N)
        let last = n - 1;
        let mut p_n = self.p.column_mut(last);
        p_n.gemv(-1.0, &cache.pinf, &self.x_ref.column(last), 0.0);
        p_n.axpy(-rho, &self.z.column(last), 1.0);
        p_n.axpy(rho, &self.y.column(last), 1.0);
    }

    fn residuals(&self, rho: f64) -> Residuals {
        let primal = max_abs_diff(&self.u, &self.v).max(max_abs_diff(&self.x, &self.z));
        let dual =
            rho * max_abs_diff(&self.v, &self.v_prev).max(max_abs_diff(&self.z, &self.z_prev));
        Residuals { primal, dual }
    }

    fn converged(&self, residuals: &Residuals, settings: &SolverSettings, rho: f64) -> bool {
        let primal_scale = self
            .x
            .amax()
            .max(self.u.amax())
            .max(self.z.amax())
            .max(self.v.amax());
        let dual_scale = rho * self.y.amax().max(self.g.amax());
        residuals.primal <= settings.abs_tol + settings.rel_tol * primal_scale
            && residuals.dual <= settings.abs_tol + settings.rel_tol * dual_scale
    }

    fn violation(&self, bounds: &Bounds) -> ConstraintViolation {
        ConstraintViolation {
            input: bound_excess(&self.u, &bounds.u_min, &bounds.u_max),
            state: bound_excess(&self.x, &bounds.x_min, &bounds.x_max),
        }
    }

    fn reset(&mut self) {
        for m in [
            &mut self.x,
            &mut self.u,
            &mut self.z,
            &mut self.v,
            &mut self.y,
            &mut self.g,
            &mut self.z_prev,
            &mut self.v_prev,
            &mut self.q,
            &mut self.r,
            &mut self.p,
            &mut self.d,
        ] {
            m.fill(0.0);
        }
    }
}

/// `slack = clip(primal + dual, lo, hi)` with per-row bounds.
fn project(
    slack: &mut DMatrix<f64>,
    primal: &DMatrix<f64>,
    dual: &DMatrix<f64>,
    lo: &DVector<f64>,
    hi: &DVector<f64>,
) {
    for k in 0..slack.ncols() {
        for i in 0..slack.nrows() {
            slack[(i, k)] = (primal[(i, k)] + dual[(i, k)]).max(lo[i]).min(hi[i]);
        }
    }
}

fn max_abs_diff(a: &DMatrix<f64>, b: &DMatrix<f64>) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}

fn bound_excess(m: &DMatrix<f64>, lo: &DVector<f64>, hi: &DVector<f64>) -> f64 {
    let mut total = 0.0;
    for k in 0..m.ncols() {
        for i in 0..m.nrows() {
            let value = m[(i, k)];
            total += (value - hi[i]).max(0.0) + (lo[i] - value).max(0.0);
        }
    }
    total
}

// ---------------------------------------------------------------------------
// AdmmSolver
// ---------------------------------------------------------------------------

/// Warm-started ADMM solver over a fixed horizon.
///
/// Bounds must be set before the first [`solve`](Self::solve). Trajectory
/// state persists between solves and is only cleared by
/// [`reset`](Self::reset).
#[derive(Clone, Debug)]
pub struct AdmmSolver {
    problem: ProblemDefinition,
    cache: Cache,
    settings: SolverSettings,
    bounds: Option<Bounds>,
    work: Workspace,
    log: Vec<Residuals>,
}

impl AdmmSolver {
    /// Allocate every buffer for the problem's dimensions.
    pub fn new(
        problem: ProblemDefinition,
        cache: Cache,
        settings: SolverSettings,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        check_cache_shape(&problem, &cache)?;
        let work = Workspace::new(problem.nx(), problem.nu(), problem.horizon());
        Ok(Self {
            log: Vec::with_capacity(settings.max_iter),
            problem,
            cache,
            settings,
            bounds: None,
            work,
        })
    }

    /// Install per-step box bounds, broadcast over the horizon.
    pub fn set_bounds(
        &mut self,
        u_max: DVector<f64>,
        u_min: DVector<f64>,
        x_max: DVector<f64>,
        x_min: DVector<f64>,
    ) -> Result<(), ConfigError> {
        self.install_bounds(Bounds::new(u_min, u_max, x_min, x_max)?)
    }

    /// Same as [`set_bounds`](Self::set_bounds) from a prebuilt [`Bounds`].
    pub fn install_bounds(&mut self, bounds: Bounds) -> Result<(), ConfigError> {
        bounds.validate()?;
        bounds.check_dims(self.problem.nx(), self.problem.nu())?;
        self.bounds = Some(bounds);
        Ok(())
    }

    /// Regulate towards a constant goal state and reference input.
    pub fn set_reference(&mut self, reference: &Reference) -> Result<(), ConfigError> {
        let nx = self.problem.nx();
        let nu = self.problem.nu();
        if reference.state.len() != nx || reference.input.len() != nu {
            return Err(ConfigError::DimensionMismatch {
                what: "reference",
                expected_rows: nx,
                expected_cols: nu,
                rows: reference.state.len(),
                cols: reference.input.len(),
            });
        }
        for mut column in self.work.x_ref.column_iter_mut() {
            column.copy_from(&reference.state);
        }
        for mut column in self.work.u_ref.column_iter_mut() {
            column.copy_from(&reference.input);
        }
        Ok(())
    }

    /// Solve from the warm start `x_init` (n×N) and `u_init` (m×(N−1)).
    ///
    /// Column 0 of `x_init` is the measured initial state and stays fixed;
    /// the rest seeds the slacks. Hitting the iteration cap returns
    /// [`SolveStatus::MaxIterations`] with the last iterate.
    pub fn solve(
        &mut self,
        x_init: &DMatrix<f64>,
        u_init: &DMatrix<f64>,
    ) -> Result<SolveOutcome, SolveError> {
        let Some(bounds) = self.bounds.as_ref() else {
            return Err(SolveError::BoundsNotSet);
        };
        check_warm_start("x_init", x_init, &self.work.x)?;
        check_warm_start("u_init", u_init, &self.work.u)?;
        if !x_init.iter().chain(u_init.iter()).all(|v| v.is_finite()) {
            return Err(SolveError::NonFiniteInput);
        }

        let work = &mut self.work;
        let cache = &self.cache;
        let problem = &self.problem;
        let settings = &self.settings;
        let rho = cache.rho;

        work.x.copy_from(x_init);
        work.u.copy_from(u_init);
        work.update_slack(bounds);
        work.update_linear_cost(problem, cache);
        self.log.clear();

        let mut status = SolveStatus::MaxIterations;
        let mut iterations = settings.max_iter;
        let mut residuals = Residuals::default();

        for iter in 1..=settings.max_iter {
            work.backward_pass(cache, &problem.b);
            work.forward_pass(cache, &problem.a, &problem.b);
            if !work.primal_is_finite() {
                warn!(iteration = iter, rho, "ADMM iterate diverged");
                return Err(SolveError::NumericalDivergence { iteration: iter });
            }

            work.z_prev.copy_from(&work.z);
            work.v_prev.copy_from(&work.v);
            work.update_slack(bounds);
            work.update_dual();
            work.update_linear_cost(problem, cache);

            residuals = work.residuals(rho);
            self.log.push(residuals);
            trace!(iter, primal = residuals.primal, dual = residuals.dual, "ADMM iteration");

            if iter % settings.check_every == 0 && work.converged(&residuals, settings, rho) {
                status = SolveStatus::Converged;
                iterations = iter;
                break;
            }
        }

        debug!(
            ?status,
            iterations,
            rho,
            primal = residuals.primal,
            dual = residuals.dual,
            "ADMM solve finished"
        );

        Ok(SolveOutcome {
            status,
            iterations,
            residuals,
            rho,
            violation: work.violation(bounds),
        })
    }

    /// Zero every trajectory, slack and dual buffer.
    pub fn reset(&mut self) {
        self.work.reset();
        self.log.clear();
    }

    /// Swap in a freshly computed cache (exact recache).
    pub fn replace_cache(&mut self, cache: Cache) -> Result<(), ConfigError> {
        check_cache_shape(&self.problem, &cache)?;
        self.cache = cache;
        Ok(())
    }

    pub const fn problem(&self) -> &ProblemDefinition {
        &self.problem
    }

    pub const fn cache(&self) -> &Cache {
        &self.cache
    }

    /// Mutable cache access for in-place first-order updates.
    pub const fn cache_mut(&mut self) -> &mut Cache {
        &mut self.cache
    }

    /// Split borrow for updating the cache against the problem.
    pub(crate) const fn problem_and_cache_mut(&mut self) -> (&ProblemDefinition, &mut Cache) {
        (&self.problem, &mut self.cache)
    }

    pub const fn rho(&self) -> f64 {
        self.cache.rho
    }

    pub const fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    pub const fn bounds(&self) -> Option<&Bounds> {
        self.bounds.as_ref()
    }

    /// State trajectory x (n×N).
    pub const fn states(&self) -> &DMatrix<f64> {
        &self.work.x
    }

    /// Input trajectory u (m×(N−1)).
    pub const fn inputs(&self) -> &DMatrix<f64> {
        &self.work.u
    }

    /// Input slack v, always within the input bounds.
    pub const fn input_slack(&self) -> &DMatrix<f64> {
        &self.work.v
    }

    /// State slack z, always within the state bounds.
    pub const fn state_slack(&self) -> &DMatrix<f64> {
        &self.work.z
    }

    pub const fn input_dual(&self) -> &DMatrix<f64> {
        &self.work.g
    }

    pub const fn state_dual(&self) -> &DMatrix<f64> {
        &self.work.y
    }

    /// Per-step goal states (n×N).
    pub const fn state_reference(&self) -> &DMatrix<f64> {
        &self.work.x_ref
    }

    /// Per-step reference inputs (m×(N−1)).
    pub const fn input_reference(&self) -> &DMatrix<f64> {
        &self.work.u_ref
    }

    /// First input of the current plan, the one applied to the plant.
    pub fn first_input(&self) -> DVector<f64> {
        self.work.u.column(0).clone_owned()
    }

    /// Residuals of every iteration of the last solve.
    pub fn iteration_log(&self) -> &[Residuals] {
        &self.log
    }
}

fn check_cache_shape(problem: &ProblemDefinition, cache: &Cache) -> Result<(), ConfigError> {
    let (rows, cols) = cache.kinf.shape();
    if rows == problem.nu() && cols == problem.nx() {
        Ok(())
    } else {
        Err(ConfigError::DimensionMismatch {
            what: "Kinf",
            expected_rows: problem.nu(),
            expected_cols: problem.nx(),
            rows,
            cols,
        })
    }
}

fn check_warm_start(
    what: &'static str,
    given: &DMatrix<f64>,
    buffer: &DMatrix<f64>,
) -> Result<(), SolveError> {
    if given.shape() == buffer.shape() {
        Ok(())
    } else {
        Err(SolveError::WarmStartShape {
            what,
            expected_rows: buffer.nrows(),
            expected_cols: buffer.ncols(),
            rows: given.nrows(),
            cols: given.ncols(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_RICCATI_SWEEPS;
    use approx::assert_relative_eq;

    const N: usize = 20;

    fn double_integrator() -> ProblemDefinition {
        let dt = 0.1;
        ProblemDefinition::new(
            DMatrix::from_row_slice(2, 2, &[1.0, dt, 0.0, 1.0]),
            DMatrix::from_row_slice(2, 1, &[0.5 * dt * dt, dt]),
            DMatrix::from_diagonal(&DVector::from_vec(vec![10.0, 1.0])),
            DMatrix::from_element(1, 1, 0.1),
            N,
        )
        .unwrap()
    }

    fn solver(rho: f64) -> AdmmSolver {
        let problem = double_integrator();
        let cache = Cache::compute(&problem, rho, DEFAULT_RICCATI_SWEEPS).unwrap();
        AdmmSolver::new(problem, cache, SolverSettings::default()).unwrap()
    }

    fn warm_start(x0: &[f64]) -> (DMatrix<f64>, DMatrix<f64>) {
        let mut x = DMatrix::zeros(2, N);
        x.column_mut(0).copy_from_slice(x0);
        (x, DMatrix::zeros(1, N - 1))
    }

    fn bounded(mut s: AdmmSolver, u_abs: f64) -> AdmmSolver {
        s.set_bounds(
            DVector::from_element(1, u_abs),
            DVector::from_element(1, -u_abs),
            DVector::from_element(2, 100.0),
            DVector::from_element(2, -100.0),
        )
        .unwrap();
        s
    }

    #[test]
    fn solve_without_bounds_fails() {
        let mut s = solver(1.0);
        let (x, u) = warm_start(&[1.0, 0.0]);
        assert_eq!(s.solve(&x, &u), Err(SolveError::BoundsNotSet));
    }

    #[test]
    fn wrong_warm_start_shape_rejected() {
        let mut s = bounded(solver(1.0), 10.0);
        let x = DMatrix::zeros(2, N - 1);
        let u = DMatrix::zeros(1, N - 1);
        assert!(matches!(
            s.solve(&x, &u),
            Err(SolveError::WarmStartShape { what: "x_init", .. })
        ));
    }

    #[test]
    fn nan_warm_start_rejected() {
        let mut s = bounded(solver(1.0), 10.0);
        let (mut x, u) = warm_start(&[1.0, 0.0]);
        x[(1, 3)] = f64::NAN;
        assert_eq!(s.solve(&x, &u), Err(SolveError::NonFiniteInput));
    }

    #[test]
    fn inverted_bounds_rejected() {
        let mut s = solver(1.0);
        let result = s.set_bounds(
            DVector::from_element(1, -1.0),
            DVector::from_element(1, 1.0),
            DVector::from_element(2, 1.0),
            DVector::from_element(2, -1.0),
        );
        assert!(matches!(result, Err(ConfigError::InvalidBounds { .. })));
        assert!(s.bounds().is_none());
    }

    #[test]
    fn wrong_bound_dimension_rejected() {
        let mut s = solver(1.0);
        let result = s.install_bounds(Bounds::unbounded(3, 1));
        assert!(matches!(result, Err(ConfigError::DimensionMismatch { .. })));
    }

    #[test]
    fn unconstrained_solve_converges_and_regulates() {
        let mut s = bounded(solver(1.0), 1e3);
        let (x, u) = warm_start(&[1.0, 0.0]);
        let outcome = s.solve(&x, &u).unwrap();

        assert!(outcome.converged());
        assert!(outcome.iterations <= 100);
        // Pushes towards the origin: negative initial force.
        assert!(s.first_input()[0] < 0.0);
        // Dynamics hold exactly along the returned plan.
        let a = s.problem().a().clone();
        let b = s.problem().b().clone();
        for k in 0..N - 1 {
            let next = &a * s.states().column(k) + &b * s.inputs().column(k);
            assert_relative_eq!(next, s.states().column(k + 1).clone_owned(), epsilon = 1e-12);
        }
        assert_relative_eq!(s.states()[(0, 0)], 1.0);
        assert_eq!(outcome.violation, ConstraintViolation::default());
    }

    #[test]
    fn slacks_respect_bounds() {
        let mut s = bounded(solver(5.0), 0.5);
        let (x, u) = warm_start(&[3.0, 1.0]);
        s.solve(&x, &u).unwrap();
        assert!(s.input_slack().iter().all(|v| (-0.5..=0.5).contains(v)));
        assert!(s.state_slack().iter().all(|v| (-100.0..=100.0).contains(v)));
    }

    #[test]
    fn active_input_bound_is_respected_at_convergence() {
        let mut s = bounded(solver(5.0), 0.5);
        s.settings.max_iter = 2000;
        s.log = Vec::with_capacity(2000);
        let (x, u) = warm_start(&[3.0, 1.0]);
        let outcome = s.solve(&x, &u).unwrap();
        assert!(outcome.converged());
        // The unconstrained answer would push much harder than 0.5.
        assert!(s.first_input()[0] < -0.45);
        assert!(s.inputs().iter().all(|v| v.abs() <= 0.5 + 1e-2));
        assert!(s.input_dual().amax() > 0.0);
    }

    #[test]
    fn running_minimum_residual_reaches_tolerance() {
        let mut s = bounded(solver(5.0), 0.5);
        s.settings.max_iter = 2000;
        s.log = Vec::with_capacity(2000);
        let (x, u) = warm_start(&[3.0, 1.0]);
        let outcome = s.solve(&x, &u).unwrap();
        assert!(outcome.converged());

        let log = s.iteration_log();
        assert_eq!(log.len(), outcome.iterations);
        let min_primal = log.iter().map(|r| r.primal).fold(f64::INFINITY, f64::min);
        let min_dual = log.iter().map(|r| r.dual).fold(f64::INFINITY, f64::min);

        let settings = s.settings();
        let primal_scale = s
            .states()
            .amax()
            .max(s.inputs().amax())
            .max(s.state_slack().amax())
            .max(s.input_slack().amax());
        let dual_scale = s.rho() * s.state_dual().amax().max(s.input_dual().amax());
        assert!(min_primal <= settings.abs_tol + settings.rel_tol * primal_scale);
        assert!(min_dual <= settings.abs_tol + settings.rel_tol * dual_scale);

        // Well below where the first iterations started.
        let early = log[..5].iter().map(|r| r.primal.max(r.dual)).fold(0.0, f64::max);
        assert!(min_primal.max(min_dual) < 1e-2 * early);
    }

    #[test]
    fn iteration_cap_reports_best_effort() {
        let mut s = bounded(solver(5.0), 0.5);
        s.settings.max_iter = 3;
        let (x, u) = warm_start(&[3.0, 1.0]);
        let outcome = s.solve(&x, &u).unwrap();
        assert_eq!(outcome.status, SolveStatus::MaxIterations);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(s.iteration_log().len(), 3);
        assert!(s.inputs().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn warm_started_resolve_is_cheaper() {
        let mut s = bounded(solver(1.0), 1e3);
        let (x, u) = warm_start(&[1.0, 0.0]);
        let cold = s.solve(&x, &u).unwrap();
        let x_warm = s.states().clone();
        let u_warm = s.inputs().clone();
        let warm = s.solve(&x_warm, &u_warm).unwrap();
        assert!(warm.converged());
        assert!(warm.iterations < cold.iterations);
    }

    #[test]
    fn reference_shifts_the_equilibrium() {
        let mut s = bounded(solver(1.0), 1e3);
        s.set_reference(&Reference::new(
            DVector::from_vec(vec![1.0, 0.0]),
            DVector::zeros(1),
        ))
        .unwrap();
        let (x, u) = warm_start(&[1.0, 0.0]);
        let outcome = s.solve(&x, &u).unwrap();
        assert!(outcome.converged());
        // Already at the goal: nothing to do.
        assert!(s.first_input()[0].abs() < 2e-2);
        assert!(s.states().row(0).iter().all(|p| (p - 1.0).abs() < 2e-2));
    }

    #[test]
    fn reference_dimension_checked() {
        let mut s = solver(1.0);
        let result = s.set_reference(&Reference::zeros(3, 1));
        assert!(matches!(result, Err(ConfigError::DimensionMismatch { .. })));
    }

    #[test]
    fn divergent_cache_is_reported() {
        let mut s = solver(1.0);
        s.install_bounds(Bounds::unbounded(2, 1)).unwrap();
        s.cache_mut().kinf.fill(f64::NAN);
        let (x, u) = warm_start(&[1.0, 0.0]);
        assert_eq!(
            s.solve(&x, &u),
            Err(SolveError::NumericalDivergence { iteration: 1 })
        );
    }

    #[test]
    fn reset_clears_state() {
        let mut s = bounded(solver(1.0), 1e3);
        let (x, u) = warm_start(&[1.0, 0.0]);
        s.solve(&x, &u).unwrap();
        s.reset();
        assert!(s.states().iter().all(|v| *v == 0.0));
        assert!(s.input_dual().iter().all(|v| *v == 0.0));
        assert!(s.iteration_log().is_empty());
    }
}
