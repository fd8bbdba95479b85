//! Stacked KKT view of an ADMM iterate, used to balance the penalty.
//!
//! The horizon problem is written as one QP over the interleaved decision
//! vector `w = [x_0, u_0, x_1, u_1, …, x_{N−1}]`:
//!
//! ```text
//! A_kkt = [ input identity rows       ]   (N−1)·m rows, u_k ↦ u_k
//!         [ dynamics rows [A  B  −I]  ]   (N−1)·n rows, A x_k + B u_k − x_{k+1}
//! P_kkt = blkdiag(Q, R, Q, R, …, Q)
//! ```
//!
//! The slack stacks the input slacks then the state slacks `z_0…z_{N−2}`,
//! and the dual stacks the input duals then the state duals in the same row
//! order. `A_kkt` and `P_kkt` depend only on the problem and are filled once;
//! the vectors are refilled from the solver on every
//! [`format_matrices`](KktFormat::format_matrices) call.

use nalgebra::{DMatrix, DVector};

use crate::solver::AdmmSolver;
use crate::types::ProblemDefinition;

/// Guard against dividing by an all-zero scale.
const SCALE_EPS: f64 = 1e-10;

/// Residuals of the stacked KKT system (∞-norms).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct KktResiduals {
    /// `‖A_kkt·w − z‖`
    pub primal: f64,
    /// `max(‖A_kkt·w‖, ‖z‖)`
    pub primal_scale: f64,
    /// `‖P_kkt·w + q + A_kktᵀ·y‖`
    pub dual: f64,
    /// `max(‖P_kkt·w‖, ‖A_kktᵀ·y‖, ‖q‖)`
    pub dual_scale: f64,
}

impl KktResiduals {
    pub fn normalized_primal(&self) -> f64 {
        self.primal / self.primal_scale.max(SCALE_EPS)
    }

    pub fn normalized_dual(&self) -> f64 {
        self.dual / self.dual_scale.max(SCALE_EPS)
    }

    /// Normalised primal over normalised dual.
    pub fn ratio(&self) -> f64 {
        self.normalized_primal() / self.normalized_dual().max(SCALE_EPS)
    }
}

/// Preallocated KKT matrices and vectors for one problem size.
#[derive(Clone, Debug)]
pub struct KktFormat {
    nx: usize,
    nu: usize,
    horizon: usize,
    q_weight: DMatrix<f64>,
    r_weight: DMatrix<f64>,
    a_kkt: DMatrix<f64>,
    p_kkt: DMatrix<f64>,
    w: DVector<f64>,
    z: DVector<f64>,
    y: DVector<f64>,
    q: DVector<f64>,
    aw: DVector<f64>,
    pw: DVector<f64>,
    aty: DVector<f64>,
    x_tmp: DVector<f64>,
    u_tmp: DVector<f64>,
}

impl KktFormat {
    pub fn new(problem: &ProblemDefinition) -> Self {
        let nx = problem.nx();
        let nu = problem.nu();
        let n = problem.horizon();
        let rows = (nx + nu) * (n - 1);
        let cols = nx * n + nu * (n - 1);

        let mut a_kkt = DMatrix::zeros(rows, cols);
        let mut p_kkt = DMatrix::zeros(cols, cols);
        let eye_x = DMatrix::<f64>::identity(nx, nx);
        let dyn_row0 = nu * (n - 1);
        for k in 0..n - 1 {
            let x_col = k * (nx + nu);
            let u_col = x_col + nx;
            let next_col = u_col + nu;

            a_kkt
                .view_mut((k * nu, u_col), (nu, nu))
                .fill_with_identity();

            let row = dyn_row0 + k * nx;
            a_kkt.view_mut((row, x_col), (nx, nx)).copy_from(&problem.a);
            a_kkt.view_mut((row, u_col), (nx, nu)).copy_from(&problem.b);
            a_kkt.view_mut((row, next_col), (nx, nx)).copy_from(&(-&eye_x));

            p_kkt.view_mut((x_col, x_col), (nx, nx)).copy_from(&problem.q);
            p_kkt.view_mut((u_col, u_col), (nu, nu)).copy_from(&problem.r);
        }
        let last = (n - 1) * (nx + nu);
        p_kkt.view_mut((last, last), (nx, nx)).copy_from(&problem.q);

        Self {
            nx,
            nu,
            horizon: n,
            q_weight: problem.q.clone(),
            r_weight: problem.r.clone(),
            a_kkt,
            p_kkt,
            w: DVector::zeros(cols),
            z: DVector::zeros(rows),
            y: DVector::zeros(rows),
            q: DVector::zeros(cols),
            aw: DVector::zeros(rows),
            pw: DVector::zeros(cols),
            aty: DVector::zeros(cols),
            x_tmp: DVector::zeros(nx),
            u_tmp: DVector::zeros(nu),
        }
    }

    /// Stack the solver's current iterate into `w`, `z`, `y` and `q`.
    ///
    /// `q` is the gradient of the stage cost at the iterate,
    /// `[Q(x_k − x̄_k); R(u_k − ū_k)]`, taken against the solver's bound
    /// reference.
    pub fn format_matrices(&mut self, solver: &AdmmSolver) {
        let (nx, nu, n) = (self.nx, self.nu, self.horizon);
        let x = solver.states();
        let u = solver.inputs();
        let x_ref = solver.state_reference();
        let u_ref = solver.input_reference();

        for k in 0..n {
            let x_col = k * (nx + nu);
            self.w.rows_mut(x_col, nx).copy_from(&x.column(k));
            self.x_tmp.copy_from(&x.column(k));
            self.x_tmp -= &x_ref.column(k);
            self.q
                .rows_mut(x_col, nx)
                .gemv(1.0, &self.q_weight, &self.x_tmp, 0.0);

            if k + 1 < n {
                let u_col = x_col + nx;
                self.w.rows_mut(u_col, nu).copy_from(&u.column(k));
                self.u_tmp.copy_from(&u.column(k));
                self.u_tmp -= &u_ref.column(k);
                self.q
                    .rows_mut(u_col, nu)
                    .gemv(1.0, &self.r_weight, &self.u_tmp, 0.0);
            }
        }

        let dyn_row0 = nu * (n - 1);
        let v = solver.input_slack();
        let g = solver.input_dual();
        let zs = solver.state_slack();
        let ys = solver.state_dual();
        for k in 0..n - 1 {
            self.z.rows_mut(k * nu, nu).copy_from(&v.column(k));
            self.y.rows_mut(k * nu, nu).copy_from(&g.column(k));
            let row = dyn_row0 + k * nx;
            self.z.rows_mut(row, nx).copy_from(&zs.column(k));
            self.y.rows_mut(row, nx).copy_from(&ys.column(k));
        }
    }

    /// Residuals of the last formatted iterate. Does not allocate.
    pub fn compute_residuals(&mut self) -> KktResiduals {
        self.aw.gemv(1.0, &self.a_kkt, &self.w, 0.0);
        self.pw.gemv(1.0, &self.p_kkt, &self.w, 0.0);
        self.aty.gemv_tr(1.0, &self.a_kkt, &self.y, 0.0);

        let primal = self
            .aw
            .iter()
            .zip(self.z.iter())
            .map(|(a, z)| (a - z).abs())
            .fold(0.0, f64::max);
        let dual = self
            .pw
            .iter()
            .zip(self.q.iter())
            .zip(self.aty.iter())
            .map(|((p, q), a)| (p + q + a).abs())
            .fold(0.0, f64::max);

        KktResiduals {
            primal,
            primal_scale: self.aw.amax().max(self.z.amax()),
            dual,
            dual_scale: self.pw.amax().max(self.aty.amax()).max(self.q.amax()),
        }
    }

    pub const fn a_kkt(&self) -> &DMatrix<f64> {
        &self.a_kkt
    }

    pub const fn p_kkt(&self) -> &DMatrix<f64> {
        &self.p_kkt
    }

    /// Interleaved decision vector.
    pub const fn decision(&self) -> &DVector<f64> {
        &self.w
    }

    pub const fn slack(&self) -> &DVector<f64> {
        &self.z
    }

    pub const fn dual(&self) -> &DVector<f64> {
        &self.y
    }

    pub const fn linear_cost(&self) -> &DVector<f64> {
        &self.q
    }
}
