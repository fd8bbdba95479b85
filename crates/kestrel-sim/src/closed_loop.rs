//! Receding-horizon simulation loop.
//!
//! Each step: error state against the reference → shift the previous
//! solution one step as the warm start → solve → apply the first input to
//! the plant → record diagnostics.

use kestrel_core::{KestrelError, SolveError};
use kestrel_mpc::{ConstraintViolation, Mpc, SolveStatus};
use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use crate::dynamics::Dynamics;
use crate::reference::ReferenceGenerator;
use crate::stats::RunStats;

/// Shift `x` and `u` one step earlier in place.
///
/// The final state becomes `goal` when given, otherwise a copy of the
/// previous final state; the final input repeats the previous one. The
/// caller overwrites column 0 of `x` with the measured state.
pub fn shift_warm_start(x: &mut DMatrix<f64>, u: &mut DMatrix<f64>, goal: Option<&DVector<f64>>) {
    let n = x.ncols();
    let m = u.ncols();
    for k in 0..n.saturating_sub(1) {
        x.swap_columns(k, k + 1);
    }
    if let Some(goal) = goal {
        x.set_column(n - 1, goal);
    } else if n >= 2 {
        let last = x.column(n - 2).clone_owned();
        x.set_column(n - 1, &last);
    }
    for k in 0..m.saturating_sub(1) {
        u.swap_columns(k, k + 1);
    }
    if m >= 2 {
        let last = u.column(m - 2).clone_owned();
        u.set_column(m - 1, &last);
    }
}

/// Knobs for [`run_closed_loop`].
#[derive(Clone, Debug, PartialEq)]
pub struct ClosedLoopConfig {
    /// Control steps to simulate.
    pub steps: usize,
    /// Constant external disturbance passed to the plant every step.
    pub disturbance: Option<DVector<f64>>,
}

impl Default for ClosedLoopConfig {
    fn default() -> Self {
        Self {
            steps: 100,
            disturbance: None,
        }
    }
}

/// Diagnostics of one control step.
#[derive(Clone, Debug, PartialEq)]
pub struct StepRecord {
    pub step: usize,
    /// Time at the start of the step (s).
    pub time: f64,
    pub iterations: usize,
    pub status: SolveStatus,
    /// Penalty the solve ran with.
    pub rho: f64,
    /// Distance to the reference position after the step.
    pub position_error: f64,
    /// `eᵀ Q e` of the error state the solve started from.
    pub state_cost: f64,
    /// `uᵀ R u` of the applied input.
    pub input_cost: f64,
    pub violation: ConstraintViolation,
}

/// Everything a closed-loop run produced.
#[derive(Clone, Debug, Default)]
pub struct ClosedLoopLog {
    pub records: Vec<StepRecord>,
    /// Plant states, starting with the initial state.
    pub states: Vec<DVector<f64>>,
    /// Applied inputs.
    pub inputs: Vec<DVector<f64>>,
}

impl ClosedLoopLog {
    pub fn stats(&self) -> RunStats {
        RunStats::from_records(&self.records)
    }

    /// Penalty used by each solve.
    pub fn rho_trace(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.rho).collect()
    }
}

/// Drive `plant` towards `reference` with `mpc` for `config.steps` steps.
///
/// The controller's bounds must already be installed. Iteration-cap hits
/// are logged and recorded; a non-finite stage cost aborts the run with
/// [`SolveError::NumericalDivergence`].
pub fn run_closed_loop<D, G>(
    mpc: &mut Mpc,
    plant: &D,
    reference: &G,
    x0: &DVector<f64>,
    config: &ClosedLoopConfig,
) -> Result<ClosedLoopLog, KestrelError>
where
    D: Dynamics,
    G: ReferenceGenerator,
{
    let problem = mpc.problem();
    let (nx, nu, horizon) = (problem.nx(), problem.nu(), problem.horizon());
    let q = problem.q().clone();
    let r = problem.r().clone();

    let mut x_init = DMatrix::zeros(nx, horizon);
    let mut u_init = DMatrix::zeros(nu, horizon - 1);
    let mut x = x0.clone();
    let mut log = ClosedLoopLog {
        records: Vec::with_capacity(config.steps),
        states: Vec::with_capacity(config.steps + 1),
        inputs: Vec::with_capacity(config.steps),
    };
    log.states.push(x.clone());

    for step in 0..config.steps {
        #[allow(clippy::cast_precision_loss)]
        let time = step as f64 * plant.dt();
        let x_ref = reference.reference_at(time);
        let error = plant.error_state(&x, &x_ref);

        x_init.copy_from(mpc.states());
        u_init.copy_from(mpc.inputs());
        shift_warm_start(&mut x_init, &mut u_init, None);
        x_init.set_column(0, &error);

        let outcome = mpc.solve(&x_init, &u_init)?;
        if outcome.status == SolveStatus::MaxIterations {
            warn!(
                step,
                iterations = outcome.iterations,
                primal = outcome.residuals.primal,
                dual = outcome.residuals.dual,
                "MPC hit the iteration cap"
            );
        }

        let u = mpc.first_input();
        let state_cost = error.dot(&(&q * &error));
        let input_cost = u.dot(&(&r * &u));
        if !(state_cost + input_cost).is_finite() {
            warn!(step, "non-finite stage cost, aborting run");
            return Err(SolveError::NumericalDivergence {
                iteration: outcome.iterations,
            }
            .into());
        }

        x = plant.step(&x, &u, config.disturbance.as_ref());
        let dims = plant.position_dims();
        let position_error = (x.rows(0, dims) - x_ref.rows(0, dims)).norm();
        debug!(
            step,
            iterations = outcome.iterations,
            rho = outcome.rho,
            position_error,
            "closed-loop step"
        );

        log.records.push(StepRecord {
            step,
            time,
            iterations: outcome.iterations,
            status: outcome.status,
            rho: outcome.rho,
            position_error,
            state_cost,
            input_cost,
            violation: outcome.violation,
        });
        log.states.push(x.clone());
        log.inputs.push(u);
    }

    Ok(log)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
