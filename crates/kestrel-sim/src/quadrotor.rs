//! Linearised quadrotor about hover, plus quaternion error-state helpers.
//!
//! # Error state (12)
//!
//! | Index | Quantity | Frame |
//! |-------|----------|-------|
//! | 0-2   | position `p` | world |
//! | 3-5   | attitude, Rodrigues parameters `φ` | body |
//! | 6-8   | velocity `v` | world |
//! | 9-11  | angular rate `ω` | body |
//!
//! Inputs are the four motor commands in `[0, 1]`, expressed as deviations
//! from the hover command.
//!
//! # Full state (13)
//!
//! `[p (3), q (w, x, y, z), v (3), ω (3)]`, the representation a nonlinear
//! rigid-body model would carry. [`quaternion_error_state`] reduces it to the
//! error state above.

use kestrel_core::ConfigError;
use nalgebra::{DMatrix, DVector, Quaternion, SVector, UnitQuaternion, Vector3};

use crate::dynamics::Dynamics;

/// Error-state dimension.
pub const STATE_DIM: usize = 12;
/// Motor count.
pub const INPUT_DIM: usize = 4;
/// Full-state dimension with a unit quaternion attitude.
pub const FULL_STATE_DIM: usize = 13;

/// Motor sign patterns for roll, pitch and yaw torque (X configuration).
const ROLL_SIGNS: [f64; 4] = [-1.0, -1.0, 1.0, 1.0];
const PITCH_SIGNS: [f64; 4] = [-1.0, 1.0, 1.0, -1.0];
const YAW_SIGNS: [f64; 4] = [-1.0, 1.0, -1.0, 1.0];

// ---------------------------------------------------------------------------
// QuadrotorParams
// ---------------------------------------------------------------------------

/// Physical parameters of an X-configuration quadrotor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuadrotorParams {
    /// Mass (kg).
    pub mass: f64,
    /// Principal moments of inertia (kg·m²).
    pub inertia: Vector3<f64>,
    pub gravity: f64,
    /// Thrust per unit motor command (N).
    pub thrust_coefficient: f64,
    /// Yaw torque per unit thrust (m).
    pub torque_ratio: f64,
    /// Moment arm of each motor about the roll and pitch axes (m).
    pub arm_length: f64,
}

impl QuadrotorParams {
    /// Bitcraze Crazyflie 2.x.
    pub fn crazyflie() -> Self {
        Self {
            mass: 0.035,
            inertia: Vector3::new(16.6e-6, 16.6e-6, 29.3e-6),
            gravity: 9.81,
            thrust_coefficient: 2.245_365e-6 * 65_535.0,
            torque_ratio: 0.0008,
            arm_length: 0.046 / std::f64::consts::SQRT_2,
        }
    }

    /// Per-motor command that exactly cancels gravity.
    pub fn hover_thrust(&self) -> f64 {
        self.mass * self.gravity / (4.0 * self.thrust_coefficient)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("mass", self.mass),
            ("inertia.x", self.inertia.x),
            ("inertia.y", self.inertia.y),
            ("inertia.z", self.inertia.z),
            ("gravity", self.gravity),
            ("thrust_coefficient", self.thrust_coefficient),
            ("arm_length", self.arm_length),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::invalid(field, format!("must be positive, got {value}")));
            }
        }
        if !self.torque_ratio.is_finite() {
            return Err(ConfigError::NonFinite("torque_ratio"));
        }
        Ok(())
    }
}

impl Default for QuadrotorParams {
    fn default() -> Self {
        Self::crazyflie()
    }
}

// ---------------------------------------------------------------------------
// Continuous and discrete models
// ---------------------------------------------------------------------------

/// Continuous-time hover linearisation `ẋ = A_c x + B_c u`.
///
/// Small-angle attitude kinematics give `φ̇ = ω / 2`; tilting by `φ` turns
/// the hover thrust into horizontal acceleration `±2g·φ`.
pub fn continuous_dynamics(params: &QuadrotorParams) -> (DMatrix<f64>, DMatrix<f64>) {
    let mut a_c = DMatrix::zeros(STATE_DIM, STATE_DIM);
    let mut b_c = DMatrix::zeros(STATE_DIM, INPUT_DIM);
    let g = params.gravity;

    for i in 0..3 {
        // ṗ = v
        a_c[(i, 6 + i)] = 1.0;
        // φ̇ = ω / 2
        a_c[(3 + i, 9 + i)] = 0.5;
    }
    a_c[(6, 4)] = 2.0 * g;
    a_c[(7, 3)] = -2.0 * g;

    let kt = params.thrust_coefficient;
    let km = kt * params.torque_ratio;
    let el = params.arm_length;
    for j in 0..INPUT_DIM {
        b_c[(8, j)] = kt / params.mass;
        b_c[(9, j)] = el * kt * ROLL_SIGNS[j] / params.inertia.x;
        b_c[(10, j)] = el * kt * PITCH_SIGNS[j] / params.inertia.y;
        b_c[(11, j)] = km * YAW_SIGNS[j] / params.inertia.z;
    }

    (a_c, b_c)
}

/// Series terms summed before the doubling phase.
const MAX_SERIES_TERMS: u32 = 24;

/// Zero-order-hold discretisation of `ẋ = A_c x + B_c u` over `dt`:
///
/// ```text
/// A_d = e^{A_c dt}        B_d = ∫₀^dt e^{A_c s} ds · B_c
/// ```
///
/// Both series are summed over a sub-step `h = dt / 2^s` with
/// `‖A_c h‖∞ ≤ 1/2`, then doubled back to `dt` with `A(2h) = A(h)²` and
/// `B(2h) = A(h)·B(h) + B(h)`. The hover model is nilpotent, so its series
/// terminates after a few terms and the result is exact.
pub fn zero_order_hold(
    a_c: &DMatrix<f64>,
    b_c: &DMatrix<f64>,
    dt: f64,
) -> (DMatrix<f64>, DMatrix<f64>) {
    let n = a_c.nrows();
    let norm = inf_norm(a_c);
    let mut h = dt;
    let mut doublings = 0;
    while norm * h > 0.5 && doublings < 64 {
        h *= 0.5;
        doublings += 1;
    }

    let a_h = a_c * h;
    // term = (A h)^k / k!, phi = Σ (A h)^k / (k + 1)!
    let mut term = DMatrix::identity(n, n);
    let mut a_d = term.clone();
    let mut phi = term.clone();
    for k in 1..=MAX_SERIES_TERMS {
        term = &term * &a_h / f64::from(k);
        if term.amax() <= f64::EPSILON * a_d.amax() {
            break;
        }
        a_d += &term;
        phi += &term / f64::from(k + 1);
    }
    let mut b_d = phi * b_c * h;

    for _ in 0..doublings {
        b_d = &a_d * &b_d + &b_d;
        a_d = &a_d * &a_d;
    }
    (a_d, b_d)
}

fn inf_norm(m: &DMatrix<f64>) -> f64 {
    m.row_iter()
        .map(|row| row.iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0, f64::max)
}

// ---------------------------------------------------------------------------
// LinearQuadrotor
// ---------------------------------------------------------------------------

/// Discrete hover model in deviation coordinates.
///
/// The state is the 12-element error state about hover at the origin and
/// the input is the motor command minus [`hover_thrust`](Self::hover_thrust).
/// The plant is exactly the model the controller is built on.
#[derive(Clone, Debug)]
pub struct LinearQuadrotor {
    params: QuadrotorParams,
    dt: f64,
    a: DMatrix<f64>,
    b: DMatrix<f64>,
}

impl LinearQuadrotor {
    /// Default sample period (s).
    pub const DEFAULT_DT: f64 = 0.05;

    pub fn new(params: QuadrotorParams, dt: f64) -> Result<Self, ConfigError> {
        params.validate()?;
        if !(dt.is_finite() && dt > 0.0) {
            return Err(ConfigError::invalid("dt", format!("must be positive, got {dt}")));
        }
        let (a_c, b_c) = continuous_dynamics(&params);
        let (a, b) = zero_order_hold(&a_c, &b_c, dt);
        Ok(Self { params, dt, a, b })
    }

    /// Crazyflie at the default sample period.
    pub fn crazyflie() -> Result<Self, ConfigError> {
        Self::new(QuadrotorParams::crazyflie(), Self::DEFAULT_DT)
    }

    pub const fn params(&self) -> &QuadrotorParams {
        &self.params
    }

    pub const fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    pub const fn b(&self) -> &DMatrix<f64> {
        &self.b
    }

    pub fn hover_thrust(&self) -> f64 {
        self.params.hover_thrust()
    }

    /// Motor commands from a deviation input.
    pub fn absolute_input(&self, u: &DVector<f64>) -> DVector<f64> {
        u.add_scalar(self.hover_thrust())
    }
}

impl Dynamics for LinearQuadrotor {
    fn state_dim(&self) -> usize {
        STATE_DIM
    }

    fn input_dim(&self) -> usize {
        INPUT_DIM
    }

    fn dt(&self) -> f64 {
        self.dt
    }

    /// The model is linear already; the operating point is ignored.
    fn linearize(
        &self,
        _x_ref: &DVector<f64>,
        _u_ref: &DVector<f64>,
    ) -> (DMatrix<f64>, DMatrix<f64>) {
        (self.a.clone(), self.b.clone())
    }

    /// `x⁺ = A x + B u`, with `disturbance` read as a constant world-frame
    /// acceleration (m/s²) held over the sample.
    fn step(
        &self,
        x: &DVector<f64>,
        u: &DVector<f64>,
        disturbance: Option<&DVector<f64>>,
    ) -> DVector<f64> {
        let mut next = &self.a * x + &self.b * u;
        if let Some(w) = disturbance {
            let dt = self.dt;
            for i in 0..3.min(w.len()) {
                next[i] += 0.5 * dt * dt * w[i];
                next[6 + i] += dt * w[i];
            }
        }
        next
    }

    fn error_state(&self, x: &DVector<f64>, x_ref: &DVector<f64>) -> DVector<f64> {
        x - x_ref
    }
}

// ---------------------------------------------------------------------------
// Quaternion helpers
// ---------------------------------------------------------------------------

/// `q = [1, φ] / sqrt(1 + φᵀφ)`.
pub fn rodrigues_to_quaternion(phi: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(1.0, phi.x, phi.y, phi.z))
}

/// `φ = q_vec / q_w`. Unbounded as the rotation approaches half a turn.
pub fn quaternion_to_rodrigues(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    let q = q.quaternion();
    q.imag() / q.w
}

/// Reduce a 13-element full state to the 12-element error state about
/// `x_ref`.
///
/// The attitude error is `φ(q_refᶜ ⊗ q)`, with both quaternions normalised
/// first. A zero quaternion yields a non-finite error state, which the
/// solver rejects.
pub fn quaternion_error_state(
    x: &SVector<f64, FULL_STATE_DIM>,
    x_ref: &SVector<f64, FULL_STATE_DIM>,
) -> SVector<f64, STATE_DIM> {
    let q = attitude(x);
    let q_ref = attitude(x_ref);
    let phi = quaternion_to_rodrigues(&(q_ref.inverse() * q));

    let mut error = SVector::<f64, STATE_DIM>::zeros();
    error
        .fixed_rows_mut::<3>(0)
        .copy_from(&(x.fixed_rows::<3>(0) - x_ref.fixed_rows::<3>(0)));
    error.fixed_rows_mut::<3>(3).copy_from(&phi);
    error
        .fixed_rows_mut::<6>(6)
        .copy_from(&(x.fixed_rows::<6>(7) - x_ref.fixed_rows::<6>(7)));
    error
}

fn attitude(x: &SVector<f64, FULL_STATE_DIM>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(x[3], x[4], x[5], x[6]))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
