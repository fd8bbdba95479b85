//! Plant models, references and the closed-loop harness around
//! [`kestrel_mpc::Mpc`].
//!
//! # Example
//!
//! ```no_run
//! use kestrel_core::MpcConfig;
//! use kestrel_mpc::{Bounds, Mpc, ProblemDefinition};
//! use kestrel_sim::{
//!     ClosedLoopConfig, Dynamics, HoverReference, LinearQuadrotor, run_closed_loop,
//! };
//! use nalgebra::{DMatrix, DVector};
//!
//! let plant = LinearQuadrotor::crazyflie().unwrap();
//! let (a, b) = plant.linearize(&DVector::zeros(12), &DVector::zeros(4));
//! let problem = ProblemDefinition::new(
//!     a,
//!     b,
//!     DMatrix::identity(12, 12) * 100.0,
//!     DMatrix::identity(4, 4) * 4.0,
//!     10,
//! )
//! .unwrap();
//! let mut mpc = Mpc::new(problem, &MpcConfig::default()).unwrap();
//! mpc.install_bounds(Bounds::unbounded(12, 4)).unwrap();
//!
//! let mut x0 = DVector::zeros(12);
//! x0[0] = 0.2;
//! let log = run_closed_loop(
//!     &mut mpc,
//!     &plant,
//!     &HoverReference::origin(12),
//!     &x0,
//!     &ClosedLoopConfig::default(),
//! )
//! .unwrap();
//! println!("{:?}", log.stats().mean_position_error());
//! ```

pub mod closed_loop;
pub mod dynamics;
pub mod quadrotor;
pub mod reference;
pub mod stats;

// ---------------------------------------------------------------------------
// Re-exports
// ---------------------------------------------------------------------------

pub use closed_loop::{
    ClosedLoopConfig, ClosedLoopLog, StepRecord, run_closed_loop, shift_warm_start,
};
pub use dynamics::Dynamics;
pub use quadrotor::{
    LinearQuadrotor, QuadrotorParams, quaternion_error_state, quaternion_to_rodrigues,
    rodrigues_to_quaternion,
};
pub use reference::{HoverReference, ReferenceGenerator};
pub use stats::RunStats;
