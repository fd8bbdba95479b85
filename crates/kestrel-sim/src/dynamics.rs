//! Plant interface consumed by the closed-loop harness.

use nalgebra::{DMatrix, DVector};

/// Discrete-time plant.
///
/// The controller only ever sees the linear error state returned by
/// [`error_state`](Dynamics::error_state); how the plant represents its own
/// state is up to the implementation.
pub trait Dynamics {
    /// Dimension of the controller's error state.
    fn state_dim(&self) -> usize;

    fn input_dim(&self) -> usize;

    /// Sample period in seconds.
    fn dt(&self) -> f64;

    /// Discrete `(A, B)` about the operating point.
    fn linearize(&self, x_ref: &DVector<f64>, u_ref: &DVector<f64>) -> (DMatrix<f64>, DMatrix<f64>);

    /// Advance one sample period under input `u` and an optional external
    /// disturbance.
    fn step(&self, x: &DVector<f64>, u: &DVector<f64>, disturbance: Option<&DVector<f64>>)
    -> DVector<f64>;

    /// Map plant state and reference to the controller's error state.
    fn error_state(&self, x: &DVector<f64>, x_ref: &DVector<f64>) -> DVector<f64>;

    /// Leading state components that make up the position, for tracking
    /// metrics.
    fn position_dims(&self) -> usize {
        3
    }
}
