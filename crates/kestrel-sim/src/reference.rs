//! Reference generators for the closed loop.

use nalgebra::DVector;

/// Time-indexed state reference in the plant's own coordinates.
pub trait ReferenceGenerator {
    fn reference_at(&self, t: f64) -> DVector<f64>;
}

/// Constant goal state.
#[derive(Clone, Debug, PartialEq)]
pub struct HoverReference {
    goal: DVector<f64>,
}

impl HoverReference {
    pub const fn new(goal: DVector<f64>) -> Self {
        Self { goal }
    }

    /// Hover at the origin.
    pub fn origin(state_dim: usize) -> Self {
        Self::new(DVector::zeros(state_dim))
    }

    pub const fn goal(&self) -> &DVector<f64> {
        &self.goal
    }
}

impl ReferenceGenerator for HoverReference {
    fn reference_at(&self, _t: f64) -> DVector<f64> {
        self.goal.clone()
    }
}
