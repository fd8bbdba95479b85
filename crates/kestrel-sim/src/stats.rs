//! Closed-loop run statistics.
//!
//! [`RunStats`] accumulates per-step solver effort and tracking error:
//! iteration totals, convergence count, and position error history.

use kestrel_mpc::SolveStatus;

use crate::closed_loop::StepRecord;

// ---------------------------------------------------------------------------
// RunStats
// ---------------------------------------------------------------------------

/// Cumulative statistics over one closed-loop run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunStats {
    /// Steps recorded.
    pub steps: u32,
    /// ADMM iterations across all steps.
    pub total_iterations: u64,
    /// Steps whose solve met tolerance.
    pub converged: u32,
    /// Largest position error seen.
    pub max_position_error: f64,
    /// Position error after each step.
    pub position_errors: Vec<f64>,
}

impl RunStats {
    /// Create empty stats.
    pub const fn new() -> Self {
        Self {
            steps: 0,
            total_iterations: 0,
            converged: 0,
            max_position_error: 0.0,
            position_errors: Vec::new(),
        }
    }

    pub fn from_records(records: &[StepRecord]) -> Self {
        let mut stats = Self::new();
        for record in records {
            stats.record(record);
        }
        stats
    }

    pub fn record(&mut self, record: &StepRecord) {
        self.steps += 1;
        self.total_iterations += record.iterations as u64;
        if record.status == SolveStatus::Converged {
            self.converged += 1;
        }
        self.max_position_error = self.max_position_error.max(record.position_error);
        self.position_errors.push(record.position_error);
    }

    /// Average ADMM iterations per step.
    pub fn mean_iterations(&self) -> Option<f64> {
        if self.steps == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.total_iterations as f64 / f64::from(self.steps))
    }

    /// Average position error per step.
    pub fn mean_position_error(&self) -> Option<f64> {
        if self.position_errors.is_empty() {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some(self.position_errors.iter().sum::<f64>() / self.position_errors.len() as f64)
    }

    pub fn final_position_error(&self) -> Option<f64> {
        self.position_errors.last().copied()
    }

    /// Reset all statistics.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
