//! Deterministic RNG utilities for reproducible tests.

use nalgebra::{DMatrix, DVector};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// Deterministic vector of length `dim` with entries in `[-scale, scale)`.
pub fn deterministic_vec(dim: usize, scale: f64, seed: u64) -> DVector<f64> {
    let mut rng = seeded_rng(seed);
    DVector::from_fn(dim, |_, _| scale * (2.0 * rng.r#gen::<f64>() - 1.0))
}

/// Random open-loop stable LTI system with diagonal PD weights.
#[derive(Clone, Debug)]
pub struct RandomSystem {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub q: DMatrix<f64>,
    pub r: DMatrix<f64>,
}

/// Draw an `nx`-state, `nu`-input system whose spectral radius stays below
/// 0.95.
///
/// The diagonal of `A` lies in `[0.5, 0.9)` and each row's off-diagonal mass
/// is at most 0.05, so every Gershgorin disc sits inside the unit circle.
pub fn random_stable_system(nx: usize, nu: usize, seed: u64) -> RandomSystem {
    let mut rng = seeded_rng(seed);
    #[allow(clippy::cast_precision_loss)]
    let off_scale = 0.05 / nx.max(2) as f64;

    let a = DMatrix::from_fn(nx, nx, |i, j| {
        if i == j {
            rng.gen_range(0.5..0.9)
        } else {
            rng.gen_range(-off_scale..off_scale)
        }
    });
    let b = DMatrix::from_fn(nx, nu, |_, _| rng.gen_range(-1.0..1.0));
    let q = DMatrix::from_diagonal(&DVector::from_fn(nx, |_, _| rng.gen_range(1.0..10.0)));
    let r = DMatrix::from_diagonal(&DVector::from_fn(nu, |_, _| rng.gen_range(0.1..1.0)));

    RandomSystem { a, b, q, r }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
