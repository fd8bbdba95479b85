//! Properties checked over families of random stable systems.

use kestrel_core::{AdapterConfig, SolverSettings};
use kestrel_mpc::{
    AdmmSolver, Bounds, Cache, CacheSensitivity, DEFAULT_RICCATI_SWEEPS, KktResiduals,
    ProblemDefinition, RhoAdapter,
};
use kestrel_test_utils::{deterministic_vec, random_stable_system, seeded_rng};
use nalgebra::DMatrix;
use rand::Rng;

const HORIZON: usize = 12;

fn random_problem(seed: u64) -> ProblemDefinition {
    let nx = 2 + (seed as usize % 4);
    let nu = 1 + (seed as usize % 3);
    let sys = random_stable_system(nx, nu, seed);
    ProblemDefinition::new(sys.a, sys.b, sys.q, sys.r, HORIZON).unwrap()
}

#[test]
fn cache_reaches_fixed_point() {
    for seed in 0..8 {
        let problem = random_problem(seed);
        for rho in [0.1, 1.0, 85.0] {
            let cache = Cache::compute(&problem, rho, DEFAULT_RICCATI_SWEEPS).unwrap();
            let scale = cache.pinf().amax().max(1.0);
            assert!(
                cache.fixed_point_residual(&problem) < 1e-8 * scale,
                "seed {seed}, rho {rho}"
            );
        }
    }
}

#[test]
fn analytical_sensitivity_matches_finite_difference() {
    for seed in 0..6 {
        let problem = random_problem(seed);
        let analytical =
            CacheSensitivity::analytical(&problem, 10.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        let fd = CacheSensitivity::finite_difference(&problem, 10.0, DEFAULT_RICCATI_SWEEPS, 1e-4)
            .unwrap();
        for (name, a, f) in [
            ("dkinf", analytical.dkinf(), fd.dkinf()),
            ("dpinf", analytical.dpinf(), fd.dpinf()),
            ("dc1", analytical.dc1(), fd.dc1()),
            ("dc2", analytical.dc2(), fd.dc2()),
        ] {
            let err = (a - f).amax();
            assert!(err <= 1e-4 * a.amax() + 1e-10, "seed {seed}: {name} off by {err}");
        }
    }
}

#[test]
fn slacks_respect_random_bounds() {
    for seed in 0..8 {
        let problem = random_problem(seed);
        let (nx, nu) = (problem.nx(), problem.nu());
        let cache = Cache::compute(&problem, 5.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        let settings = SolverSettings {
            max_iter: 50,
            ..SolverSettings::default()
        };
        let mut solver = AdmmSolver::new(problem, cache, settings).unwrap();
        let bounds = Bounds::uniform(nx, nu, (-0.3, 0.3), (-2.0, 2.0)).unwrap();
        solver.install_bounds(bounds.clone()).unwrap();

        let mut x_init = DMatrix::zeros(nx, HORIZON);
        x_init.set_column(0, &deterministic_vec(nx, 1.5, seed));
        solver.solve(&x_init, &DMatrix::zeros(nu, HORIZON - 1)).unwrap();

        for col in solver.input_slack().column_iter() {
            for (i, v) in col.iter().enumerate() {
                assert!(*v >= bounds.u_min[i] && *v <= bounds.u_max[i], "seed {seed}");
            }
        }
        for col in solver.state_slack().column_iter() {
            for (i, v) in col.iter().enumerate() {
                assert!(*v >= bounds.x_min[i] && *v <= bounds.x_max[i], "seed {seed}");
            }
        }
    }
}

#[test]
fn dynamics_hold_after_every_solve() {
    for seed in 0..4 {
        let problem = random_problem(seed);
        let (a, b) = (problem.a().clone(), problem.b().clone());
        let (nx, nu) = (problem.nx(), problem.nu());
        let cache = Cache::compute(&problem, 1.0, DEFAULT_RICCATI_SWEEPS).unwrap();
        let mut solver = AdmmSolver::new(problem, cache, SolverSettings::default()).unwrap();
        solver
            .install_bounds(Bounds::uniform(nx, nu, (-0.2, 0.2), (-10.0, 10.0)).unwrap())
            .unwrap();

        let mut x_init = DMatrix::zeros(nx, HORIZON);
        x_init.set_column(0, &deterministic_vec(nx, 1.0, seed + 100));
        solver.solve(&x_init, &DMatrix::zeros(nu, HORIZON - 1)).unwrap();

        let x = solver.states();
        let u = solver.inputs();
        for k in 0..HORIZON - 1 {
            let next = &a * x.column(k) + &b * u.column(k);
            assert!((next - x.column(k + 1)).amax() < 1e-9, "seed {seed}, step {k}");
        }
    }
}

#[test]
fn predicted_rho_stays_in_range() {
    let problem = random_problem(0);
    let adapter = RhoAdapter::new(AdapterConfig::default(), &problem, DEFAULT_RICCATI_SWEEPS)
        .unwrap();
    let mut rng = seeded_rng(7);
    for _ in 0..200 {
        let residuals = KktResiduals {
            primal: 10f64.powf(rng.gen_range(-8.0..2.0)),
            primal_scale: 10f64.powf(rng.gen_range(-8.0..2.0)),
            dual: 10f64.powf(rng.gen_range(-8.0..2.0)),
            dual_scale: 10f64.powf(rng.gen_range(-8.0..2.0)),
        };
        let current = rng.gen_range(60.0..100.0);
        let rho = adapter.predict_rho(&residuals, current);
        assert!((60.0..=100.0).contains(&rho));
    }
}
