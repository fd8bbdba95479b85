//! 100-step hover recovery of the linearised Crazyflie from a 0.2 m offset,
//! with a fixed penalty and with each adaptation strategy.

use kestrel_core::{AdapterConfig, CacheUpdate, MpcConfig};
use kestrel_mpc::{Bounds, Mpc, ProblemDefinition, SolveStatus};
use kestrel_sim::{
    ClosedLoopConfig, ClosedLoopLog, Dynamics, HoverReference, LinearQuadrotor, RunStats,
    run_closed_loop,
};
use kestrel_test_utils::fixtures::HOVER_HORIZON;
use kestrel_test_utils::{
    adaptive_hover_config, hover_bounds, hover_config, hover_weights, wide_bounds,
};
use nalgebra::DVector;

fn run(config: &MpcConfig) -> ClosedLoopLog {
    let plant = LinearQuadrotor::crazyflie().unwrap();
    run_with_bounds(config, hover_bounds(plant.hover_thrust()))
}

fn run_with_bounds(config: &MpcConfig, bounds: Bounds) -> ClosedLoopLog {
    let plant = LinearQuadrotor::crazyflie().unwrap();
    let (a, b) = plant.linearize(&DVector::zeros(12), &DVector::zeros(4));
    let (q, r) = hover_weights();
    let problem = ProblemDefinition::new(a, b, q, r, HOVER_HORIZON).unwrap();
    let mut mpc = Mpc::new(problem, config).unwrap();
    mpc.install_bounds(bounds).unwrap();

    let x0 = DVector::from_fn(12, |i, _| match i {
        0 | 1 => 0.2,
        2 => -0.2,
        _ => 0.0,
    });
    run_closed_loop(
        &mut mpc,
        &plant,
        &HoverReference::origin(12),
        &x0,
        &ClosedLoopConfig::default(),
    )
    .unwrap()
}

fn first_order_config() -> MpcConfig {
    adaptive_hover_config()
}

fn exact_config() -> MpcConfig {
    hover_config().with_adapter(AdapterConfig {
        cache_update: CacheUpdate::Exact,
        ..AdapterConfig::default()
    })
}

fn mean_iterations(stats: &RunStats) -> f64 {
    stats.mean_iterations().unwrap()
}

#[test]
fn fixed_rho_hover_converges_and_tracks() {
    let log = run(&hover_config());
    let stats = log.stats();

    assert_eq!(stats.steps, 100);
    assert!(log.records.iter().all(|r| r.status == SolveStatus::Converged));
    assert_eq!(stats.converged, 100);
    assert!(stats.mean_position_error().unwrap() < 0.05);
    assert!(stats.final_position_error().unwrap() < 0.01);
    assert!(log.rho_trace().iter().all(|rho| (*rho - 85.0).abs() < f64::EPSILON));
}

#[test]
fn unconstrained_hover_converges_and_tracks() {
    let log = run_with_bounds(&hover_config(), wide_bounds(12, 4));
    let stats = log.stats();
    assert!(log.records.iter().all(|r| r.status == SolveStatus::Converged));
    assert!(stats.mean_position_error().unwrap() < 0.05);
    assert!(log.records.iter().all(|r| r.violation.total() == 0.0));
}

#[test]
fn motor_limits_are_respected() {
    let log = run(&hover_config());
    let hover = LinearQuadrotor::crazyflie().unwrap().hover_thrust();
    for (record, u) in log.records.iter().zip(&log.inputs) {
        assert!(record.violation.input < 1e-2);
        for v in u.iter() {
            assert!(*v >= -hover - 1e-2 && *v <= 1.0 - hover + 1e-2);
        }
    }
}

#[test]
fn exact_adaptation_reduces_iterations() {
    let baseline = run(&hover_config()).stats();
    let log = run(&exact_config());
    let stats = log.stats();

    assert_eq!(stats.converged, 100);
    assert!(mean_iterations(&stats) < mean_iterations(&baseline));
    assert!(stats.mean_position_error().unwrap() < 0.05);
    assert!(log.rho_trace().iter().all(|rho| (60.0..=100.0).contains(rho)));
    assert!((log.rho_trace()[0] - 85.0).abs() < f64::EPSILON);
}

#[test]
fn first_order_adaptation_halves_iterations() {
    let baseline = run(&hover_config()).stats();
    let stats = run(&first_order_config()).stats();

    assert_eq!(stats.converged, 100);
    assert!(mean_iterations(&stats) <= 0.5 * mean_iterations(&baseline));
    assert!(stats.mean_position_error().unwrap() < 0.05);
}
