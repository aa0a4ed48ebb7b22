//! End-to-end tests of a pose-graph session: odometry, loop closures,
//! outlier rejection and scan-verified closures.

mod common;

use setu_graph::loop_closure::{LoopCandidate, LoopClosureComputer};
use setu_graph::registration::InitMethod;
use setu_graph::solver::TriggerDecision;
use setu_graph::{Key, LoopClosureEdge, Pose3, SetuConfig};

fn position_error(estimate: &Pose3, truth: &Pose3) -> f64 {
    (estimate.translation - truth.translation).norm()
}

fn square_session() -> (Vec<Pose3>, setu_graph::PoseGraphSolver) {
    let truth = common::square_trajectory(2.0, 4);
    let bias = Pose3::from_xyz_rpy(0.005, 0.0, 0.0, 0.0, 0.0, 0.002);
    let steps = common::drifting_odometry(&truth, &bias);
    let solver = common::session_from_odometry(&SetuConfig::default(), &truth, &steps);
    (truth, solver)
}

#[test]
fn test_dead_reckoning_matches_composed_steps() {
    let (truth, solver) = square_session();
    let bias = Pose3::from_xyz_rpy(0.005, 0.0, 0.0, 0.0, 0.0, 0.002);
    let composed = common::drifting_odometry(&truth, &bias)
        .iter()
        .fold(truth[0], |acc, step| acc.compose(step));

    let last = Key(truth.len() as u64 - 1);
    assert_eq!(solver.trajectory().end_id(), Some(last));
    let end = solver.trajectory().get(last).unwrap();
    assert!(end.pose.pose.is_close(&composed, 1e-9));
    assert!(solver.values().get(last).unwrap().is_close(&composed, 1e-9));
}

#[test]
fn test_loop_closure_reduces_drift() {
    common::init_logging();
    let (truth, mut solver) = square_session();
    let last = truth.len() - 1;
    let before = position_error(solver.values().get(Key(last as u64)).unwrap(), &truth[last]);

    let edge = LoopClosureEdge {
        from: Key(0),
        to: Key(last as u64),
        pose: truth[0].between(&truth[last]),
        covariance: common::odometry_covariance(),
    };
    let outcome = solver.add_loop_closure(&edge).unwrap();

    assert_eq!(outcome.admitted.len(), 1);
    assert!(outcome.rejected.is_empty());
    assert_eq!(outcome.decision, TriggerDecision::Force);
    assert!(outcome.values_updated());

    let after = position_error(solver.values().get(Key(last as u64)).unwrap(), &truth[last]);
    assert!(after < before, "error {} -> {}", before, after);
    assert_eq!(solver.loop_closure_edges(), vec![edge]);

    // The raw chain is never rewritten by optimization.
    let raw = solver.trajectory().get(Key(last as u64)).unwrap();
    assert!(position_error(&raw.pose.pose, &truth[last]) > after);
}

#[test]
fn test_gross_outlier_rejected_without_solve() {
    let (truth, mut solver) = square_session();
    let last = truth.len() - 1;
    let values_before = solver.values().clone();

    let wrong = truth[0]
        .between(&truth[last])
        .compose(&Pose3::from_xyz_rpy(5.0, -3.0, 0.0, 0.0, 0.0, 1.0));
    let outcome = solver
        .add_loop_closure(&LoopClosureEdge {
            from: Key(0),
            to: Key(last as u64),
            pose: wrong,
            covariance: common::odometry_covariance(),
        })
        .unwrap();

    assert_eq!(outcome.rejected.len(), 1);
    assert!(!outcome.rejected[0].check.is_accepted());
    assert_eq!(outcome.decision, TriggerDecision::Skip);
    assert!(outcome.optimization.is_none());
    assert_eq!(solver.values(), &values_before);
    assert!(solver.loop_closure_edges().is_empty());
}

#[test]
fn test_removing_loop_closure_forces_solve() {
    let (truth, mut solver) = square_session();
    let last = truth.len() - 1;
    let outcome = solver
        .add_loop_closure(&LoopClosureEdge {
            from: Key(0),
            to: Key(last as u64),
            pose: truth[0].between(&truth[last]),
            covariance: common::odometry_covariance(),
        })
        .unwrap();
    let index = outcome.admitted[0];
    let factors = solver.num_factors();

    let removal = solver.update(Vec::new(), Vec::new(), &[index]).unwrap();
    assert_eq!(removal.decision, TriggerDecision::Force);
    assert_eq!(solver.num_factors(), factors - 1);
    assert!(solver.loop_closure_edges().is_empty());
    assert!(solver.selector().is_empty());
}

#[test]
fn test_scan_verified_closure_enters_graph() {
    common::init_logging();
    let (truth, mut solver) = square_session();
    let last = truth.len() - 1;
    let world = common::room_cloud(7, 1200);

    let config = SetuConfig::default();
    let mut registration = config.registration.clone();
    registration.init_method = InitMethod::Odometry;
    let mut computer = LoopClosureComputer::new(config.loop_closure.clone(), registration).unwrap();

    for key in [0, last] {
        computer.insert_scan(Key(key as u64), common::scan_at(&world, &truth[key]));
    }
    computer.add_candidates([LoopCandidate {
        from: Key(0),
        to: Key(last as u64),
        pose_from: *solver.values().get(Key(0)).unwrap(),
        pose_to: *solver.values().get(Key(last as u64)).unwrap(),
    }]);

    let report = computer.compute_transforms();
    assert_eq!(report.aligned, 1, "{:?}", report.rejected);
    let edges = computer.take_loop_closures();
    assert!(edges[0].pose.is_close(&truth[0].between(&truth[last]), 1e-4));

    let outcome = solver.add_loop_closure(&edges[0]).unwrap();
    assert_eq!(outcome.admitted.len(), 1);
    assert!(outcome.values_updated());
}
