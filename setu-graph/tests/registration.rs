//! Scan registration tests on synthetic room scans.

mod common;

use approx::assert_relative_eq;
use nalgebra::{Matrix6, SymmetricEigen};
use setu_graph::registration::{CovarianceMethod, InitMethod, RegistrationConfig, RejectionReason};
use setu_graph::{Key, Pose3, ScanAligner};

fn aligner(configure: impl FnOnce(&mut RegistrationConfig)) -> ScanAligner {
    let mut config = RegistrationConfig::default();
    configure(&mut config);
    ScanAligner::new(config).unwrap()
}

#[test]
fn test_odometry_init_recovers_relative_pose() {
    let world = common::room_cloud(3, 1500);
    let pose_a = Pose3::from_xyz_rpy(0.5, 0.2, 0.0, 0.0, 0.0, 0.1);
    let pose_b = Pose3::from_xyz_rpy(0.8, 0.5, 0.0, 0.0, 0.0, 0.4);
    let scan_a = common::scan_at(&world, &pose_a);
    let scan_b = common::scan_at(&world, &pose_b);

    // Odometry estimates carry some drift.
    let drifted_b = pose_b.compose(&Pose3::from_xyz_rpy(0.06, -0.04, 0.0, 0.0, 0.0, 0.02));
    let aligner = aligner(|c| c.init_method = InitMethod::Odometry);
    let alignment = aligner
        .align(Key(2), &scan_a, &pose_a, Key(40), &scan_b, &drifted_b)
        .unwrap();

    assert!(alignment.pose.is_close(&pose_a.between(&pose_b), 1e-4));
    assert!(alignment.fitness < 1e-8);
}

#[test]
fn test_feature_init_recovers_small_motion() {
    common::init_logging();
    let scan_a = common::room_cloud(4, 1200);
    let motion = Pose3::from_xyz_rpy(0.05, 0.03, 0.0, 0.0, 0.0, 0.04);
    let scan_b = common::scan_at(&scan_a, &motion);

    let aligner = aligner(|c| {
        c.init_method = InitMethod::Features;
        c.sac.correspondence_randomness = 1;
    });
    let alignment = aligner
        .align(Key(0), &scan_a, &Pose3::identity(), Key(1), &scan_b, &Pose3::identity())
        .unwrap();

    assert!(alignment.pose.is_close(&motion, 1e-3));
}

#[test]
fn test_covariance_models_stay_within_bounds() {
    let world = common::room_cloud(5, 1000);
    let pose_b = Pose3::from_xyz_rpy(0.05, 0.0, 0.0, 0.0, 0.0, 0.02);
    let scan_a = common::scan_at(&world, &Pose3::identity());
    let scan_b = common::scan_at(&world, &pose_b);

    for method in [CovarianceMethod::PointToPoint, CovarianceMethod::PointToPlane] {
        let aligner = aligner(|c| {
            c.init_method = InitMethod::Odometry;
            c.covariance_method = method;
        });
        let lower = aligner.config().eigen_lower_bound;
        let upper = aligner.config().eigen_upper_bound;

        let alignment = aligner
            .align(Key(0), &scan_a, &Pose3::identity(), Key(1), &scan_b, &pose_b)
            .unwrap();
        assert!(!alignment.degraded_covariance, "{:?}", method);
        assert_relative_eq!(alignment.covariance, alignment.covariance.transpose(), epsilon = 1e-12);

        let eigenvalues = SymmetricEigen::new(alignment.covariance).eigenvalues;
        for v in eigenvalues.iter() {
            assert!(*v >= lower * (1.0 - 1e-9) && *v <= upper * (1.0 + 1e-9), "{:?}: {}", method, v);
        }
    }
}

#[test]
fn test_fixed_covariance_overrides_model() {
    let world = common::room_cloud(6, 600);
    let aligner = aligner(|c| {
        c.fixed_covariance.enabled = true;
        c.fixed_covariance.rot_sigma = 0.1;
        c.fixed_covariance.trans_sigma = 0.2;
    });

    let alignment = aligner
        .align(Key(0), &world, &Pose3::identity(), Key(1), &world, &Pose3::identity())
        .unwrap();
    let mut expected = Matrix6::zeros();
    for i in 0..3 {
        expected[(i, i)] = 0.01;
        expected[(i + 3, i + 3)] = 0.04;
    }
    assert_relative_eq!(alignment.covariance, expected, epsilon = 1e-12);
}

#[test]
fn test_unrelated_scans_rejected() {
    let scan_a = common::room_cloud(8, 600);
    let far = Pose3::from_translation(25.0, 0.0, 0.0);
    let scan_b = common::scan_at(&scan_a, &far);

    let aligner = aligner(|_| {});
    let result = aligner.align(Key(0), &scan_a, &Pose3::identity(), Key(1), &scan_b, &Pose3::identity());
    assert_eq!(result, Err(RejectionReason::NotConverged));
}

/// Ring at z = 0 plus many copies of the origin, as a lidar with dropped
/// returns reports them.
fn ring_with_origin_returns() -> setu_graph::PointCloud {
    let mut points = vec![nalgebra::Point3::origin(); 40];
    points.extend((0..360).map(|deg| {
        let a = (deg as f64).to_radians();
        nalgebra::Point3::new(5.0 * a.cos(), 5.0 * a.sin(), 0.0)
    }));
    setu_graph::PointCloud::from_points(points)
}

#[test]
fn test_duplicate_and_coplanar_points_do_not_abort() {
    let scan = ring_with_origin_returns();
    for method in [InitMethod::Identity, InitMethod::Odometry] {
        let aligner = aligner(|c| c.init_method = method);
        let alignment = aligner
            .align(Key(0), &scan, &Pose3::identity(), Key(1), &scan, &Pose3::identity())
            .unwrap();
        assert!(alignment.fitness < 1e-12, "{:?}", method);
    }

    let aligner = aligner(|c| c.init_method = InitMethod::Features);
    match aligner.align(Key(0), &scan, &Pose3::identity(), Key(1), &scan, &Pose3::identity()) {
        Ok(alignment) => assert!(alignment.fitness.is_finite()),
        Err(reason) => assert!(!reason.to_string().is_empty()),
    }
}

#[test]
fn test_noise_free_grid_room() {
    // exact grid: whole rows and columns share coordinates
    let mut points = Vec::new();
    for i in 0..30 {
        for j in 0..30 {
            let (u, v) = (i as f64 * 0.1, j as f64 * 0.1);
            points.push(nalgebra::Point3::new(u, v, 0.0));
            points.push(nalgebra::Point3::new(0.0, u, v));
            points.push(nalgebra::Point3::new(u, 0.0, v));
        }
    }
    let world = setu_graph::PointCloud::from_points(points);
    let pose_a = Pose3::identity();
    let pose_b = Pose3::from_xyz_rpy(0.3, 0.2, 0.0, 0.0, 0.0, 0.1);
    let scan_a = common::scan_at(&world, &pose_a);
    let scan_b = common::scan_at(&world, &pose_b);

    let aligner = aligner(|c| c.init_method = InitMethod::Odometry);
    let alignment = aligner
        .align(Key(0), &scan_a, &pose_a, Key(1), &scan_b, &pose_b)
        .unwrap();
    assert!(alignment.pose.is_close(&pose_a.between(&pose_b), 1e-6));
    assert!(alignment.fitness < 1e-10);
}
