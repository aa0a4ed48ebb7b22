//! Test utilities for SetuGraph.
//!
//! Synthetic trajectories, drifting odometry and point clouds of a box-shaped room.

#![allow(dead_code)]

use std::f64::consts::FRAC_PI_2;

use nalgebra::{Matrix6, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use setu_graph::{Key, PointCloud, Pose3, PoseWithCovariance, SetuConfig};

/// Initialize logging once per test binary.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .is_test(true)
        .try_init();
}

/// Odometry covariance used throughout the tests.
pub fn odometry_covariance() -> Matrix6<f64> {
    PoseWithCovariance::diagonal_covariance(0.01, 0.05)
}

/// Tight prior covariance.
pub fn prior_covariance() -> Matrix6<f64> {
    PoseWithCovariance::diagonal_covariance(1e-3, 1e-3)
}

/// Closed square loop in the xy-plane, turning left at each corner.
pub fn square_trajectory(side_length: f64, points_per_side: usize) -> Vec<Pose3> {
    let spacing = side_length / points_per_side as f64;
    let mut poses = Vec::with_capacity(4 * points_per_side);

    for side in 0..4 {
        let yaw = side as f64 * FRAC_PI_2;
        let (start_x, start_y) = match side {
            0 => (0.0, 0.0),
            1 => (side_length, 0.0),
            2 => (side_length, side_length),
            _ => (0.0, side_length),
        };
        for i in 0..points_per_side {
            let d = i as f64 * spacing;
            poses.push(Pose3::from_xyz_rpy(
                start_x + d * yaw.cos(),
                start_y + d * yaw.sin(),
                0.0,
                0.0,
                0.0,
                yaw,
            ));
        }
    }
    poses
}

/// Relative steps between consecutive poses, each corrupted by `bias`.
pub fn drifting_odometry(poses: &[Pose3], bias: &Pose3) -> Vec<Pose3> {
    poses
        .windows(2)
        .map(|w| w[0].between(&w[1]).compose(bias))
        .collect()
}

/// Session holding a prior at `poses[0]` and the drifting odometry chain.
pub fn session_from_odometry(config: &SetuConfig, poses: &[Pose3], steps: &[Pose3]) -> setu_graph::PoseGraphSolver {
    let mut solver = setu_graph::PoseGraphSolver::new(config);
    solver
        .ingest_prior(Key(0), poses[0], prior_covariance())
        .unwrap();
    for (i, step) in steps.iter().enumerate() {
        let (from, to) = (Key(i as u64), Key(i as u64 + 1));
        solver
            .ingest_odometry(from, to, *step, odometry_covariance(), None)
            .unwrap();
    }
    solver
}

/// Points sampled on the floor and three walls of a room offset from the origin.
pub fn room_cloud(seed: u64, n: usize) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(seed);
    let (ox, oy, oz) = (-1.5, -1.2, -0.4);
    (0..n)
        .map(|i| {
            let noise = rng.random_range(-0.003..0.003);
            match i % 4 {
                0 => Point3::new(
                    ox + rng.random_range(0.0..5.0),
                    oy + rng.random_range(0.0..4.0),
                    oz + noise,
                ),
                1 => Point3::new(
                    ox + noise,
                    oy + rng.random_range(0.0..4.0),
                    oz + rng.random_range(0.0..2.5),
                ),
                2 => Point3::new(
                    ox + rng.random_range(0.0..5.0),
                    oy + noise,
                    oz + rng.random_range(0.0..2.5),
                ),
                _ => Point3::new(
                    ox + 5.0 + noise,
                    oy + rng.random_range(0.0..2.0),
                    oz + rng.random_range(0.0..1.5),
                ),
            }
        })
        .collect()
}

/// The world cloud as seen from `pose`.
pub fn scan_at(world: &PointCloud, pose: &Pose3) -> PointCloud {
    world.transform(&pose.inverse())
}
