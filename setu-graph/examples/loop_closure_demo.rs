//! Drive two laps of a square room with drifting odometry, verify revisits by
//! scan registration, and close the loop.
//!
//! Run with: `cargo run --example loop_closure_demo [config.yaml]`

use std::f64::consts::FRAC_PI_2;
use std::path::Path;

use env_logger::Env;
use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use setu_graph::loop_closure::{LoopCandidate, LoopClosureComputer};
use setu_graph::registration::InitMethod;
use setu_graph::{Key, PointCloud, PoseGraphSolver, Pose3, PoseWithCovariance, SetuConfig};

const SIDE: f64 = 3.0;
const POSES_PER_SIDE: usize = 6;
const LAPS: usize = 2;
const MIN_KEY_GAP: u64 = 10;
const SEARCH_RADIUS: f64 = 0.75;

fn ground_truth() -> Vec<Pose3> {
    let spacing = SIDE / POSES_PER_SIDE as f64;
    let corners = [(0.0, 0.0), (SIDE, 0.0), (SIDE, SIDE), (0.0, SIDE)];
    (0..LAPS)
        .flat_map(|_| 0..4)
        .flat_map(|side| {
            let yaw = side as f64 * FRAC_PI_2;
            let (x0, y0) = corners[side];
            (0..POSES_PER_SIDE).map(move |i| {
                let d = i as f64 * spacing;
                Pose3::from_xyz_rpy(x0 + d * yaw.cos(), y0 + d * yaw.sin(), 0.0, 0.0, 0.0, yaw)
            })
        })
        .collect()
}

fn world_cloud(n: usize) -> PointCloud {
    let mut rng = StdRng::seed_from_u64(2024);
    let (lo, hi) = (-1.5, SIDE + 1.5);
    (0..n)
        .map(|i| {
            let a = rng.random_range(lo..hi);
            let b = rng.random_range(0.0..2.5);
            let e = rng.random_range(-0.005..0.005);
            match i % 5 {
                0 => Point3::new(a, rng.random_range(lo..hi), -0.3 + e),
                1 => Point3::new(lo + e, a, b),
                2 => Point3::new(hi + e, a, b),
                3 => Point3::new(a, lo + e, b),
                _ => Point3::new(a, hi + e, b),
            }
        })
        .collect()
}

fn mean_error(solver: &PoseGraphSolver, truth: &[Pose3]) -> f64 {
    let total: f64 = truth
        .iter()
        .enumerate()
        .filter_map(|(i, t)| solver.values().get(Key(i as u64)).map(|p| (p.translation - t.translation).norm()))
        .sum();
    total / truth.len() as f64
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => SetuConfig::load(Path::new(&path))?,
        None => SetuConfig::load_default()?,
    };
    config.registration.init_method = InitMethod::Odometry;

    let truth = ground_truth();
    let world = world_cloud(4_000);
    let odometry_cov = PoseWithCovariance::diagonal_covariance(0.01, 0.05);
    let bias = Pose3::from_xyz_rpy(0.01, 0.0, 0.0, 0.0, 0.0, 0.004);

    let mut solver = PoseGraphSolver::new(&config);
    let mut computer = LoopClosureComputer::new(config.loop_closure.clone(), config.registration.clone())?;

    solver.ingest_prior(Key(0), truth[0], PoseWithCovariance::diagonal_covariance(1e-3, 1e-3))?;
    computer.insert_scan(Key(0), world.transform(&truth[0].inverse()));

    for to in 1..truth.len() {
        let (from_key, to_key) = (Key(to as u64 - 1), Key(to as u64));
        let step = truth[to - 1].between(&truth[to]).compose(&bias);
        solver.ingest_odometry(from_key, to_key, step, odometry_cov, None)?;
        computer.insert_scan(to_key, world.transform(&truth[to].inverse()));

        // Propose every older pose close to the current estimate.
        let Some(current) = solver.values().get(to_key).copied() else {
            continue;
        };
        let candidates: Vec<LoopCandidate> = solver
            .values()
            .iter()
            .filter(|(key, pose)| {
                key.index() + MIN_KEY_GAP <= to_key.index()
                    && (pose.translation - current.translation).norm() < SEARCH_RADIUS
            })
            .map(|(key, pose)| LoopCandidate {
                from: key,
                to: to_key,
                pose_from: *pose,
                pose_to: current,
            })
            .collect();
        if candidates.is_empty() {
            continue;
        }

        computer.add_candidates(candidates);
        computer.compute_transforms();
        for edge in computer.take_loop_closures() {
            let outcome = solver.add_loop_closure(&edge)?;
            if !outcome.rejected.is_empty() {
                log::warn!("{} -> {} failed the odometric check", edge.from, edge.to);
            }
        }
    }

    let last = Key(truth.len() as u64 - 1);
    let raw_end = solver
        .trajectory()
        .get(last)
        .map(|p| (p.pose.pose.translation - truth[truth.len() - 1].translation).norm())
        .unwrap_or(f64::NAN);

    println!("poses:               {}", truth.len());
    println!("factors:             {}", solver.num_factors());
    println!("active loop closures: {}", solver.loop_closure_edges().len());
    println!("dead-reckoned end error: {:.3} m", raw_end);
    println!("optimized mean error:    {:.3} m", mean_error(&solver, &truth));
    Ok(())
}
