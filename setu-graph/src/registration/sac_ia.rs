//! Sample-consensus initial alignment on FPFH correspondences.
//!
//! Each iteration samples three source keypoints at least
//! `min_sample_distance` apart, pairs each with a random one of its
//! `correspondence_randomness` nearest target descriptors, fits a rigid
//! transform and scores it on every source keypoint with a truncated
//! squared error. The best hypothesis wins; its fitness is the mean squared
//! nearest-neighbor distance of the transformed source keypoints.
//!
//! Fitness is measured against the target keypoints, not the dense target
//! scan. PCL's `getFitnessScore` does the same when SAC-IA is fed keypoint
//! clouds, which keeps `fitness_score_threshold` on PCL's scale.

use nalgebra::Point3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use super::SacConfig;
use super::fpfh::{FpfhSignature, descriptor_distance_sq};
use super::icp::estimate_rigid_transform;
use super::kdtree::PointIndex;
use crate::core::Pose3;

const SAMPLE_SIZE: usize = 3;
const MAX_SAMPLE_ATTEMPTS: usize = 100;

/// Best SAC-IA hypothesis.
#[derive(Debug, Clone)]
pub struct SacOutcome {
    /// Transform mapping source keypoints into the target frame.
    pub transform: Pose3,
    /// Mean squared distance from each transformed source keypoint to its
    /// nearest target keypoint.
    pub fitness: f64,
}

/// Keypoint positions and their descriptors.
pub struct FeatureSet<'a> {
    /// Keypoint positions.
    pub points: &'a [Point3<f64>],
    /// One descriptor per keypoint.
    pub features: &'a [FpfhSignature],
}

/// Run SAC-IA. `truncation` bounds the per-point error used for scoring.
///
/// `None` when either side has fewer than three keypoints or no sample
/// could be fitted.
pub fn sample_consensus(
    source: &FeatureSet<'_>,
    target: &FeatureSet<'_>,
    config: &SacConfig,
    truncation: f64,
) -> Option<SacOutcome> {
    if source.points.len() < SAMPLE_SIZE || target.points.len() < SAMPLE_SIZE {
        log::debug!(
            "SAC-IA: not enough keypoints ({} source, {} target)",
            source.points.len(),
            target.points.len()
        );
        return None;
    }

    let k = config.correspondence_randomness.max(1).min(target.features.len());
    let candidates: Vec<Vec<usize>> = source
        .features
        .par_iter()
        .map(|f| nearest_descriptors(f, target.features, k))
        .collect();

    let target_index = PointIndex::build(target.points);
    let truncation_sq = truncation * truncation;
    let min_dist_sq = config.min_sample_distance * config.min_sample_distance;
    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut best: Option<(Pose3, f64)> = None;
    for _ in 0..config.iterations {
        let Some(samples) = select_samples(source.points, min_dist_sq, &mut rng) else {
            continue;
        };

        let moved: Vec<Point3<f64>> = samples.iter().map(|i| source.points[*i]).collect();
        let fixed: Vec<Point3<f64>> = samples
            .iter()
            .map(|i| {
                let pick = rng.random_range(0..candidates[*i].len());
                target.points[candidates[*i][pick]]
            })
            .collect();

        let Some(hypothesis) = estimate_rigid_transform(&moved, &fixed) else {
            continue;
        };

        let error = source
            .points
            .iter()
            .map(|p| {
                let q = hypothesis.transform_point(p);
                target_index
                    .nearest(&q)
                    .map_or(truncation_sq, |(_, d2)| d2.min(truncation_sq))
            })
            .sum::<f64>();

        if best.as_ref().is_none_or(|(_, e)| error < *e) {
            best = Some((hypothesis, error));
        }
    }

    let (transform, _) = best?;
    let fitness = source
        .points
        .iter()
        .filter_map(|p| target_index.nearest(&transform.transform_point(p)))
        .map(|(_, d2)| d2)
        .sum::<f64>()
        / source.points.len() as f64;

    log::debug!("SAC-IA fitness {:.6}", fitness);
    Some(SacOutcome { transform, fitness })
}

fn nearest_descriptors(query: &FpfhSignature, features: &[FpfhSignature], k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = features
        .iter()
        .enumerate()
        .map(|(j, f)| (j, descriptor_distance_sq(query, f)))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    scored.into_iter().take(k).map(|(j, _)| j).collect()
}

fn select_samples(points: &[Point3<f64>], min_dist_sq: f64, rng: &mut StdRng) -> Option<[usize; SAMPLE_SIZE]> {
    let mut samples = [0usize; SAMPLE_SIZE];
    let mut chosen = 0;
    for _ in 0..MAX_SAMPLE_ATTEMPTS {
        let candidate = rng.random_range(0..points.len());
        let far_enough = samples[..chosen].iter().all(|s| {
            *s != candidate && (points[*s] - points[candidate]).norm_squared() >= min_dist_sq
        });
        if far_enough {
            samples[chosen] = candidate;
            chosen += 1;
            if chosen == SAMPLE_SIZE {
                return Some(samples);
            }
        }
    }
    None
}
