//! Point-to-point Iterative Closest Point in 3D.
//!
//! # Algorithm
//!
//! ```text
//! Input: source S, target T (kd-tree), initial guess X₀
//! Output: X such that X·S ≈ T
//!
//! for each iteration:
//!   1. transform S by X, find nearest target point for each
//!   2. keep pairs closer than corr_dist
//!   3. ΔX = Kabsch(X·S, T) on those pairs
//!   4. X = ΔX · X
//!   5. stop when |Δt|² and (1 − cos Δθ) are both below tf_epsilon
//! ```
//!
//! Reaching the iteration cap counts as converged; too few correspondences
//! does not. Fitness is the mean squared nearest-neighbor distance over all
//! source points at the final transform.

use nalgebra::{Matrix3, Point3, UnitQuaternion, Vector3};
use rayon::prelude::*;

use super::IcpConfig;
use super::kdtree::PointIndex;
use crate::core::{PointCloud, Pose3};

/// Result of one ICP run.
#[derive(Debug, Clone)]
pub struct IcpOutcome {
    /// Transform mapping source into the target frame.
    pub transform: Pose3,
    /// Mean squared nearest-neighbor distance (m²).
    pub fitness: f64,
    /// Iterations performed.
    pub iterations: u32,
    /// False if correspondences ran out.
    pub converged: bool,
    /// Nearest target index for each source point at `transform`.
    pub correspondences: Vec<usize>,
    /// Source transformed by `transform`.
    pub aligned: PointCloud,
}

/// Point-to-point ICP matcher.
#[derive(Debug, Clone)]
pub struct PointToPointIcp {
    config: IcpConfig,
}

impl PointToPointIcp {
    /// Create a new ICP matcher with the given configuration.
    pub fn new(config: IcpConfig) -> Self {
        Self { config }
    }

    /// Get the current configuration.
    pub fn config(&self) -> &IcpConfig {
        &self.config
    }

    /// Align `source` onto the points indexed by `target_index`.
    pub fn align(
        &self,
        source: &PointCloud,
        target: &PointCloud,
        target_index: &PointIndex,
        initial_guess: &Pose3,
    ) -> IcpOutcome {
        let max_dist_sq = self.config.corr_dist * self.config.corr_dist;
        let mut current = *initial_guess;
        let mut iterations = 0;
        let mut converged = false;

        while iterations < self.config.iterations {
            iterations += 1;

            let pairs: Vec<(Point3<f64>, Point3<f64>)> = source
                .points
                .par_iter()
                .filter_map(|p| {
                    let q = current.transform_point(p);
                    let (j, d2) = target_index.nearest(&q)?;
                    (d2 <= max_dist_sq).then(|| (q, target.points[j]))
                })
                .collect();

            if pairs.len() < self.config.min_correspondences.max(3) {
                log::debug!(
                    "ICP: {} correspondences at iteration {}, giving up",
                    pairs.len(),
                    iterations
                );
                return self.finish(source, target_index, current, iterations, false);
            }

            let (moved, fixed): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
            let Some(delta) = estimate_rigid_transform(&moved, &fixed) else {
                return self.finish(source, target_index, current, iterations, false);
            };
            current = delta.compose(&current);

            let rotation_change = 1.0 - (delta.rotation_angle()).cos();
            if delta.translation.norm_squared() < self.config.tf_epsilon
                && rotation_change < self.config.tf_epsilon
            {
                converged = true;
                break;
            }
        }

        if !converged {
            log::debug!("ICP: iteration cap {} reached", self.config.iterations);
        }
        self.finish(source, target_index, current, iterations, true)
    }

    fn finish(
        &self,
        source: &PointCloud,
        target_index: &PointIndex,
        transform: Pose3,
        iterations: u32,
        converged: bool,
    ) -> IcpOutcome {
        let aligned = source.transform(&transform);
        let nearest: Vec<(usize, f64)> = aligned
            .points
            .par_iter()
            .map(|q| target_index.nearest(q).unwrap_or((0, f64::INFINITY)))
            .collect();

        let fitness = if nearest.is_empty() {
            f64::INFINITY
        } else {
            nearest.iter().map(|(_, d2)| d2).sum::<f64>() / nearest.len() as f64
        };

        log::debug!(
            "ICP: {} iteration(s), fitness {:.6}, converged {}",
            iterations,
            fitness,
            converged
        );

        IcpOutcome {
            transform,
            fitness,
            iterations,
            converged,
            correspondences: nearest.into_iter().map(|(j, _)| j).collect(),
            aligned,
        }
    }
}

/// Least-squares rigid transform `X` minimizing `Σ |X·sᵢ − tᵢ|²` (Kabsch).
///
/// `None` with fewer than three pairs or a failed SVD.
pub fn estimate_rigid_transform(source: &[Point3<f64>], target: &[Point3<f64>]) -> Option<Pose3> {
    if source.len() < 3 || source.len() != target.len() {
        return None;
    }

    let n = source.len() as f64;
    let cs = source.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;
    let ct = target.iter().fold(Vector3::zeros(), |acc, p| acc + p.coords) / n;

    // Cross-covariance H = Σ (tᵢ − ct)(sᵢ − cs)ᵀ
    let h = source
        .iter()
        .zip(target.iter())
        .fold(Matrix3::zeros(), |acc, (s, t)| acc + (t.coords - ct) * (s.coords - cs).transpose());

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;

    let mut rotation = u * v_t;
    if rotation.determinant() < 0.0 {
        let mut u_fixed = u;
        u_fixed.set_column(2, &(-u.column(2)));
        rotation = u_fixed * v_t;
    }

    let rotation = UnitQuaternion::from_matrix(&rotation);
    let translation = ct - rotation * cs;
    if !translation.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Pose3::new(rotation, translation))
}
