//! Surface normals by local PCA.
//!
//! For each point the covariance of its radius neighborhood is decomposed;
//! the eigenvector of the smallest eigenvalue is the normal and
//!
//! ```text
//! curvature = λ₀ / (λ₀ + λ₁ + λ₂)        λ₀ ≤ λ₁ ≤ λ₂
//! ```
//!
//! Normals are flipped to face the sensor origin.

use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;

use super::kdtree::PointIndex;
use crate::core::PointCloud;

/// Fewest neighbors (including the point itself) for a usable normal.
const MIN_NEIGHBORS: usize = 3;

/// Normal and surface variation of one point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceNormal {
    /// Unit normal.
    pub normal: Vector3<f64>,
    /// Surface variation in `[0, 1/3]`.
    pub curvature: f64,
}

/// Estimate a normal for every point. `None` where the neighborhood is too
/// small or degenerate.
pub fn estimate_normals(cloud: &PointCloud, index: &PointIndex, radius: f64) -> Vec<Option<SurfaceNormal>> {
    cloud
        .points
        .par_iter()
        .map(|p| {
            let neighbors = index.within(p, radius);
            normal_from_neighbors(p, &neighbors, &cloud.points)
        })
        .collect()
}

fn normal_from_neighbors(
    point: &Point3<f64>,
    neighbors: &[usize],
    points: &[Point3<f64>],
) -> Option<SurfaceNormal> {
    if neighbors.len() < MIN_NEIGHBORS {
        return None;
    }

    let n = neighbors.len() as f64;
    let centroid = neighbors
        .iter()
        .fold(Vector3::zeros(), |acc, i| acc + points[*i].coords)
        / n;
    let covariance = neighbors.iter().fold(Matrix3::zeros(), |acc, i| {
        let d = points[*i].coords - centroid;
        acc + d * d.transpose()
    }) / n;

    let eigen = SymmetricEigen::new(covariance);
    let (smallest, _) = eigen
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|a, b| a.1.total_cmp(b.1))?;
    let mut normal: Vector3<f64> = eigen.eigenvectors.column(smallest).into_owned();
    let norm = normal.norm();
    if !norm.is_finite() || norm < 1e-12 {
        return None;
    }
    normal /= norm;

    // Face the sensor origin
    if normal.dot(&(-point.coords)) < 0.0 {
        normal = -normal;
    }

    let trace = eigen.eigenvalues.sum();
    let curvature = if trace > 0.0 {
        eigen.eigenvalues[smallest] / trace
    } else {
        0.0
    };

    Some(SurfaceNormal { normal, curvature })
}
