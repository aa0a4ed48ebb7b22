//! Harris-3D keypoints.
//!
//! The corner measure is built from the spread of surface normals around a
//! point, `C = (1/k)·Σ nᵢ·nᵢᵀ` over its radius neighbors. Planar regions give
//! a rank-1 `C`, edges rank 2, corners rank 3.
//!
//! The Harris measure is `k + det(C) − k·trace(C)²`. The constant `k` offset
//! matches PCL's `HarrisKeypoint3D`, so thresholds carry over unchanged. With
//! unit normals `trace(C) = 1` and the measure reduces to `det(C)`.

use nalgebra::{Matrix3, SymmetricEigen, Vector3};
use rayon::prelude::*;

use super::kdtree::PointIndex;
use super::normals::SurfaceNormal;
use super::{HarrisConfig, HarrisResponse};
use crate::core::PointCloud;

const HARRIS_K: f64 = 0.04;
const MIN_NORMALS: usize = 3;

/// Detect keypoints, returned as sorted indices into `cloud`.
pub fn harris_keypoints(
    cloud: &PointCloud,
    index: &PointIndex,
    normals: &[Option<SurfaceNormal>],
    config: &HarrisConfig,
) -> Vec<usize> {
    let neighborhoods: Vec<Vec<usize>> = cloud
        .points
        .par_iter()
        .map(|p| index.within(p, config.radius))
        .collect();

    let responses: Vec<Option<f64>> = neighborhoods
        .par_iter()
        .enumerate()
        .map(|(i, neighbors)| response(i, neighbors, normals, config.response))
        .collect();

    let mut keypoints: Vec<usize> = (0..cloud.len())
        .into_par_iter()
        .filter(|i| {
            let Some(r) = responses[*i] else {
                return false;
            };
            if r <= config.threshold {
                return false;
            }
            !config.suppression
                || neighborhoods[*i]
                    .iter()
                    .all(|j| responses[*j].is_none_or(|rj| rj <= r))
        })
        .collect();

    if config.refine {
        keypoints = keypoints
            .into_iter()
            .map(|i| refine(i, &neighborhoods[i], cloud, normals, index))
            .collect();
        keypoints.sort_unstable();
        keypoints.dedup();
    }

    log::debug!("Harris-3D: {} keypoints from {} points", keypoints.len(), cloud.len());
    keypoints
}

fn normal_covariance(neighbors: &[usize], normals: &[Option<SurfaceNormal>]) -> Option<Matrix3<f64>> {
    let (sum, count) = neighbors
        .iter()
        .filter_map(|j| normals[*j].as_ref())
        .fold((Matrix3::zeros(), 0usize), |(acc, n), s| {
            (acc + s.normal * s.normal.transpose(), n + 1)
        });
    (count >= MIN_NORMALS).then(|| sum / count as f64)
}

fn response(
    i: usize,
    neighbors: &[usize],
    normals: &[Option<SurfaceNormal>],
    method: HarrisResponse,
) -> Option<f64> {
    let own = normals[i]?;
    let c = normal_covariance(neighbors, normals)?;
    let trace = c.trace();
    let det = c.determinant();

    let r = match method {
        HarrisResponse::Harris => HARRIS_K + det - HARRIS_K * trace * trace,
        HarrisResponse::Noble => (trace > 0.0).then(|| det / trace)?,
        HarrisResponse::Lowe => (trace > 0.0).then(|| det / (trace * trace))?,
        HarrisResponse::Tomasi => SymmetricEigen::new(c).eigenvalues.min(),
        HarrisResponse::Curvature => own.curvature,
    };
    r.is_finite().then_some(r)
}

/// Move a keypoint to the least-squares intersection of its neighbors' tangent
/// planes, then snap to the nearest cloud point.
fn refine(
    i: usize,
    neighbors: &[usize],
    cloud: &PointCloud,
    normals: &[Option<SurfaceNormal>],
    index: &PointIndex,
) -> usize {
    let mut a = Matrix3::zeros();
    let mut b = Vector3::zeros();
    for j in neighbors {
        if let Some(s) = normals[*j] {
            let nnt = s.normal * s.normal.transpose();
            a += nnt;
            b += nnt * cloud.points[*j].coords;
        }
    }

    let Some(corner) = a.try_inverse().map(|inv| inv * b) else {
        return i;
    };
    if !corner.iter().all(|v| v.is_finite()) {
        return i;
    }
    index
        .nearest(&corner.into())
        .map_or(i, |(nearest, _)| nearest)
}
