//! Alignment covariance models.
//!
//! Both data-driven models linearize the residual of a left perturbation
//! `[ω, ρ]` of the aligned points `p'`:
//!
//! ```text
//! point-to-point:  J = [−[p']×, I]    H = Σ JᵀJ     Σ = H⁻¹ · fitness
//! point-to-plane:  J = [p' × n, nᵀ]   A = Σ JᵀJ     Σ = σ² · A⁻¹
//! ```
//!
//! Either result is then eigen-clamped into `[lower, upper]`.

use nalgebra::{Matrix6, Point3, RowVector6, SymmetricEigen, Vector3};

use super::normals::SurfaceNormal;
use crate::core::PoseWithCovariance;
use crate::core::math::skew;

/// Covariance with a flag for the fail-closed fallback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CovarianceEstimate {
    /// 6x6 covariance over `[ω, ρ]`.
    pub covariance: Matrix6<f64>,
    /// True if estimation failed and `I·upper` was substituted.
    pub degraded: bool,
}

impl CovarianceEstimate {
    /// Maximum-uncertainty fallback.
    pub fn degraded(upper: f64) -> Self {
        Self {
            covariance: Matrix6::identity() * upper,
            degraded: true,
        }
    }

    /// Diagonal covariance from fixed sigmas.
    pub fn fixed(rot_sigma: f64, trans_sigma: f64) -> Self {
        Self {
            covariance: PoseWithCovariance::diagonal_covariance(rot_sigma, trans_sigma),
            degraded: false,
        }
    }
}

/// Clamp eigenvalues of a symmetric matrix into `[lower, upper]`.
///
/// `None` if the decomposition yields non-finite values.
pub fn clamp_eigenvalues(covariance: &Matrix6<f64>, lower: f64, upper: f64) -> Option<Matrix6<f64>> {
    if !covariance.iter().all(|v| v.is_finite()) {
        return None;
    }
    let symmetric = (covariance + covariance.transpose()) * 0.5;
    let eigen = SymmetricEigen::new(symmetric);
    if !eigen.eigenvalues.iter().all(|v| v.is_finite())
        || !eigen.eigenvectors.iter().all(|v| v.is_finite())
    {
        return None;
    }

    let clamped = eigen.eigenvalues.map(|v| v.clamp(lower, upper));
    let v = eigen.eigenvectors;
    Some(v * Matrix6::from_diagonal(&clamped) * v.transpose())
}

/// Point-to-point model on the aligned source points.
pub fn point_to_point(aligned: &[Point3<f64>], fitness: f64, lower: f64, upper: f64) -> CovarianceEstimate {
    let mut h = Matrix6::zeros();
    for p in aligned {
        let mut j = nalgebra::Matrix3x6::zeros();
        j.fixed_view_mut::<3, 3>(0, 0).copy_from(&(-skew(&p.coords)));
        j.fixed_view_mut::<3, 3>(0, 3).copy_from(&nalgebra::Matrix3::identity());
        h += j.transpose() * j;
    }

    finish(h.try_inverse().map(|inv| inv * fitness), lower, upper)
}

/// Point-to-plane model using target normals at the matched points.
///
/// `correspondences[i]` is the target index matched to `aligned[i]`.
pub fn point_to_plane(
    aligned: &[Point3<f64>],
    correspondences: &[usize],
    target_normals: &[Option<SurfaceNormal>],
    sigma: f64,
    lower: f64,
    upper: f64,
) -> CovarianceEstimate {
    let mut a = Matrix6::zeros();
    for (p, j) in aligned.iter().zip(correspondences) {
        let Some(normal) = target_normals.get(*j).copied().flatten() else {
            continue;
        };
        let n: Vector3<f64> = normal.normal;
        let c = p.coords.cross(&n);
        let row = RowVector6::new(c.x, c.y, c.z, n.x, n.y, n.z);
        a += row.transpose() * row;
    }

    finish(a.try_inverse().map(|inv| inv * (sigma * sigma)), lower, upper)
}

fn finish(covariance: Option<Matrix6<f64>>, lower: f64, upper: f64) -> CovarianceEstimate {
    match covariance.and_then(|c| clamp_eigenvalues(&c, lower, upper)) {
        Some(covariance) => CovarianceEstimate {
            covariance,
            degraded: false,
        },
        None => {
            log::error!("Failed to compute alignment covariance, using I·{}", upper);
            CovarianceEstimate::degraded(upper)
        }
    }
}
