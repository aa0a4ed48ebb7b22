//! Poses carrying a 6x6 tangent-space covariance.
//!
//! Covariances live in the local tangent of the pose, ordered `[ω, ρ]`.
//! First-order propagation through the group operations:
//!
//! ```text
//! compose(a, b):   c = a·b      Σc = Ad(b⁻¹)·Σa·Ad(b⁻¹)ᵀ + Σb
//! between(a, b):   r = a⁻¹·b    Σr = Σb − Ad(r⁻¹)·Σa·Ad(r⁻¹)ᵀ
//! residual(a, b):  r = a⁻¹·b    Σr = Ad(r⁻¹)·Σa·Ad(r⁻¹)ᵀ + Σb
//! inverse(a):      a⁻¹          Σ  = Ad(a)·Σa·Ad(a)ᵀ
//! ```
//!
//! `between` undoes `compose` along one odometry chain, where the later pose
//! already contains the uncertainty of the earlier one. `residual` compares two
//! independent estimates and is what hypothesis tests use.

use nalgebra::{Matrix6, Vector6};

use super::math::symmetrize;
use super::pose::Pose3;

/// Regularization added before inverting a covariance for a Mahalanobis test.
const INFORMATION_EPSILON: f64 = 1e-9;

/// A pose with its 6x6 covariance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseWithCovariance {
    /// Mean pose.
    pub pose: Pose3,
    /// Covariance over `[ω, ρ]`.
    pub covariance: Matrix6<f64>,
}

impl PoseWithCovariance {
    /// Create from pose and covariance.
    #[inline]
    pub fn new(pose: Pose3, covariance: Matrix6<f64>) -> Self {
        Self { pose, covariance }
    }

    /// Pose with zero uncertainty.
    #[inline]
    pub fn certain(pose: Pose3) -> Self {
        Self {
            pose,
            covariance: Matrix6::zeros(),
        }
    }

    /// Identity pose with zero uncertainty.
    #[inline]
    pub fn identity() -> Self {
        Self::certain(Pose3::identity())
    }

    /// Diagonal covariance from rotation and translation standard deviations.
    pub fn diagonal_covariance(rot_sigma: f64, trans_sigma: f64) -> Matrix6<f64> {
        let r = rot_sigma * rot_sigma;
        let t = trans_sigma * trans_sigma;
        Matrix6::from_diagonal(&Vector6::new(r, r, r, t, t, t))
    }

    /// Chain `other` after `self`.
    pub fn compose(&self, other: &PoseWithCovariance) -> PoseWithCovariance {
        let ad = other.pose.inverse().adjoint();
        PoseWithCovariance {
            pose: self.pose.compose(&other.pose),
            covariance: symmetrize(&(ad * self.covariance * ad.transpose() + other.covariance)),
        }
    }

    /// Relative pose from `self` to `other` along a shared chain.
    ///
    /// Inverse of [`compose`](Self::compose): `a.between(&a.compose(&b)) == b`.
    pub fn between(&self, other: &PoseWithCovariance) -> PoseWithCovariance {
        let relative = self.pose.between(&other.pose);
        let ad = relative.inverse().adjoint();
        PoseWithCovariance {
            pose: relative,
            covariance: symmetrize(&(other.covariance - ad * self.covariance * ad.transpose())),
        }
    }

    /// Relative pose from `self` to `other` for independent estimates.
    pub fn residual(&self, other: &PoseWithCovariance) -> PoseWithCovariance {
        let relative = self.pose.between(&other.pose);
        let ad = relative.inverse().adjoint();
        PoseWithCovariance {
            pose: relative,
            covariance: symmetrize(&(ad * self.covariance * ad.transpose() + other.covariance)),
        }
    }

    /// Inverse pose with transported covariance.
    pub fn inverse(&self) -> PoseWithCovariance {
        let ad = self.pose.adjoint();
        PoseWithCovariance {
            pose: self.pose.inverse(),
            covariance: symmetrize(&(ad * self.covariance * ad.transpose())),
        }
    }

    /// Squared Mahalanobis norm of this pose's logarithm under its own covariance.
    ///
    /// Returns `None` when the covariance cannot be inverted even after
    /// regularization.
    pub fn mahalanobis_sq(&self) -> Option<f64> {
        let error = self.pose.logmap();
        if error.iter().all(|e| *e == 0.0) {
            return Some(0.0);
        }
        let information =
            (self.covariance + Matrix6::identity() * INFORMATION_EPSILON).try_inverse()?;
        let d2 = (error.transpose() * information * error)[(0, 0)];
        d2.is_finite().then_some(d2)
    }
}
