//! Loop closure vs. dead-reckoning check.

use nalgebra::Matrix6;

use crate::core::{Key, Pose3, PoseWithCovariance};
use crate::graph::OdometryTrajectory;

/// Outcome of a consistency test.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConsistencyCheck {
    /// Residual inside the threshold.
    Accepted {
        /// Squared Mahalanobis distance of the residual
        distance_sq: f64,
    },
    /// Residual outside the threshold (or not computable).
    Rejected {
        /// Squared Mahalanobis distance of the residual
        distance_sq: f64,
    },
    /// An endpoint is not on the odometry trajectory.
    UnknownKey(Key),
}

impl ConsistencyCheck {
    /// True for [`ConsistencyCheck::Accepted`].
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, ConsistencyCheck::Accepted { .. })
    }
}

/// Odometry-implied relative pose from `a` to `b`.
///
/// Keys may come in either order; the chain covariance is always taken from
/// the earlier key to the later one.
pub fn odometry_between(trajectory: &OdometryTrajectory, a: Key, b: Key) -> Option<PoseWithCovariance> {
    let pa = trajectory.get(a)?.pose;
    let pb = trajectory.get(b)?.pose;
    if a <= b {
        Some(pa.between(&pb))
    } else {
        Some(pb.between(&pa).inverse())
    }
}

/// Mahalanobis gate of a loop closure against the raw odometry chain.
#[derive(Debug, Clone)]
pub struct OdometricFilter {
    threshold: f64,
}

impl OdometricFilter {
    /// Create a filter with a squared-distance threshold.
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Threshold on the squared Mahalanobis distance.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Test `measured` (pose of `to` seen from `from`) against odometry.
    pub fn is_consistent(
        &self,
        trajectory: &OdometryTrajectory,
        from: Key,
        to: Key,
        measured: &Pose3,
        covariance: &Matrix6<f64>,
    ) -> ConsistencyCheck {
        for key in [from, to] {
            if !trajectory.contains(key) {
                return ConsistencyCheck::UnknownKey(key);
            }
        }
        let Some(odom) = odometry_between(trajectory, from, to) else {
            return ConsistencyCheck::UnknownKey(from);
        };

        let residual = odom.residual(&PoseWithCovariance::new(*measured, *covariance));
        let distance_sq = residual.mahalanobis_sq().unwrap_or(f64::INFINITY);

        log::debug!(
            "Odometric check {} -> {}: d² = {:.3} (threshold {:.3})",
            from,
            to,
            distance_sq,
            self.threshold
        );

        if distance_sq < self.threshold {
            ConsistencyCheck::Accepted { distance_sq }
        } else {
            ConsistencyCheck::Rejected { distance_sq }
        }
    }
}
