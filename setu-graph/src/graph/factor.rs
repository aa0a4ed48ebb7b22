//! Factors and the index-stable factor graph.
//!
//! # Error model
//!
//! Errors are 6-vectors `[e_ω, e_ρ]` matched to the optimizer's retraction
//! `T ⊕ δ = (R·Exp(δω), t + R·δρ)`:
//!
//! ```text
//! Prior(z):          e_ω = Log(Rzᵀ·R)
//!                    e_ρ = Rzᵀ·(t − tz)
//!
//! Between(i, j, z):  e_ω = Log(Rzᵀ·Riᵀ·Rj)
//!                    e_ρ = Rzᵀ·(Riᵀ·(tj − ti) − tz)
//! ```
//!
//! Jacobians (with `d = Riᵀ·(tj − ti)`):
//!
//! ```text
//! ∂e/∂xi = | −Jr⁻¹(e_ω)·Rjᵀ·Ri    0    |     ∂e/∂xj = | Jr⁻¹(e_ω)   0         |
//!          |  Rzᵀ·[d]×           −Rzᵀ  |              | 0           Rzᵀ·Riᵀ·Rj |
//! ```

use std::fmt;

use nalgebra::{Matrix3, Matrix6, Vector6};

use crate::core::math::{skew, so3_log, so3_right_jacobian_inv, stack};
use crate::core::{Key, Pose3};

/// Regularization used when a covariance is singular.
const COVARIANCE_FLOOR: f64 = 1e-9;

/// Stable index of a factor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactorIndex(pub usize);

impl fmt::Display for FactorIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind of constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FactorKind {
    /// Absolute pose on one key.
    Prior,
    /// Relative pose between consecutive keys.
    Odometry,
    /// Relative pose between non-adjacent keys.
    LoopClosure,
}

/// A probabilistic constraint on one or two poses.
#[derive(Debug, Clone, PartialEq)]
pub enum Factor {
    /// Absolute pose measurement.
    Prior {
        /// Constrained key
        key: Key,
        /// Measured pose
        pose: Pose3,
        /// Measurement covariance
        covariance: Matrix6<f64>,
    },
    /// Dead-reckoning step.
    Odometry {
        /// Source key
        from: Key,
        /// Target key
        to: Key,
        /// Measured relative pose
        pose: Pose3,
        /// Measurement covariance
        covariance: Matrix6<f64>,
    },
    /// Revisit constraint.
    LoopClosure {
        /// Source key
        from: Key,
        /// Target key
        to: Key,
        /// Measured relative pose
        pose: Pose3,
        /// Measurement covariance
        covariance: Matrix6<f64>,
    },
}

/// Error and per-key Jacobian blocks of one factor at the current estimate.
#[derive(Debug, Clone)]
pub struct Linearization {
    /// Error vector.
    pub error: Vector6<f64>,
    /// `(key, ∂e/∂x_key)` for each connected key.
    pub jacobians: Vec<(Key, Matrix6<f64>)>,
}

impl Factor {
    /// Prior factor.
    pub fn prior(key: Key, pose: Pose3, covariance: Matrix6<f64>) -> Self {
        Factor::Prior {
            key,
            pose,
            covariance,
        }
    }

    /// Odometry factor.
    pub fn odometry(from: Key, to: Key, pose: Pose3, covariance: Matrix6<f64>) -> Self {
        Factor::Odometry {
            from,
            to,
            pose,
            covariance,
        }
    }

    /// Loop-closure factor.
    pub fn loop_closure(from: Key, to: Key, pose: Pose3, covariance: Matrix6<f64>) -> Self {
        Factor::LoopClosure {
            from,
            to,
            pose,
            covariance,
        }
    }

    /// Kind of this factor.
    pub fn kind(&self) -> FactorKind {
        match self {
            Factor::Prior { .. } => FactorKind::Prior,
            Factor::Odometry { .. } => FactorKind::Odometry,
            Factor::LoopClosure { .. } => FactorKind::LoopClosure,
        }
    }

    /// Keys touched by this factor.
    pub fn keys(&self) -> Vec<Key> {
        match self {
            Factor::Prior { key, .. } => vec![*key],
            Factor::Odometry { from, to, .. } | Factor::LoopClosure { from, to, .. } => {
                vec![*from, *to]
            }
        }
    }

    /// `(from, to)` for relative factors.
    pub fn endpoints(&self) -> Option<(Key, Key)> {
        match self {
            Factor::Prior { .. } => None,
            Factor::Odometry { from, to, .. } | Factor::LoopClosure { from, to, .. } => {
                Some((*from, *to))
            }
        }
    }

    /// Measured pose.
    pub fn measurement(&self) -> &Pose3 {
        match self {
            Factor::Prior { pose, .. }
            | Factor::Odometry { pose, .. }
            | Factor::LoopClosure { pose, .. } => pose,
        }
    }

    /// Measurement covariance.
    pub fn covariance(&self) -> &Matrix6<f64> {
        match self {
            Factor::Prior { covariance, .. }
            | Factor::Odometry { covariance, .. }
            | Factor::LoopClosure { covariance, .. } => covariance,
        }
    }

    /// Information matrix (inverse covariance).
    ///
    /// A singular covariance is floored before inversion.
    pub fn information(&self) -> Matrix6<f64> {
        let cov = self.covariance();
        cov.try_inverse()
            .filter(|m| m.iter().all(|v| v.is_finite()))
            .or_else(|| (cov + Matrix6::identity() * COVARIANCE_FLOOR).try_inverse())
            .unwrap_or_else(|| Matrix6::identity() / COVARIANCE_FLOOR)
    }

    /// Error at the given poses. `xj` is ignored for priors.
    pub fn error(&self, xi: &Pose3, xj: Option<&Pose3>) -> Vector6<f64> {
        match (self, xj) {
            (Factor::Prior { pose, .. }, _) => prior_error(pose, xi),
            (_, Some(xj)) => between_error(self.measurement(), xi, xj),
            (_, None) => Vector6::zeros(),
        }
    }

    /// Error and Jacobians at the given poses. `xj` is ignored for priors.
    pub fn linearize(&self, xi: &Pose3, xj: Option<&Pose3>) -> Option<Linearization> {
        match self {
            Factor::Prior { key, pose, .. } => {
                let error = prior_error(pose, xi);
                let rz_t = pose.rotation_matrix().transpose();
                let mut j = Matrix6::zeros();
                j.fixed_view_mut::<3, 3>(0, 0)
                    .copy_from(&so3_right_jacobian_inv(&error.fixed_rows::<3>(0).into_owned()));
                j.fixed_view_mut::<3, 3>(3, 3)
                    .copy_from(&(rz_t * xi.rotation_matrix()));
                Some(Linearization {
                    error,
                    jacobians: vec![(*key, j)],
                })
            }
            Factor::Odometry { from, to, pose, .. } | Factor::LoopClosure { from, to, pose, .. } => {
                let xj = xj?;
                let error = between_error(pose, xi, xj);
                let (ji, jj) = between_jacobians(pose, xi, xj, &error);
                Some(Linearization {
                    error,
                    jacobians: vec![(*from, ji), (*to, jj)],
                })
            }
        }
    }
}

fn prior_error(measured: &Pose3, x: &Pose3) -> Vector6<f64> {
    let e_rot = so3_log(&(measured.rotation.inverse() * x.rotation));
    let e_trans = measured.rotation.inverse() * (x.translation - measured.translation);
    stack(&e_rot, &e_trans)
}

fn between_error(measured: &Pose3, xi: &Pose3, xj: &Pose3) -> Vector6<f64> {
    let predicted = xi.between(xj);
    let e_rot = so3_log(&(measured.rotation.inverse() * predicted.rotation));
    let e_trans = measured.rotation.inverse() * (predicted.translation - measured.translation);
    stack(&e_rot, &e_trans)
}

fn between_jacobians(
    measured: &Pose3,
    xi: &Pose3,
    xj: &Pose3,
    error: &Vector6<f64>,
) -> (Matrix6<f64>, Matrix6<f64>) {
    let ri = xi.rotation_matrix();
    let rj = xj.rotation_matrix();
    let rz_t: Matrix3<f64> = measured.rotation_matrix().transpose();
    let jr_inv = so3_right_jacobian_inv(&error.fixed_rows::<3>(0).into_owned());
    let d = ri.transpose() * (xj.translation - xi.translation);

    let mut ji = Matrix6::zeros();
    ji.fixed_view_mut::<3, 3>(0, 0)
        .copy_from(&(-jr_inv * rj.transpose() * ri));
    ji.fixed_view_mut::<3, 3>(3, 0)
        .copy_from(&(rz_t * skew(&d)));
    ji.fixed_view_mut::<3, 3>(3, 3).copy_from(&(-rz_t));

    let mut jj = Matrix6::zeros();
    jj.fixed_view_mut::<3, 3>(0, 0).copy_from(&jr_inv);
    jj.fixed_view_mut::<3, 3>(3, 3)
        .copy_from(&(rz_t * ri.transpose() * rj));

    (ji, jj)
}

/// Append-mostly factor store.
///
/// Removal empties a slot; indices of the remaining factors never change.
#[derive(Debug, Clone, Default)]
pub struct FactorGraph {
    slots: Vec<Option<Factor>>,
}

impl FactorGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a factor, returning its stable index.
    pub fn add(&mut self, factor: Factor) -> FactorIndex {
        self.slots.push(Some(factor));
        FactorIndex(self.slots.len() - 1)
    }

    /// Invalidate a slot. Returns the factor that was there, if any.
    pub fn remove(&mut self, index: FactorIndex) -> Option<Factor> {
        self.slots.get_mut(index.0).and_then(Option::take)
    }

    /// Factor at `index` unless removed.
    pub fn get(&self, index: FactorIndex) -> Option<&Factor> {
        self.slots.get(index.0).and_then(Option::as_ref)
    }

    /// True if `index` was ever allocated.
    pub fn has_slot(&self, index: FactorIndex) -> bool {
        index.0 < self.slots.len()
    }

    /// Number of slots, including removed ones.
    pub fn num_slots(&self) -> usize {
        self.slots.len()
    }

    /// Number of live factors.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// True if no live factors remain.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live factors with their indices.
    pub fn iter(&self) -> impl Iterator<Item = (FactorIndex, &Factor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|f| (FactorIndex(i), f)))
    }
}
