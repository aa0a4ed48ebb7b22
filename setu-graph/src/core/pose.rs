//! Rigid 3D pose.

use nalgebra::{Matrix3, Matrix4, Matrix6, Point3, Translation3, UnitQuaternion, Vector3, Vector6};

use super::math;

/// Rigid transform in 3D: unit-quaternion rotation plus translation in meters.
///
/// Poses are plain values. Operations return new poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose3 {
    /// Rotation (body to world).
    pub rotation: UnitQuaternion<f64>,
    /// Translation in meters.
    pub translation: Vector3<f64>,
}

impl Default for Pose3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose3 {
    /// Create a pose from its parts.
    #[inline]
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// Identity transform.
    #[inline]
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Create from translation and roll/pitch/yaw (radians).
    pub fn from_xyz_rpy(x: f64, y: f64, z: f64, roll: f64, pitch: f64, yaw: f64) -> Self {
        Self {
            rotation: UnitQuaternion::from_euler_angles(roll, pitch, yaw),
            translation: Vector3::new(x, y, z),
        }
    }

    /// Pure translation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::new(x, y, z),
        }
    }

    /// Build from a 4x4 homogeneous matrix.
    ///
    /// The rotation block is re-orthonormalized.
    pub fn from_homogeneous(m: &Matrix4<f64>) -> Self {
        let r: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
        let t: Vector3<f64> = m.fixed_view::<3, 1>(0, 3).into_owned();
        Self {
            rotation: UnitQuaternion::from_matrix(&r),
            translation: t,
        }
    }

    /// 4x4 homogeneous matrix.
    pub fn to_homogeneous(&self) -> Matrix4<f64> {
        (Translation3::from(self.translation) * self.rotation).to_homogeneous()
    }

    /// Rotation as a 3x3 matrix.
    #[inline]
    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.to_rotation_matrix().into_inner()
    }

    /// Compose two poses: `self ⊕ other`.
    ///
    /// ```text
    /// C = A ⊕ B:
    ///   C.R = A.R · B.R
    ///   C.t = A.t + A.R · B.t
    /// ```
    #[inline]
    pub fn compose(&self, other: &Pose3) -> Pose3 {
        Pose3 {
            rotation: self.rotation * other.rotation,
            translation: self.translation + self.rotation * other.translation,
        }
    }

    /// Inverse transform.
    #[inline]
    pub fn inverse(&self) -> Pose3 {
        let inv = self.rotation.inverse();
        Pose3 {
            rotation: inv,
            translation: -(inv * self.translation),
        }
    }

    /// Relative pose from `self` to `other`: `self⁻¹ ⊕ other`.
    #[inline]
    pub fn between(&self, other: &Pose3) -> Pose3 {
        self.inverse().compose(other)
    }

    /// Map a point from this frame into the parent frame.
    #[inline]
    pub fn transform_point(&self, p: &Point3<f64>) -> Point3<f64> {
        Point3::from(self.rotation * p.coords + self.translation)
    }

    /// Rotate a direction vector (no translation).
    #[inline]
    pub fn rotate_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    /// SE(3) exponential of a tangent vector `[ω, ρ]`.
    pub fn expmap(xi: &Vector6<f64>) -> Pose3 {
        let (rotation, translation) = math::se3_exp(xi);
        Pose3 {
            rotation,
            translation,
        }
    }

    /// SE(3) logarithm, returning `[ω, ρ]`.
    pub fn logmap(&self) -> Vector6<f64> {
        math::se3_log(&self.rotation, &self.translation)
    }

    /// Right retraction used by the optimizer.
    ///
    /// ```text
    /// T ⊕ δ = (R · Exp(δω), t + R · δρ)
    /// ```
    ///
    /// Agrees with `T · Exp_SE3(δ)` to first order.
    pub fn retract(&self, delta: &Vector6<f64>) -> Pose3 {
        let omega = delta.fixed_rows::<3>(0).into_owned();
        let rho = delta.fixed_rows::<3>(3).into_owned();
        Pose3 {
            rotation: self.rotation * math::so3_exp(&omega),
            translation: self.translation + self.rotation * rho,
        }
    }

    /// Adjoint matrix in the `[ω, ρ]` ordering.
    pub fn adjoint(&self) -> Matrix6<f64> {
        math::adjoint(&self.rotation_matrix(), &self.translation)
    }

    /// Rotation angle in radians, in `[0, π]`.
    #[inline]
    pub fn rotation_angle(&self) -> f64 {
        self.rotation.angle()
    }

    /// Translation norm in meters.
    #[inline]
    pub fn translation_norm(&self) -> f64 {
        self.translation.norm()
    }

    /// Approximate equality on rotation angle and translation distance.
    pub fn is_close(&self, other: &Pose3, tolerance: f64) -> bool {
        let delta = self.between(other);
        delta.rotation_angle() < tolerance && delta.translation_norm() < tolerance
    }
}
