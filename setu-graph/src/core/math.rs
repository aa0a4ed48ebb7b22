//! Lie-group helpers for SO(3) and SE(3).
//!
//! All 6-vectors use the `[ω, ρ]` ordering: rotation first, translation second.
//!
//! ```text
//! Exp_SO3(ω) = I + sinθ/θ·[ω]× + (1-cosθ)/θ²·[ω]×²        θ = |ω|
//! V(ω)       = I + (1-cosθ)/θ²·[ω]× + (θ-sinθ)/θ³·[ω]×²
//! Exp_SE3(ω, ρ) = (Exp_SO3(ω), V(ω)·ρ)
//! ```

use nalgebra::{Matrix3, Matrix6, UnitQuaternion, Vector3, Vector6};

/// Below this rotation angle the closed forms switch to Taylor expansions.
pub const SMALL_ANGLE_THRESHOLD: f64 = 1e-6;

/// Skew-symmetric matrix such that `skew(a) * b == a × b`.
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(0.0, -v.z, v.y, v.z, 0.0, -v.x, -v.y, v.x, 0.0)
}

/// SO(3) exponential map.
#[inline]
pub fn so3_exp(omega: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_scaled_axis(*omega)
}

/// SO(3) logarithm map, angle in `[0, π]`.
#[inline]
pub fn so3_log(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
    rotation.scaled_axis()
}

/// Inverse of the SO(3) right Jacobian.
///
/// ```text
/// Jr⁻¹(φ) = I + ½[φ]× + (1/θ² − (1+cosθ)/(2θ·sinθ))·[φ]×²
/// ```
pub fn so3_right_jacobian_inv(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();
    let w = skew(phi);
    let w2 = w * w;

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() + 0.5 * w + w2 / 12.0;
    }

    let (sin_t, cos_t) = theta.sin_cos();
    let coeff = 1.0 / (theta * theta) - (1.0 + cos_t) / (2.0 * theta * sin_t);
    Matrix3::identity() + 0.5 * w + coeff * w2
}

/// Left Jacobian of SO(3), the `V` matrix of the SE(3) exponential.
pub fn so3_left_jacobian(omega: &Vector3<f64>) -> Matrix3<f64> {
    let theta = omega.norm();
    let w = skew(omega);
    let w2 = w * w;

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() + 0.5 * w + w2 / 6.0;
    }

    let theta2 = theta * theta;
    let (sin_t, cos_t) = theta.sin_cos();
    Matrix3::identity() + (1.0 - cos_t) / theta2 * w + (theta - sin_t) / (theta2 * theta) * w2
}

/// Inverse of [`so3_left_jacobian`].
pub fn so3_left_jacobian_inv(omega: &Vector3<f64>) -> Matrix3<f64> {
    let theta = omega.norm();
    let w = skew(omega);
    let w2 = w * w;

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() - 0.5 * w + w2 / 12.0;
    }

    let (sin_t, cos_t) = theta.sin_cos();
    let coeff = (1.0 - theta * sin_t / (2.0 * (1.0 - cos_t))) / (theta * theta);
    Matrix3::identity() - 0.5 * w + coeff * w2
}

/// SE(3) exponential map of `[ω, ρ]`.
pub fn se3_exp(xi: &Vector6<f64>) -> (UnitQuaternion<f64>, Vector3<f64>) {
    let omega = xi.fixed_rows::<3>(0).into_owned();
    let rho = xi.fixed_rows::<3>(3).into_owned();
    (so3_exp(&omega), so3_left_jacobian(&omega) * rho)
}

/// SE(3) logarithm map, returning `[ω, ρ]`.
pub fn se3_log(rotation: &UnitQuaternion<f64>, translation: &Vector3<f64>) -> Vector6<f64> {
    let omega = so3_log(rotation);
    let rho = so3_left_jacobian_inv(&omega) * translation;
    stack(&omega, &rho)
}

/// Adjoint of `(R, t)` in the rotation-first ordering.
///
/// ```text
/// Ad = | R       0 |
///      | [t]×R   R |
/// ```
pub fn adjoint(rotation: &Matrix3<f64>, translation: &Vector3<f64>) -> Matrix6<f64> {
    let mut ad = Matrix6::zeros();
    ad.fixed_view_mut::<3, 3>(0, 0).copy_from(rotation);
    ad.fixed_view_mut::<3, 3>(3, 3).copy_from(rotation);
    ad.fixed_view_mut::<3, 3>(3, 0)
        .copy_from(&(skew(translation) * rotation));
    ad
}

/// Concatenate rotation and translation parts into a tangent vector.
#[inline]
pub fn stack(omega: &Vector3<f64>, rho: &Vector3<f64>) -> Vector6<f64> {
    Vector6::new(omega.x, omega.y, omega.z, rho.x, rho.y, rho.z)
}

/// Force exact symmetry on a covariance that picked up round-off.
#[inline]
pub fn symmetrize(m: &Matrix6<f64>) -> Matrix6<f64> {
    (m + m.transpose()) * 0.5
}
