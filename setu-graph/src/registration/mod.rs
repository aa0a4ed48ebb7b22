//! Geometric loop-closure verification by scan registration.
//!
//! ```text
//! scan_a, scan_b
//!   │
//!   ├─ initial guess     identity | odometry | odometry rotation | features
//!   │                    (normals ─► Harris-3D ─► FPFH ─► SAC-IA)
//!   ├─ point-to-point ICP on a kd-tree of scan_b
//!   ├─ covariance        fixed | point-to-point | point-to-plane, eigen-clamped
//!   └─ invert            ICP maps a into b; the edge is a → b
//! ```
//!
//! Per-point work (correspondences, normals, keypoints, descriptors) runs on
//! a rayon pool owned by the [`ScanAligner`].

mod aligner;
pub mod covariance;
pub mod fpfh;
pub mod icp;
pub mod keypoints;
mod kdtree;
pub mod normals;
pub mod sac_ia;

use nalgebra::Matrix6;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::defaults;
use crate::core::{Key, Pose3};

pub use aligner::ScanAligner;
pub use covariance::{CovarianceEstimate, clamp_eigenvalues};
pub use icp::{IcpOutcome, PointToPointIcp};
pub use kdtree::PointIndex;

/// How ICP is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitMethod {
    /// Start from the identity.
    Identity,
    /// Start from the odometry-implied relative pose.
    Odometry,
    /// Odometry rotation, zero translation.
    OdometryRotation,
    /// Feature-based SAC-IA alignment.
    Features,
}

/// How the alignment covariance is estimated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CovarianceMethod {
    /// Inverse point-to-point Hessian scaled by fitness.
    PointToPoint,
    /// Inverse point-to-plane information scaled by a fixed sigma.
    PointToPlane,
}

/// Harris-3D corner response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarrisResponse {
    /// `k + det(C) − k·trace(C)²` with `k = 0.04`. The constant offset keeps
    /// thresholds on PCL's scale.
    Harris,
    /// `det(C) / trace(C)`
    Noble,
    /// `det(C) / trace(C)²`
    Lowe,
    /// Smallest eigenvalue of `C`.
    Tomasi,
    /// Surface variation of the point's own normal estimate.
    Curvature,
}

/// ICP parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IcpConfig {
    /// Convergence bound on the squared incremental transform.
    #[serde(default = "defaults::icp_tf_epsilon")]
    pub tf_epsilon: f64,

    /// Maximum correspondence distance (meters).
    #[serde(default = "defaults::icp_corr_dist")]
    pub corr_dist: f64,

    /// Maximum iterations.
    #[serde(default = "defaults::icp_iterations")]
    pub iterations: u32,

    /// Worker threads for per-point work.
    #[serde(default = "defaults::icp_threads")]
    pub threads: usize,

    /// Fewer correspondences than this fails the alignment.
    #[serde(default = "defaults::icp_min_correspondences")]
    pub min_correspondences: usize,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            tf_epsilon: defaults::icp_tf_epsilon(),
            corr_dist: defaults::icp_corr_dist(),
            iterations: defaults::icp_iterations(),
            threads: defaults::icp_threads(),
            min_correspondences: defaults::icp_min_correspondences(),
        }
    }
}

/// SAC-IA and descriptor parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SacConfig {
    /// Sampling iterations.
    #[serde(default = "defaults::sac_iterations")]
    pub iterations: u32,

    /// Neighborhood radius for normal estimation (meters).
    #[serde(default = "defaults::sac_normals_radius")]
    pub normals_radius: f64,

    /// Neighborhood radius for FPFH (meters).
    #[serde(default = "defaults::sac_features_radius")]
    pub features_radius: f64,

    /// Alignments at or above this fitness are rejected. Fitness is the mean
    /// squared distance from transformed source keypoints to the nearest
    /// target keypoint, not to the dense target scan.
    #[serde(default = "defaults::sac_fitness_score_threshold")]
    pub fitness_score_threshold: f64,

    /// Minimum distance between sampled keypoints (meters).
    #[serde(default = "defaults::sac_min_sample_distance")]
    pub min_sample_distance: f64,

    /// Random pick among this many nearest descriptors.
    #[serde(default = "defaults::sac_correspondence_randomness")]
    pub correspondence_randomness: usize,

    /// RNG seed, so verification is reproducible.
    #[serde(default = "defaults::sac_seed")]
    pub seed: u64,
}

impl Default for SacConfig {
    fn default() -> Self {
        Self {
            iterations: defaults::sac_iterations(),
            normals_radius: defaults::sac_normals_radius(),
            features_radius: defaults::sac_features_radius(),
            fitness_score_threshold: defaults::sac_fitness_score_threshold(),
            min_sample_distance: defaults::sac_min_sample_distance(),
            correspondence_randomness: defaults::sac_correspondence_randomness(),
            seed: defaults::sac_seed(),
        }
    }
}

/// Harris-3D keypoint parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarrisConfig {
    /// Minimum response.
    #[serde(default = "defaults::harris_threshold")]
    pub threshold: f64,

    /// Keep only local response maxima.
    #[serde(default = "defaults::enabled")]
    pub suppression: bool,

    /// Neighborhood radius (meters).
    #[serde(default = "defaults::harris_radius")]
    pub radius: f64,

    /// Snap keypoints toward the corner implied by neighbor normals.
    #[serde(default = "defaults::disabled")]
    pub refine: bool,

    /// Response function.
    #[serde(default = "defaults::harris_response")]
    pub response: HarrisResponse,
}

impl Default for HarrisConfig {
    fn default() -> Self {
        Self {
            threshold: defaults::harris_threshold(),
            suppression: defaults::enabled(),
            radius: defaults::harris_radius(),
            refine: defaults::disabled(),
            response: defaults::harris_response(),
        }
    }
}

/// Fixed loop-closure covariance, bypassing the data-driven models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedCovarianceConfig {
    /// Use the fixed covariance.
    #[serde(default = "defaults::disabled")]
    pub enabled: bool,

    /// Rotation standard deviation (radians).
    #[serde(default = "defaults::rot_sigma")]
    pub rot_sigma: f64,

    /// Translation standard deviation (meters).
    #[serde(default = "defaults::trans_sigma")]
    pub trans_sigma: f64,
}

impl Default for FixedCovarianceConfig {
    fn default() -> Self {
        Self {
            enabled: defaults::disabled(),
            rot_sigma: defaults::rot_sigma(),
            trans_sigma: defaults::trans_sigma(),
        }
    }
}

/// Scan registration configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// ICP seeding strategy.
    #[serde(default = "defaults::init_method")]
    pub init_method: InitMethod,

    /// Covariance model.
    #[serde(default = "defaults::covariance_method")]
    pub covariance_method: CovarianceMethod,

    /// ICP fitness above this rejects the alignment.
    #[serde(default = "defaults::max_tolerable_fitness")]
    pub max_tolerable_fitness: f64,

    /// ICP parameters.
    #[serde(default)]
    pub icp: IcpConfig,

    /// SAC-IA parameters.
    #[serde(default)]
    pub sac: SacConfig,

    /// Harris-3D parameters.
    #[serde(default)]
    pub harris: HarrisConfig,

    /// Fixed covariance override.
    #[serde(default)]
    pub fixed_covariance: FixedCovarianceConfig,

    /// Lower clamp for covariance eigenvalues.
    #[serde(default = "defaults::eigen_lower_bound")]
    pub eigen_lower_bound: f64,

    /// Upper clamp for covariance eigenvalues.
    #[serde(default = "defaults::eigen_upper_bound")]
    pub eigen_upper_bound: f64,

    /// Point-to-plane measurement sigma (meters).
    #[serde(default = "defaults::plane_sigma")]
    pub plane_sigma: f64,
}

impl Default for RegistrationConfig {
    fn default() -> Self {
        Self {
            init_method: defaults::init_method(),
            covariance_method: defaults::covariance_method(),
            max_tolerable_fitness: defaults::max_tolerable_fitness(),
            icp: IcpConfig::default(),
            sac: SacConfig::default(),
            harris: HarrisConfig::default(),
            fixed_covariance: FixedCovarianceConfig::default(),
            eigen_lower_bound: defaults::eigen_lower_bound(),
            eigen_upper_bound: defaults::eigen_upper_bound(),
            plane_sigma: defaults::plane_sigma(),
        }
    }
}

/// Accepted scan alignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Pose of `b` in the frame of `a`.
    pub pose: Pose3,
    /// Covariance over `[ω, ρ]`.
    pub covariance: Matrix6<f64>,
    /// ICP fitness (mean squared nearest-neighbor distance, m²).
    pub fitness: f64,
    /// Covariance fell back to the maximum-uncertainty diagonal.
    pub degraded_covariance: bool,
}

/// Why a candidate alignment was turned down.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RejectionReason {
    /// A scan has no points.
    #[error("Scan for {0} is empty")]
    EmptyScan(Key),

    /// No scan stored for a key.
    #[error("No scan stored for {0}")]
    MissingScan(Key),

    /// Feature-based initialization did not find a good alignment.
    #[error("SAC-IA fitness {fitness:.4} >= {threshold:.4}")]
    SacFitnessTooHigh {
        /// Achieved fitness
        fitness: f64,
        /// Configured bound
        threshold: f64,
    },

    /// ICP ran out of correspondences.
    #[error("ICP did not converge")]
    NotConverged,

    /// ICP converged to a poor alignment.
    #[error("ICP fitness {fitness:.4} > {max:.4}")]
    FitnessTooHigh {
        /// Achieved fitness
        fitness: f64,
        /// Configured bound
        max: f64,
    },

    /// Scan too sparse to register.
    #[error("Scan for {key} has {count} points")]
    TooFewPoints {
        /// Offending key
        key: Key,
        /// Point count
        count: usize,
    },
}

/// Failure to set up the registration engine.
#[derive(Error, Debug)]
pub enum RegistrationError {
    /// The worker pool could not be created.
    #[error("Failed to build registration thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}
