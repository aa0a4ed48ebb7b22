//! Default value functions for serde deserialization.

use crate::consistency::CliqueMethod;
use crate::loop_closure::Prioritization;
use crate::optimizer::SolverKind;
use crate::registration::{CovarianceMethod, HarrisResponse, InitMethod};

// Solver

pub fn solver_kind() -> SolverKind {
    SolverKind::LevenbergMarquardt
}

pub fn max_iterations() -> u32 {
    100
}

pub fn relative_error_tol() -> f64 {
    1e-5
}

pub fn absolute_error_tol() -> f64 {
    1e-5
}

pub fn lambda_initial() -> f64 {
    1e-5
}

pub fn lambda_upper_bound() -> f64 {
    1e5
}

// Consistency

/// 99% quantile of χ² with 6 degrees of freedom.
pub fn chi2_threshold() -> f64 {
    16.81
}

pub fn clique_method() -> CliqueMethod {
    CliqueMethod::Exact
}

pub fn max_exact_candidates() -> usize {
    48
}

pub fn max_candidates() -> usize {
    256
}

// Registration

pub fn init_method() -> InitMethod {
    InitMethod::Identity
}

pub fn covariance_method() -> CovarianceMethod {
    CovarianceMethod::PointToPoint
}

pub fn max_tolerable_fitness() -> f64 {
    0.36
}

pub fn eigen_lower_bound() -> f64 {
    1e-3
}

pub fn eigen_upper_bound() -> f64 {
    1e3
}

pub fn plane_sigma() -> f64 {
    0.01
}

pub fn icp_tf_epsilon() -> f64 {
    1e-8
}

pub fn icp_corr_dist() -> f64 {
    1.0
}

pub fn icp_iterations() -> u32 {
    30
}

pub fn icp_threads() -> usize {
    4
}

pub fn icp_min_correspondences() -> usize {
    6
}

pub fn sac_iterations() -> u32 {
    100
}

pub fn sac_normals_radius() -> f64 {
    0.5
}

pub fn sac_features_radius() -> f64 {
    1.0
}

pub fn sac_fitness_score_threshold() -> f64 {
    0.6
}

pub fn sac_min_sample_distance() -> f64 {
    0.05
}

pub fn sac_correspondence_randomness() -> usize {
    3
}

pub fn sac_seed() -> u64 {
    42
}

pub fn harris_threshold() -> f64 {
    1e-6
}

pub fn harris_radius() -> f64 {
    0.5
}

pub fn harris_response() -> HarrisResponse {
    HarrisResponse::Harris
}

pub fn rot_sigma() -> f64 {
    0.05
}

pub fn trans_sigma() -> f64 {
    0.1
}

// Loop closure

pub fn prioritization() -> Prioritization {
    Prioritization::Fifo
}

// Shared

pub fn enabled() -> bool {
    true
}

pub fn disabled() -> bool {
    false
}
