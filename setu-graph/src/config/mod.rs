//! Unified configuration loading for SetuGraph.
//!
//! One YAML document, every field optional.
//!
//! ## Configuration Sections
//!
//! | Section | Description |
//! |---------|-------------|
//! | `solver` | Solver family, iteration caps, damping |
//! | `consistency` | Odometric/pairwise χ² gates, clique policy |
//! | `registration` | ICP, SAC-IA, Harris keypoints, covariance model |
//! | `loop_closure` | Candidate queue ordering |
//!
//! ## Example YAML
//!
//! ```yaml
//! solver:
//!   kind: levenberg_marquardt   # or gauss_newton
//!   max_iterations: 100
//!
//! consistency:
//!   odometric_threshold: 16.81  # χ²(6) at 99%
//!   pairwise_threshold: 16.81
//!   clique_method: exact        # or greedy
//!   max_exact_candidates: 48    # exact search falls back to greedy above this
//!   max_candidates: 256
//!
//! registration:
//!   init_method: odometry       # identity | odometry | odometry_rotation | features
//!   covariance_method: point_to_plane
//!   max_tolerable_fitness: 0.36
//!   icp:
//!     tf_epsilon: 1.0e-8
//!     corr_dist: 1.0
//!     iterations: 30
//!     threads: 4
//!   fixed_covariance:
//!     enabled: false
//!     rot_sigma: 0.05
//!     trans_sigma: 0.1
//! ```

pub(crate) mod defaults;
mod error;
mod setu;

pub use error::ConfigLoadError;
pub use setu::{DEFAULT_CONFIG_PATH, SetuConfig};
