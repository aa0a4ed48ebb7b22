//! Loop-closure outlier rejection.
//!
//! Two gates run in sequence on every proposed loop closure:
//!
//! ```text
//! candidate ──► OdometricFilter ──reject──► dropped for good
//!                    │ accept
//!                    ▼
//!              PairwiseSelector ──► maximum clique ──► optimizer
//!                    │
//!                    └── non-members stay stored and are re-evaluated
//! ```
//!
//! Both gates use a squared Mahalanobis distance against a χ² threshold.

mod clique;
mod odometric;
mod pairwise;

use serde::{Deserialize, Serialize};

use crate::config::defaults;

pub use clique::{greedy_clique, maximum_clique};
pub use odometric::{ConsistencyCheck, OdometricFilter, odometry_between};
pub use pairwise::{ConsistencyGraph, LoopClosureCandidate, PairwiseSelector};

/// Maximum-clique strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CliqueMethod {
    /// Branch-and-bound search for a true maximum clique.
    ///
    /// Falls back to [`CliqueMethod::Greedy`] above `max_exact_candidates`.
    Exact,
    /// Highest-degree-first construction of one maximal clique.
    Greedy,
}

/// Consistency gating configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    /// Squared Mahalanobis bound for loop closure vs. odometry.
    #[serde(default = "defaults::chi2_threshold")]
    pub odometric_threshold: f64,

    /// Squared Mahalanobis bound for two loop closures vs. each other.
    #[serde(default = "defaults::chi2_threshold")]
    pub pairwise_threshold: f64,

    /// Clique search strategy.
    #[serde(default = "defaults::clique_method")]
    pub clique_method: CliqueMethod,

    /// Largest candidate pool searched exactly.
    #[serde(default = "defaults::max_exact_candidates")]
    pub max_exact_candidates: usize,

    /// Pool size above which the oldest non-inliers are pruned. Pruned loop
    /// closures are removed from the session.
    #[serde(default = "defaults::max_candidates")]
    pub max_candidates: usize,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            odometric_threshold: defaults::chi2_threshold(),
            pairwise_threshold: defaults::chi2_threshold(),
            clique_method: defaults::clique_method(),
            max_exact_candidates: defaults::max_exact_candidates(),
            max_candidates: defaults::max_candidates(),
        }
    }
}
