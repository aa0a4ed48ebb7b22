//! Loop-closure computation.
//!
//! Candidates proposed elsewhere are queued here, verified by registering
//! their keyed scans, and handed out as weighted edges:
//!
//! ```text
//! keyed scans ──► ScanStore
//!                    │
//! candidates ──► CandidateQueue ──► LoopClosureComputer ──► LoopClosureEdge
//!                  (prioritize)        (ScanAligner)          (output queue)
//! ```
//!
//! Missing scans are not retried: a candidate is consumed by the batch that
//! drains it, whether or not it could be aligned.

mod computer;
mod queue;
mod scan_store;

pub use computer::{BatchReport, LoopClosureComputer};
pub use queue::CandidateQueue;
pub use scan_store::{InsertOutcome, ScanStore};

use nalgebra::Matrix6;
use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::core::{Key, Pose3};

/// Order in which pending candidates are verified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prioritization {
    /// Arrival order.
    Fifo,
    /// Smallest odometric distance between the two poses first.
    NearestFirst,
}

/// Candidate handling configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoopClosureConfig {
    /// Queue ordering applied before each batch.
    #[serde(default = "defaults::prioritization")]
    pub prioritization: Prioritization,
}

impl Default for LoopClosureConfig {
    fn default() -> Self {
        Self {
            prioritization: defaults::prioritization(),
        }
    }
}

/// Proposed loop closure between two keyed poses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopCandidate {
    /// Older key.
    pub from: Key,
    /// Newer key.
    pub to: Key,
    /// Estimate of `from` when the candidate was proposed.
    pub pose_from: Pose3,
    /// Estimate of `to` when the candidate was proposed.
    pub pose_to: Pose3,
}

impl LoopCandidate {
    /// Translation distance between the two poses.
    pub fn distance(&self) -> f64 {
        (self.pose_to.translation - self.pose_from.translation).norm()
    }
}

/// Verified loop closure, ready to be added to the pose graph.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopClosureEdge {
    /// Older key.
    pub from: Key,
    /// Newer key.
    pub to: Key,
    /// Pose of `to` in the frame of `from`.
    pub pose: Pose3,
    /// Covariance over `[ω, ρ]`.
    pub covariance: Matrix6<f64>,
}
