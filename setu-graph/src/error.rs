//! Errors for malformed pose-graph updates.
//!
//! Every variant is returned before any state is touched, so a failed
//! update leaves the session exactly as it was.

use thiserror::Error;

use crate::core::Key;
use crate::graph::FactorIndex;

/// Malformed update rejected by the pose-graph session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// Values were supplied without any factor constraining them.
    #[error("Update adds {count} value(s) but no factors")]
    ValuesWithoutFactors {
        /// Number of values in the rejected update
        count: usize,
    },

    /// A value for this key already exists.
    #[error("Key {0} already has a value")]
    DuplicateKey(Key),

    /// Odometry arrived before the trajectory was seeded by a prior.
    #[error("Odometry {from} -> {to} received before any prior")]
    OdometryBeforePrior {
        /// Odometry source key
        from: Key,
        /// Odometry target key
        to: Key,
    },

    /// Odometry does not start at the end of the current chain.
    #[error("Odometry starts at {from} but the trajectory ends at {end}")]
    NonContiguousOdometry {
        /// Odometry source key
        from: Key,
        /// Current end of the trajectory
        end: Key,
    },

    /// Odometry target key does not increase.
    #[error("Odometry keys must increase: {from} -> {to}")]
    NonIncreasingOdometry {
        /// Odometry source key
        from: Key,
        /// Odometry target key
        to: Key,
    },

    /// A prior seeding the trajectory arrived after the trajectory started.
    #[error("Trajectory already seeded at {0}")]
    PriorOnNonEmptyTrajectory(Key),

    /// A factor references a key that has no value.
    #[error("Factor references unknown key {0}")]
    UnknownKey(Key),

    /// Removal of a factor slot that does not exist.
    #[error("No factor at index {0}")]
    UnknownFactor(FactorIndex),
}

/// Result alias for session operations.
pub type Result<T> = std::result::Result<T, SolverError>;
