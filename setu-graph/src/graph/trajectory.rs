//! Raw odometry trajectory.
//!
//! The dead-reckoning chain is kept apart from the optimized estimate. It is
//! only ever extended, one pose per accepted odometry step, and optimization
//! never writes to it. The consistency filters read it as their reference.

use std::collections::BTreeMap;

use crate::core::{Key, PoseWithCovariance};
use crate::error::{Result, SolverError};

/// One entry of the odometry chain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPose {
    /// Pose key.
    pub key: Key,
    /// Dead-reckoned pose and accumulated covariance.
    pub pose: PoseWithCovariance,
}

/// Contiguous chain of dead-reckoned poses from `start_id` to `end_id`.
#[derive(Debug, Clone, Default)]
pub struct OdometryTrajectory {
    poses: BTreeMap<Key, TrajectoryPose>,
    start_id: Option<Key>,
    end_id: Option<Key>,
}

impl OdometryTrajectory {
    /// Empty trajectory.
    pub fn new() -> Self {
        Self::default()
    }

    /// True before the prior has been ingested.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Number of poses in the chain.
    #[inline]
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    /// First key of the chain.
    #[inline]
    pub fn start_id(&self) -> Option<Key> {
        self.start_id
    }

    /// Last key of the chain.
    #[inline]
    pub fn end_id(&self) -> Option<Key> {
        self.end_id
    }

    /// Look up a pose.
    #[inline]
    pub fn get(&self, key: Key) -> Option<&TrajectoryPose> {
        self.poses.get(&key)
    }

    /// True if `key` is part of the chain.
    #[inline]
    pub fn contains(&self, key: Key) -> bool {
        self.poses.contains_key(&key)
    }

    /// Poses in key order.
    pub fn iter(&self) -> impl Iterator<Item = &TrajectoryPose> {
        self.poses.values()
    }

    /// Check that a prior may seed this trajectory.
    pub fn check_seed(&self, key: Key) -> Result<()> {
        match self.start_id {
            Some(_) => Err(SolverError::PriorOnNonEmptyTrajectory(key)),
            None => Ok(()),
        }
    }

    /// Seed the chain with its first pose.
    pub fn seed(&mut self, key: Key, pose: PoseWithCovariance) -> Result<()> {
        self.check_seed(key)?;
        self.poses.insert(key, TrajectoryPose { key, pose });
        self.start_id = Some(key);
        self.end_id = Some(key);
        Ok(())
    }

    /// Check that odometry `from -> to` may extend the chain ending at `end`.
    ///
    /// `end` is passed in so a batch can be validated against a simulated end.
    pub fn check_extension(&self, end: Option<Key>, from: Key, to: Key) -> Result<()> {
        let end = end.ok_or(SolverError::OdometryBeforePrior { from, to })?;
        if from != end {
            return Err(SolverError::NonContiguousOdometry { from, end });
        }
        if to <= from {
            return Err(SolverError::NonIncreasingOdometry { from, to });
        }
        if self.poses.contains_key(&to) {
            return Err(SolverError::DuplicateKey(to));
        }
        Ok(())
    }

    /// Append one pose by composing the chain end with `delta`.
    ///
    /// Returns the new dead-reckoned pose.
    pub fn extend(&mut self, from: Key, to: Key, delta: &PoseWithCovariance) -> Result<PoseWithCovariance> {
        self.check_extension(self.end_id, from, to)?;
        let last = self
            .poses
            .get(&from)
            .ok_or(SolverError::OdometryBeforePrior { from, to })?;
        let pose = last.pose.compose(delta);
        self.poses.insert(to, TrajectoryPose { key: to, pose });
        self.end_id = Some(to);
        Ok(pose)
    }
}
