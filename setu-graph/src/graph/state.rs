//! Mutable pose-graph state owned by one session.

use std::collections::BTreeSet;

use nalgebra::Matrix6;

use super::factor::{Factor, FactorGraph, FactorIndex, FactorKind};
use super::trajectory::OdometryTrajectory;
use super::values::Values;
use crate::core::{Key, Pose3, PoseWithCovariance};
use crate::error::{Result, SolverError};

/// Values, raw trajectory and the three measurement sets.
///
/// ```text
/// factors               every factor ever added (removed slots are no-ops)
///  ├─ odometry_factors      dead-reckoning steps
///  └─ loop_closure_factors  closures that passed the odometric filter
///        └─ active          current maximum clique, fed to the optimizer
/// ```
#[derive(Debug, Clone, Default)]
pub struct PoseGraphState {
    values: Values,
    trajectory: OdometryTrajectory,
    factors: FactorGraph,
    odometry_factors: Vec<FactorIndex>,
    loop_closure_factors: Vec<FactorIndex>,
    active_loop_closures: BTreeSet<FactorIndex>,
}

impl PoseGraphState {
    /// Empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Optimized estimates.
    pub fn values(&self) -> &Values {
        &self.values
    }

    /// Raw odometry chain.
    pub fn trajectory(&self) -> &OdometryTrajectory {
        &self.trajectory
    }

    /// All factors.
    pub fn factors(&self) -> &FactorGraph {
        &self.factors
    }

    /// Indices of odometry factors still live.
    pub fn odometry_factors(&self) -> &[FactorIndex] {
        &self.odometry_factors
    }

    /// Indices of loop closures admitted by the odometric filter and still
    /// live. Candidates pruned from the consistency graph are removed.
    pub fn loop_closure_factors(&self) -> &[FactorIndex] {
        &self.loop_closure_factors
    }

    /// Loop closures currently included in optimization.
    pub fn active_loop_closures(&self) -> &BTreeSet<FactorIndex> {
        &self.active_loop_closures
    }

    /// Seed the trajectory and add a prior factor.
    pub fn ingest_prior(&mut self, key: Key, pose: Pose3, covariance: Matrix6<f64>) -> Result<FactorIndex> {
        self.trajectory.check_seed(key)?;
        if self.values.contains(key) {
            return Err(SolverError::DuplicateKey(key));
        }

        self.trajectory
            .seed(key, PoseWithCovariance::new(pose, covariance))?;
        self.values.insert(key, pose);
        Ok(self.factors.add(Factor::prior(key, pose, covariance)))
    }

    /// Extend the trajectory by one step and add the odometry factor.
    ///
    /// The new value is `estimate` if given, otherwise the optimized pose of
    /// `from` composed with the measurement.
    pub fn ingest_odometry(
        &mut self,
        from: Key,
        to: Key,
        measured: Pose3,
        covariance: Matrix6<f64>,
        estimate: Option<Pose3>,
    ) -> Result<FactorIndex> {
        self.trajectory
            .check_extension(self.trajectory.end_id(), from, to)?;
        if self.values.contains(to) {
            return Err(SolverError::DuplicateKey(to));
        }

        let dead_reckoned = self
            .trajectory
            .extend(from, to, &PoseWithCovariance::new(measured, covariance))?;
        let initial = estimate
            .or_else(|| self.values.get(from).map(|p| p.compose(&measured)))
            .unwrap_or(dead_reckoned.pose);
        self.values.insert(to, initial);

        let index = self
            .factors
            .add(Factor::odometry(from, to, measured, covariance));
        self.odometry_factors.push(index);
        Ok(index)
    }

    /// Insert a value for a new key.
    pub fn insert_value(&mut self, key: Key, pose: Pose3) -> Result<()> {
        if self.values.insert(key, pose) {
            Ok(())
        } else {
            Err(SolverError::DuplicateKey(key))
        }
    }

    /// Seed the raw trajectory without touching values or factors.
    pub fn seed_trajectory(&mut self, key: Key, pose: Pose3, covariance: Matrix6<f64>) -> Result<()> {
        self.trajectory
            .seed(key, PoseWithCovariance::new(pose, covariance))
    }

    /// Extend the raw trajectory without touching values or factors.
    pub fn extend_trajectory(
        &mut self,
        from: Key,
        to: Key,
        measured: Pose3,
        covariance: Matrix6<f64>,
    ) -> Result<()> {
        self.trajectory
            .extend(from, to, &PoseWithCovariance::new(measured, covariance))
            .map(|_| ())
    }

    /// Add a factor to the graph and its kind list.
    ///
    /// The trajectory is not touched; see
    /// [`extend_trajectory`](Self::extend_trajectory).
    ///
    /// Loop closures added here are tracked as admitted but stay inactive until
    /// [`set_active_loop_closures`](Self::set_active_loop_closures) includes them.
    pub fn add_factor(&mut self, factor: Factor) -> FactorIndex {
        let kind = factor.kind();
        let index = self.factors.add(factor);
        match kind {
            FactorKind::Odometry => self.odometry_factors.push(index),
            FactorKind::LoopClosure => self.loop_closure_factors.push(index),
            FactorKind::Prior => {}
        }
        index
    }

    /// Invalidate a factor slot.
    pub fn remove_factor(&mut self, index: FactorIndex) -> Option<Factor> {
        let removed = self.factors.remove(index)?;
        self.odometry_factors.retain(|i| *i != index);
        self.loop_closure_factors.retain(|i| *i != index);
        self.active_loop_closures.remove(&index);
        Some(removed)
    }

    /// Replace the set of loop closures fed to the optimizer.
    pub fn set_active_loop_closures(&mut self, active: impl IntoIterator<Item = FactorIndex>) {
        self.active_loop_closures = active
            .into_iter()
            .filter(|i| self.factors.get(*i).is_some())
            .collect();
    }

    /// Factors that take part in the next optimization.
    pub fn optimization_factors(&self) -> impl Iterator<Item = (FactorIndex, &Factor)> {
        self.factors.iter().filter(|(index, factor)| {
            factor.kind() != FactorKind::LoopClosure || self.active_loop_closures.contains(index)
        })
    }

    /// Overwrite every estimate after a successful solve.
    pub fn replace_values(&mut self, values: Values) {
        self.values = values;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cov() -> Matrix6<f64> {
        Matrix6::identity() * 1e-2
    }

    #[test]
    fn test_prior_seeds_everything() {
        let mut state = PoseGraphState::new();
        state.ingest_prior(Key(0), Pose3::identity(), cov()).unwrap();

        assert_eq!(state.trajectory().start_id(), Some(Key(0)));
        assert_eq!(state.values().len(), 1);
        assert_eq!(state.factors().len(), 1);
    }

    #[test]
    fn test_odometry_updates_all_sets() {
        let mut state = PoseGraphState::new();
        state.ingest_prior(Key(0), Pose3::identity(), cov()).unwrap();
        let step = Pose3::from_translation(1.0, 0.0, 0.0);
        let idx = state.ingest_odometry(Key(0), Key(1), step, cov(), None).unwrap();

        assert_eq!(state.odometry_factors(), &[idx]);
        assert_eq!(state.trajectory().end_id(), Some(Key(1)));
        assert!(state.values().get(Key(1)).unwrap().is_close(&step, 1e-12));
    }

    #[test]
    fn test_failed_odometry_leaves_state_untouched() {
        let mut state = PoseGraphState::new();
        let err = state
            .ingest_odometry(Key(0), Key(1), Pose3::identity(), cov(), None)
            .unwrap_err();
        assert!(matches!(err, SolverError::OdometryBeforePrior { .. }));
        assert!(state.values().is_empty());
        assert!(state.factors().is_empty());
    }

    #[test]
    fn test_inactive_loop_closures_excluded() {
        let mut state = PoseGraphState::new();
        state.ingest_prior(Key(0), Pose3::identity(), cov()).unwrap();
        state
            .ingest_odometry(Key(0), Key(1), Pose3::identity(), cov(), None)
            .unwrap();
        let lc = state.add_factor(Factor::loop_closure(Key(0), Key(1), Pose3::identity(), cov()));
        assert_eq!(state.loop_closure_factors(), &[lc]);

        assert_eq!(state.optimization_factors().count(), 2);
        state.set_active_loop_closures([lc]);
        assert_eq!(state.optimization_factors().count(), 3);

        state.remove_factor(lc);
        assert!(state.active_loop_closures().is_empty());
        assert!(state.loop_closure_factors().is_empty());
        assert_eq!(state.optimization_factors().count(), 2);
    }
}
