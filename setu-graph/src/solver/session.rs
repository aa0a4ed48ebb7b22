//! The owned pose-graph session.

use std::collections::BTreeSet;

use nalgebra::Matrix6;

use super::trigger::{TriggerDecision, UpdateTrigger};
use crate::config::SetuConfig;
use crate::consistency::{
    ConsistencyCheck, LoopClosureCandidate, OdometricFilter, PairwiseSelector,
};
use crate::core::{Key, Pose3, PoseWithCovariance, TaggedKey};
use crate::error::{Result, SolverError};
use crate::graph::{Factor, FactorIndex, OdometryTrajectory, PoseGraphState, Values};
use crate::loop_closure::LoopClosureEdge;
use crate::optimizer::{GraphOptimizer, OptimizationResult};

/// A loop closure turned away by the odometric filter.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedLoopClosure {
    /// Source key.
    pub from: Key,
    /// Target key.
    pub to: Key,
    /// Filter verdict.
    pub check: ConsistencyCheck,
}

/// What an [`update`](PoseGraphSolver::update) did.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOutcome {
    /// Final trigger decision, after loop-closure outcomes.
    pub decision: TriggerDecision,
    /// Slot assigned to each submitted factor, in order.
    ///
    /// `None` for loop closures rejected by the odometric filter.
    pub factor_indices: Vec<Option<FactorIndex>>,
    /// Loop closures admitted into the consistency graph.
    pub admitted: Vec<FactorIndex>,
    /// Loop closures dropped by the odometric filter.
    pub rejected: Vec<RejectedLoopClosure>,
    /// Admitted loop closures left outside the maximum clique.
    pub excluded: Vec<FactorIndex>,
    /// Loop closures pruned from the consistency graph and removed from the
    /// session.
    pub pruned: Vec<FactorIndex>,
    /// Solver report, when the optimizer ran.
    pub optimization: Option<OptimizationResult>,
}

impl UpdateOutcome {
    fn new(decision: TriggerDecision, num_factors: usize) -> Self {
        Self {
            decision,
            factor_indices: Vec::with_capacity(num_factors),
            admitted: Vec::new(),
            rejected: Vec::new(),
            excluded: Vec::new(),
            pruned: Vec::new(),
            optimization: None,
        }
    }

    /// True if optimized values were written back.
    pub fn values_updated(&self) -> bool {
        self.optimization
            .as_ref()
            .is_some_and(OptimizationResult::is_usable)
    }
}

/// Incremental pose-graph solver with loop-closure outlier rejection.
///
/// One instance is one mapping session. All mutation goes through
/// [`update`](Self::update), which either applies a batch completely or
/// returns an error with the session untouched.
#[derive(Debug, Clone)]
pub struct PoseGraphSolver {
    state: PoseGraphState,
    odometric: OdometricFilter,
    selector: PairwiseSelector,
    optimizer: GraphOptimizer,
}

impl PoseGraphSolver {
    /// Create an empty session.
    pub fn new(config: &SetuConfig) -> Self {
        Self {
            state: PoseGraphState::new(),
            odometric: OdometricFilter::new(config.consistency.odometric_threshold),
            selector: PairwiseSelector::new(config.consistency.clone()),
            optimizer: GraphOptimizer::new(config.solver.clone()),
        }
    }

    /// Current best estimates.
    pub fn values(&self) -> &Values {
        self.state.values()
    }

    /// Raw dead-reckoning chain.
    pub fn trajectory(&self) -> &OdometryTrajectory {
        self.state.trajectory()
    }

    /// Full graph state.
    pub fn state(&self) -> &PoseGraphState {
        &self.state
    }

    /// Pairwise selector holding every admitted loop closure.
    pub fn selector(&self) -> &PairwiseSelector {
        &self.selector
    }

    /// Number of live factors.
    pub fn num_factors(&self) -> usize {
        self.state.factors().len()
    }

    /// Loop closures currently used by the optimizer.
    pub fn loop_closure_edges(&self) -> Vec<LoopClosureEdge> {
        self.state
            .active_loop_closures()
            .iter()
            .filter_map(|index| match self.state.factors().get(*index) {
                Some(Factor::LoopClosure {
                    from,
                    to,
                    pose,
                    covariance,
                }) => Some(LoopClosureEdge {
                    from: *from,
                    to: *to,
                    pose: *pose,
                    covariance: *covariance,
                }),
                _ => None,
            })
            .collect()
    }

    /// Anchor the session with a prior on its first pose.
    pub fn ingest_prior(&mut self, key: Key, pose: Pose3, covariance: Matrix6<f64>) -> Result<UpdateOutcome> {
        if !self.state.trajectory().is_empty() {
            return Err(SolverError::PriorOnNonEmptyTrajectory(key));
        }
        self.update(
            vec![Factor::prior(key, pose, covariance)],
            vec![(TaggedKey::odometry(key), pose)],
            &[],
        )
    }

    /// Append one odometry step.
    ///
    /// The initial value of `to` is `estimate` if given, otherwise the
    /// current estimate of `from` composed with `measured`.
    pub fn ingest_odometry(
        &mut self,
        from: Key,
        to: Key,
        measured: Pose3,
        covariance: Matrix6<f64>,
        estimate: Option<Pose3>,
    ) -> Result<UpdateOutcome> {
        let initial = estimate
            .or_else(|| self.values().get(from).map(|p| p.compose(&measured)))
            .unwrap_or(measured);
        self.update(
            vec![Factor::odometry(from, to, measured, covariance)],
            vec![(TaggedKey::odometry(to), initial)],
            &[],
        )
    }

    /// Submit one verified loop closure between existing keys.
    pub fn add_loop_closure(&mut self, edge: &LoopClosureEdge) -> Result<UpdateOutcome> {
        self.update(
            vec![Factor::loop_closure(edge.from, edge.to, edge.pose, edge.covariance)],
            Vec::new(),
            &[],
        )
    }

    /// Apply one batch of factors, values and removals.
    ///
    /// Loop closures pass the odometric filter, then join the pairwise
    /// consistency graph; only the maximum clique reaches the optimizer.
    pub fn update(
        &mut self,
        new_factors: Vec<Factor>,
        new_values: Vec<(TaggedKey, Pose3)>,
        factors_to_remove: &[FactorIndex],
    ) -> Result<UpdateOutcome> {
        let decision = UpdateTrigger::evaluate(new_factors.len(), &new_values, factors_to_remove.len())?;
        self.validate(&new_factors, &new_values, factors_to_remove)?;

        let mut outcome = UpdateOutcome::new(decision, new_factors.len());
        let mut selector_changed = false;

        for index in factors_to_remove {
            if self.state.remove_factor(*index).is_some() {
                selector_changed |= self.selector.remove(*index);
            } else {
                log::debug!("Factor {} already removed", index);
            }
        }

        for (tagged, pose) in &new_values {
            self.state.insert_value(tagged.key, *pose)?;
        }

        let mut loop_closures = Vec::new();
        for (position, factor) in new_factors.into_iter().enumerate() {
            outcome.factor_indices.push(None);
            match factor {
                Factor::Prior { key, pose, covariance } => {
                    if self.state.trajectory().is_empty() {
                        self.state.seed_trajectory(key, pose, covariance)?;
                    }
                    let index = self.state.add_factor(factor);
                    outcome.factor_indices[position] = Some(index);
                }
                Factor::Odometry {
                    from,
                    to,
                    pose,
                    covariance,
                } => {
                    self.state.extend_trajectory(from, to, pose, covariance)?;
                    let index = self.state.add_factor(factor);
                    outcome.factor_indices[position] = Some(index);
                }
                Factor::LoopClosure { .. } => loop_closures.push((position, factor)),
            }
        }

        let submitted_loop_closures = loop_closures.len();
        for (position, factor) in loop_closures {
            if let Some(index) = self.admit_loop_closure(factor, &mut outcome) {
                outcome.factor_indices[position] = Some(index);
                selector_changed = true;
            }
        }

        if selector_changed {
            let inliers = self.selector.find_inliers();
            let clique: BTreeSet<FactorIndex> = inliers.iter().copied().collect();
            outcome.excluded = outcome
                .admitted
                .iter()
                .copied()
                .filter(|i| !clique.contains(i))
                .collect();
            self.state.set_active_loop_closures(inliers);

            for index in self.selector.take_pruned() {
                if self.state.remove_factor(index).is_some() {
                    outcome.pruned.push(index);
                }
            }
            if !outcome.pruned.is_empty() {
                log::info!("Dropped {} pruned loop closure(s)", outcome.pruned.len());
            }
        }

        let only_loop_closures = submitted_loop_closures == outcome.factor_indices.len()
            && new_values.is_empty()
            && factors_to_remove.is_empty();
        outcome.decision = if !outcome.admitted.is_empty() {
            TriggerDecision::Force
        } else if submitted_loop_closures > 0 && only_loop_closures {
            log::debug!("Every loop closure rejected, skipping optimization");
            TriggerDecision::Skip
        } else {
            decision
        };

        if outcome.decision.should_optimize() {
            outcome.optimization = Some(self.optimize());
        }
        Ok(outcome)
    }

    /// Check a batch against the current state without mutating anything.
    fn validate(
        &self,
        new_factors: &[Factor],
        new_values: &[(TaggedKey, Pose3)],
        factors_to_remove: &[FactorIndex],
    ) -> Result<()> {
        let factors = self.state.factors();
        for index in factors_to_remove {
            if !factors.has_slot(*index) {
                return Err(SolverError::UnknownFactor(*index));
            }
        }

        let mut batch_keys = BTreeSet::new();
        for (tagged, _) in new_values {
            if self.state.values().contains(tagged.key) || !batch_keys.insert(tagged.key) {
                return Err(SolverError::DuplicateKey(tagged.key));
            }
        }

        // Simulate the trajectory end across the batch.
        let trajectory = self.state.trajectory();
        let mut end = trajectory.end_id();
        for factor in new_factors {
            match factor {
                Factor::Prior { key, .. } if end.is_none() => end = Some(*key),
                Factor::Odometry { from, to, .. } => {
                    trajectory.check_extension(end, *from, *to)?;
                    end = Some(*to);
                }
                _ => {}
            }
        }

        for factor in new_factors {
            for key in factor.keys() {
                if !self.state.values().contains(key) && !batch_keys.contains(&key) {
                    return Err(SolverError::UnknownKey(key));
                }
            }
        }
        Ok(())
    }

    /// Run the odometric filter and, on success, store the loop closure.
    fn admit_loop_closure(&mut self, factor: Factor, outcome: &mut UpdateOutcome) -> Option<FactorIndex> {
        let (from, to) = factor.endpoints()?;
        let measured = *factor.measurement();
        let covariance = *factor.covariance();

        let check = self
            .odometric
            .is_consistent(self.state.trajectory(), from, to, &measured, &covariance);
        if !check.is_accepted() {
            log::warn!("Loop closure {} -> {} rejected by odometry: {:?}", from, to, check);
            outcome.rejected.push(RejectedLoopClosure { from, to, check });
            return None;
        }

        let index = self.state.add_factor(factor);
        let candidate = LoopClosureCandidate {
            factor: index,
            from,
            to,
            measurement: PoseWithCovariance::new(measured, covariance),
        };
        self.selector.insert(candidate, self.state.trajectory());
        log::info!("Admitted loop closure {} -> {} as {}", from, to, index);
        outcome.admitted.push(index);
        Some(index)
    }

    /// Solve the active graph and write values back on success.
    fn optimize(&mut self) -> OptimizationResult {
        let (result, values) = {
            let factors: Vec<&Factor> = self
                .state
                .optimization_factors()
                .map(|(_, factor)| factor)
                .collect();
            self.optimizer.optimize(&factors, self.state.values())
        };

        if result.is_usable() {
            log::info!(
                "Optimized {} values in {} iteration(s): error {:.4e} -> {:.4e}",
                values.len(),
                result.iterations,
                result.initial_error,
                result.final_error
            );
            self.state.replace_values(values);
        } else {
            log::warn!(
                "Optimization failed ({:?}), keeping previous values",
                result.termination_reason
            );
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::FactorKind;

    fn cov() -> Matrix6<f64> {
        PoseWithCovariance::diagonal_covariance(0.01, 0.05)
    }

    fn step() -> Pose3 {
        Pose3::from_xyz_rpy(1.0, 0.0, 0.0, 0.0, 0.0, 0.5)
    }

    fn session_with_chain(n: u64) -> PoseGraphSolver {
        let mut solver = PoseGraphSolver::new(&SetuConfig::default());
        solver.ingest_prior(Key(0), Pose3::identity(), cov()).unwrap();
        for i in 0..n {
            solver.ingest_odometry(Key(i), Key(i + 1), step(), cov(), None).unwrap();
        }
        solver
    }

    fn exact_edge(solver: &PoseGraphSolver, from: u64, to: u64) -> LoopClosureEdge {
        let traj = solver.trajectory();
        let pose = traj
            .get(Key(from))
            .unwrap()
            .pose
            .pose
            .between(&traj.get(Key(to)).unwrap().pose.pose);
        LoopClosureEdge {
            from: Key(from),
            to: Key(to),
            pose,
            covariance: cov(),
        }
    }

    #[test]
    fn test_odometry_steps_do_not_optimize() {
        let mut solver = session_with_chain(3);
        let outcome = solver
            .ingest_odometry(Key(3), Key(4), step(), cov(), None)
            .unwrap();
        assert_eq!(outcome.decision, TriggerDecision::Skip);
        assert!(outcome.optimization.is_none());
        assert_eq!(solver.trajectory().end_id(), Some(Key(4)));
        assert_eq!(solver.values().len(), 5);
        assert_eq!(solver.num_factors(), 5);
    }

    #[test]
    fn test_caller_value_is_used() {
        let mut solver = session_with_chain(1);
        let guess = Pose3::from_translation(9.0, 9.0, 9.0);
        solver
            .ingest_odometry(Key(1), Key(2), step(), cov(), Some(guess))
            .unwrap();
        assert_eq!(solver.values().get(Key(2)), Some(&guess));
    }

    #[test]
    fn test_values_without_factors_rejected() {
        let mut solver = session_with_chain(1);
        let err = solver
            .update(Vec::new(), vec![(TaggedKey::odometry(5), Pose3::identity())], &[])
            .unwrap_err();
        assert_eq!(err, SolverError::ValuesWithoutFactors { count: 1 });
        assert_eq!(solver.values().len(), 2);
    }

    #[test]
    fn test_failed_update_leaves_state_unchanged() {
        let mut solver = session_with_chain(2);
        let before_values = solver.values().clone();
        let before_factors = solver.num_factors();

        // Second factor references a key that never gets a value.
        let err = solver
            .update(
                vec![
                    Factor::odometry(Key(2), Key(3), step(), cov()),
                    Factor::loop_closure(Key(0), Key(42), step(), cov()),
                ],
                vec![(TaggedKey::odometry(3), step())],
                &[],
            )
            .unwrap_err();
        assert_eq!(err, SolverError::UnknownKey(Key(42)));
        assert_eq!(solver.values(), &before_values);
        assert_eq!(solver.num_factors(), before_factors);
        assert_eq!(solver.trajectory().end_id(), Some(Key(2)));
    }

    #[test]
    fn test_duplicate_and_chain_errors() {
        let mut solver = session_with_chain(2);
        assert_eq!(
            solver
                .ingest_odometry(Key(2), Key(2), step(), cov(), None)
                .unwrap_err(),
            SolverError::DuplicateKey(Key(2))
        );
        assert!(matches!(
            solver.ingest_odometry(Key(1), Key(3), step(), cov(), None),
            Err(SolverError::NonContiguousOdometry { .. })
        ));
        assert_eq!(
            solver.ingest_prior(Key(7), Pose3::identity(), cov()).unwrap_err(),
            SolverError::PriorOnNonEmptyTrajectory(Key(7))
        );
        assert_eq!(
            solver.update(Vec::new(), Vec::new(), &[FactorIndex(99)]).unwrap_err(),
            SolverError::UnknownFactor(FactorIndex(99))
        );
    }

    #[test]
    fn test_odometry_before_prior() {
        let mut solver = PoseGraphSolver::new(&SetuConfig::default());
        assert!(matches!(
            solver.ingest_odometry(Key(0), Key(1), step(), cov(), None),
            Err(SolverError::OdometryBeforePrior { .. })
        ));
    }

    #[test]
    fn test_consistent_loop_closure_admitted_and_optimized() {
        let mut solver = session_with_chain(6);
        let edge = exact_edge(&solver, 0, 6);
        let outcome = solver.add_loop_closure(&edge).unwrap();

        assert_eq!(outcome.decision, TriggerDecision::Force);
        assert_eq!(outcome.admitted.len(), 1);
        assert!(outcome.values_updated());
        assert_eq!(solver.loop_closure_edges().len(), 1);
        assert_eq!(solver.state().active_loop_closures().len(), 1);
    }

    #[test]
    fn test_inconsistent_loop_closure_rejected_without_solve() {
        let mut solver = session_with_chain(6);
        let mut edge = exact_edge(&solver, 0, 6);
        edge.pose = edge.pose.compose(&Pose3::from_xyz_rpy(20.0, -15.0, 3.0, 0.0, 0.0, 2.0));

        let outcome = solver.add_loop_closure(&edge).unwrap();
        assert_eq!(outcome.decision, TriggerDecision::Skip);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.factor_indices, vec![None]);
        assert!(outcome.optimization.is_none());
        assert!(solver.state().loop_closure_factors().is_empty());
    }

    #[test]
    fn test_removing_loop_closure_deactivates_it() {
        let mut solver = session_with_chain(6);
        let outcome = solver.add_loop_closure(&exact_edge(&solver, 1, 5)).unwrap();
        let index = outcome.admitted[0];

        let outcome = solver.update(Vec::new(), Vec::new(), &[index]).unwrap();
        assert_eq!(outcome.decision, TriggerDecision::Force);
        assert!(solver.loop_closure_edges().is_empty());
        assert!(solver.selector().is_empty());

        // Removing an already-removed slot is a no-op.
        assert!(solver.update(Vec::new(), Vec::new(), &[index]).is_ok());
    }

    #[test]
    fn test_pruned_loop_closure_leaves_state() {
        let mut config = SetuConfig::default();
        config.consistency.pairwise_threshold = 1.0;
        config.consistency.max_candidates = 2;
        let mut solver = PoseGraphSolver::new(&config);
        solver.ingest_prior(Key(0), Pose3::identity(), cov()).unwrap();
        for i in 0..6 {
            solver.ingest_odometry(Key(i), Key(i + 1), step(), cov(), None).unwrap();
        }

        let a = solver.add_loop_closure(&exact_edge(&solver, 0, 6)).unwrap().admitted[0];
        let c = solver.add_loop_closure(&exact_edge(&solver, 1, 5)).unwrap().admitted[0];

        // passes the odometric check but disagrees with both stored closures
        let mut edge = exact_edge(&solver, 0, 6);
        edge.pose = edge.pose.compose(&Pose3::from_translation(0.3, 0.0, 0.0));
        let outcome = solver.add_loop_closure(&edge).unwrap();
        let b = outcome.admitted[0];

        assert_eq!(outcome.excluded, vec![b]);
        assert_eq!(outcome.pruned, vec![b]);
        assert_eq!(solver.selector().len(), 2);
        assert_eq!(solver.state().loop_closure_factors(), &[a, c]);
        assert!(solver.state().factors().get(b).is_none());
        assert_eq!(solver.loop_closure_edges().len(), 2);
    }

    #[test]
    fn test_prior_and_odometry_in_one_batch() {
        let mut solver = PoseGraphSolver::new(&SetuConfig::default());
        let outcome = solver
            .update(
                vec![
                    Factor::prior(Key(0), Pose3::identity(), cov()),
                    Factor::odometry(Key(0), Key(1), step(), cov()),
                ],
                vec![
                    (TaggedKey::odometry(0), Pose3::identity()),
                    (TaggedKey::odometry(1), step()),
                ],
                &[],
            )
            .unwrap();
        assert_eq!(outcome.decision, TriggerDecision::Optimize);
        assert!(outcome.values_updated());
        assert_eq!(solver.trajectory().end_id(), Some(Key(1)));
        assert_eq!(
            solver.state().factors().get(FactorIndex(1)).map(Factor::kind),
            Some(FactorKind::Odometry)
        );
    }
}
