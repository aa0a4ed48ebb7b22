//! Decides whether an update batch warrants re-optimization.

use crate::core::{Pose3, TaggedKey};
use crate::error::{Result, SolverError};

/// What to do with the optimizer after applying a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Apply the batch without solving.
    Skip,
    /// Solve after applying.
    Optimize,
    /// Solve after applying, regardless of later loop-closure outcomes.
    Force,
}

impl TriggerDecision {
    /// True unless [`TriggerDecision::Skip`].
    #[inline]
    pub fn should_optimize(self) -> bool {
        self != TriggerDecision::Skip
    }
}

/// Batch-shape rule for re-optimization.
///
/// | factors | values          | removals | decision              |
/// |---------|-----------------|----------|-----------------------|
/// | 0       | > 0             | any      | `ValuesWithoutFactors`|
/// | 0       | 0               | 0        | Skip                  |
/// | 1       | 1, odometry tag | 0        | Skip                  |
/// | any     | any             | > 0      | Force                 |
/// | other   |                 |          | Optimize              |
pub struct UpdateTrigger;

impl UpdateTrigger {
    /// Classify a batch before it is applied.
    pub fn evaluate(
        num_factors: usize,
        new_values: &[(TaggedKey, Pose3)],
        num_removed: usize,
    ) -> Result<TriggerDecision> {
        if num_factors == 0 && !new_values.is_empty() {
            log::error!(
                "Update adds {} value(s) without factors, rejecting",
                new_values.len()
            );
            return Err(SolverError::ValuesWithoutFactors {
                count: new_values.len(),
            });
        }

        if num_removed > 0 {
            log::debug!("Trigger: {} removal(s), forcing optimization", num_removed);
            return Ok(TriggerDecision::Force);
        }

        if num_factors == 0 {
            log::debug!("Trigger: empty update, skipping");
            return Ok(TriggerDecision::Skip);
        }

        if let [(tagged, _)] = new_values {
            if num_factors == 1 && !tagged.is_loop_closure() {
                log::debug!("Trigger: routine step to {}, skipping", tagged.key);
                return Ok(TriggerDecision::Skip);
            }
        }

        if new_values.len() > 1 && !new_values.iter().any(|(k, _)| k.is_loop_closure()) {
            log::warn!(
                "Unexpected batch: {} factor(s) and {} odometry value(s)",
                num_factors,
                new_values.len()
            );
        }

        log::debug!(
            "Trigger: {} factor(s), {} value(s), optimizing",
            num_factors,
            new_values.len()
        );
        Ok(TriggerDecision::Optimize)
    }
}
