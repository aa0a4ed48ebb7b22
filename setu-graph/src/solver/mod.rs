//! Incremental pose-graph session.
//!
//! ```text
//! update(factors, values, removals)
//!   │
//!   ├─ UpdateTrigger::evaluate      skip / optimize / force
//!   ├─ validate                      nothing mutated on error
//!   ├─ apply removals, values, odometry, priors
//!   ├─ loop closures ─► OdometricFilter ─► PairwiseSelector
//!   └─ GraphOptimizer::optimize      values replaced only on success
//! ```

mod session;
mod trigger;

pub use session::{PoseGraphSolver, RejectedLoopClosure, UpdateOutcome};
pub use trigger::{TriggerDecision, UpdateTrigger};
