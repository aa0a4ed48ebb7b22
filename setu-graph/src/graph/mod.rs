//! Pose-graph state: factors, values and the raw odometry trajectory.

mod factor;
mod state;
mod trajectory;
mod values;

pub use factor::{Factor, FactorGraph, FactorIndex, FactorKind, Linearization};
pub use state::PoseGraphState;
pub use trajectory::{OdometryTrajectory, TrajectoryPose};
pub use values::Values;
