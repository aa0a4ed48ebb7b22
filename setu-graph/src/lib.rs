//! SetuGraph - incremental 3D pose-graph back-end
//!
//! Ingests odometry and loop-closure constraints, rejects inconsistent
//! closures, verifies candidates by scan registration, and keeps a
//! nonlinear least-squares estimate of every pose.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    solver/                          │  ← Session
//! │      (PoseGraphSolver, update trigger)              │
//! └─────────────────────────────────────────────────────┘
//!            │                          │
//! ┌──────────────────────┐   ┌──────────────────────────┐
//! │    consistency/      │   │     loop_closure/        │  ← Outlier rejection
//! │ (odometric, pairwise,│   │ (scan store, candidate   │     and verification
//! │  max clique)         │   │  queue, batch compute)   │
//! └──────────────────────┘   └──────────────────────────┘
//!            │                          │
//! ┌──────────────────────┐   ┌──────────────────────────┐
//! │  graph/ optimizer    │   │     registration/        │  ← Estimation
//! │ (state, factors, LM) │   │ (ICP, FPFH, SAC-IA, cov) │
//! └──────────────────────┘   └──────────────────────────┘
//!            │                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │       (Pose3, PoseWithCovariance, keys, clouds)     │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Configuration for every layer lives in [`SetuConfig`], loaded from YAML.

#![warn(missing_docs)]

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;
pub mod error;

// ============================================================================
// Layer 2: Graph and estimation (depends on core)
// ============================================================================
pub mod graph;
pub mod optimizer;
pub mod registration;

// ============================================================================
// Layer 3: Outlier rejection and verification (depends on graph, registration)
// ============================================================================
pub mod consistency;
pub mod loop_closure;

// ============================================================================
// Layer 4: Session (depends on all layers)
// ============================================================================
pub mod config;
pub mod solver;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use crate::core::{Key, KeyTag, PointCloud, Pose3, PoseWithCovariance, TaggedKey};

// Graph
pub use graph::{Factor, FactorIndex, PoseGraphState, Values};
pub use optimizer::{GraphOptimizer, OptimizationResult, SolverConfig, SolverKind, TerminationReason};

// Consistency
pub use consistency::{CliqueMethod, ConsistencyCheck, ConsistencyConfig, OdometricFilter, PairwiseSelector};

// Registration and loop closure
pub use loop_closure::{LoopCandidate, LoopClosureComputer, LoopClosureEdge};
pub use registration::{Alignment, RegistrationConfig, RejectionReason, ScanAligner};

// Session
pub use config::SetuConfig;
pub use error::{Result, SolverError};
pub use solver::{PoseGraphSolver, UpdateOutcome};
