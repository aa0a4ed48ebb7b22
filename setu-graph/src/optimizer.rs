//! Nonlinear least-squares over the pose graph.
//!
//! Minimizes the weighted squared error of all active factors:
//!
//! ```text
//! F(x) = Σ e_k(x)ᵀ · Ω_k · e_k(x)
//! ```
//!
//! Where:
//! - `e_k` is the 6-vector error of factor k (see [`crate::graph::Factor`])
//! - `Ω_k` is its information matrix (inverse covariance)
//!
//! Each iteration solves the normal equations
//!
//! ```text
//! (H + λ·D) · Δx = −b        H = Σ Jᵀ Ω J,   b = Σ Jᵀ Ω e
//! ```
//!
//! and retracts every pose by its slice of `Δx`. Levenberg-Marquardt uses
//! diagonal damping `D = diag(max(H_ii, 1))`; Gauss-Newton uses `λ = 0`.
//!
//! The optimizer never mutates its input. It returns a fresh [`Values`] and the
//! caller decides whether to adopt it from [`OptimizationResult::is_usable`].

use std::collections::BTreeMap;

use nalgebra::{DMatrix, DVector, Matrix6, Vector6};
use serde::{Deserialize, Serialize};

use crate::config::defaults;
use crate::core::{Key, Pose3};
use crate::graph::{Factor, FactorKind, Values};

/// Diagonal weight that pins the gauge pose when no prior is present.
const GAUGE_WEIGHT: f64 = 1e10;

/// Nonlinear solver family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKind {
    /// Damped Gauss-Newton with diagonal damping.
    LevenbergMarquardt,
    /// Undamped Gauss-Newton.
    GaussNewton,
}

/// Configuration for graph optimization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Solver family, fixed for the lifetime of a session.
    #[serde(default = "defaults::solver_kind")]
    pub kind: SolverKind,

    /// Maximum number of iterations.
    #[serde(default = "defaults::max_iterations")]
    pub max_iterations: u32,

    /// Stop when the relative error decrease falls below this.
    #[serde(default = "defaults::relative_error_tol")]
    pub relative_error_tol: f64,

    /// Stop when the absolute error decrease falls below this.
    #[serde(default = "defaults::absolute_error_tol")]
    pub absolute_error_tol: f64,

    /// Initial Levenberg-Marquardt damping.
    #[serde(default = "defaults::lambda_initial")]
    pub lambda_initial: f64,

    /// Give up once damping grows past this.
    #[serde(default = "defaults::lambda_upper_bound")]
    pub lambda_upper_bound: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            kind: defaults::solver_kind(),
            max_iterations: defaults::max_iterations(),
            relative_error_tol: defaults::relative_error_tol(),
            absolute_error_tol: defaults::absolute_error_tol(),
            lambda_initial: defaults::lambda_initial(),
            lambda_upper_bound: defaults::lambda_upper_bound(),
        }
    }
}

/// Reason for optimization termination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Error decrease below tolerance.
    Converged,

    /// Maximum iterations reached.
    MaxIterations,

    /// Error increased and could not be recovered.
    Diverged,

    /// Linear system solve failed or produced non-finite values.
    SolveFailed,

    /// Nothing to optimize.
    NoFactors,
}

/// Result of graph optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationResult {
    /// Number of iterations performed.
    pub iterations: u32,

    /// Initial weighted squared error.
    pub initial_error: f64,

    /// Final weighted squared error.
    pub final_error: f64,

    /// Whether the optimization converged.
    pub converged: bool,

    /// Reason for termination.
    pub termination_reason: TerminationReason,
}

impl OptimizationResult {
    fn finish(
        iterations: u32,
        initial_error: f64,
        final_error: f64,
        termination_reason: TerminationReason,
    ) -> Self {
        Self {
            iterations,
            initial_error,
            final_error,
            converged: termination_reason == TerminationReason::Converged,
            termination_reason,
        }
    }

    /// Whether the returned values may replace the current estimate.
    ///
    /// Hitting the iteration cap still counts if the error went down.
    pub fn is_usable(&self) -> bool {
        match self.termination_reason {
            TerminationReason::Converged | TerminationReason::MaxIterations => {
                self.final_error.is_finite() && self.final_error <= self.initial_error * (1.0 + 1e-9)
            }
            TerminationReason::NoFactors => true,
            TerminationReason::Diverged | TerminationReason::SolveFailed => false,
        }
    }
}

/// Pose-graph optimizer dispatching on [`SolverKind`].
#[derive(Debug, Clone)]
pub struct GraphOptimizer {
    config: SolverConfig,
}

impl GraphOptimizer {
    /// Create a new graph optimizer.
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Current configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Solve starting from `initial`.
    ///
    /// Returns the result and the optimized values. Keys no factor touches are
    /// copied through unchanged.
    pub fn optimize(&self, factors: &[&Factor], initial: &Values) -> (OptimizationResult, Values) {
        let problem = Problem::new(factors, initial);
        if problem.factors.is_empty() || problem.index.is_empty() {
            return (
                OptimizationResult::finish(0, 0.0, 0.0, TerminationReason::NoFactors),
                initial.clone(),
            );
        }

        let damped = self.config.kind == SolverKind::LevenbergMarquardt;
        let mut current = initial.clone();
        let initial_error = problem.chi_squared(&current);
        let mut current_error = initial_error;

        if !initial_error.is_finite() {
            return (
                OptimizationResult::finish(0, initial_error, initial_error, TerminationReason::SolveFailed),
                current,
            );
        }

        let mut lambda = self.config.lambda_initial;
        let mut iterations = 0;

        while iterations < self.config.max_iterations {
            iterations += 1;

            if current_error <= self.config.absolute_error_tol * 1e-3 {
                return (
                    OptimizationResult::finish(iterations, initial_error, current_error, TerminationReason::Converged),
                    current,
                );
            }

            let (mut h, b) = problem.build_linear_system(&current);
            if damped {
                for i in 0..h.nrows() {
                    h[(i, i)] += lambda * h[(i, i)].max(1.0);
                }
            }

            let Some(dx) = h.cholesky().map(|c| -c.solve(&b)) else {
                if damped && lambda < self.config.lambda_upper_bound {
                    lambda *= 10.0;
                    continue;
                }
                log::warn!("Pose graph solve failed at iteration {}", iterations);
                return (
                    OptimizationResult::finish(iterations, initial_error, current_error, TerminationReason::SolveFailed),
                    current,
                );
            };

            let candidate = problem.retract(&current, &dx);
            let new_error = problem.chi_squared(&candidate);

            if !new_error.is_finite() {
                return (
                    OptimizationResult::finish(iterations, initial_error, current_error, TerminationReason::SolveFailed),
                    current,
                );
            }

            if damped {
                if new_error > current_error {
                    // Reject step, trust the linearization less
                    lambda *= 10.0;
                    if lambda > self.config.lambda_upper_bound {
                        let reason = if current_error < initial_error {
                            TerminationReason::Converged
                        } else {
                            TerminationReason::Diverged
                        };
                        return (
                            OptimizationResult::finish(iterations, initial_error, current_error, reason),
                            current,
                        );
                    }
                    continue;
                }
                lambda = (lambda * 0.1).max(1e-10);
            } else if new_error > current_error * 1.1 {
                return (
                    OptimizationResult::finish(iterations, initial_error, current_error, TerminationReason::Diverged),
                    current,
                );
            }

            let decrease = current_error - new_error;
            let relative = decrease.abs() / current_error.max(1e-12);
            current = candidate;
            current_error = new_error;

            if decrease.abs() < self.config.absolute_error_tol || relative < self.config.relative_error_tol {
                return (
                    OptimizationResult::finish(iterations, initial_error, current_error, TerminationReason::Converged),
                    current,
                );
            }
        }

        (
            OptimizationResult::finish(iterations, initial_error, current_error, TerminationReason::MaxIterations),
            current,
        )
    }
}

/// Factors with their key-to-column mapping.
struct Problem<'a> {
    factors: Vec<(&'a Factor, Matrix6<f64>)>,
    index: BTreeMap<Key, usize>,
    gauge: Option<usize>,
}

impl<'a> Problem<'a> {
    fn new(factors: &[&'a Factor], values: &Values) -> Self {
        let mut usable = Vec::with_capacity(factors.len());
        let mut index = BTreeMap::new();

        for factor in factors {
            let keys = factor.keys();
            if let Some(missing) = keys.iter().find(|k| !values.contains(**k)) {
                log::warn!("Skipping factor on {} without a value", missing);
                continue;
            }
            for key in keys {
                let next = index.len();
                index.entry(key).or_insert(next);
            }
            usable.push((*factor, factor.information()));
        }

        // Renumber so columns follow key order
        for (column, slot) in index.values_mut().enumerate() {
            *slot = column;
        }

        let has_prior = usable.iter().any(|(f, _)| f.kind() == FactorKind::Prior);
        let gauge = if has_prior { None } else { Some(0) };

        Self {
            factors: usable,
            index,
            gauge,
        }
    }

    fn dim(&self) -> usize {
        self.index.len() * 6
    }

    fn poses<'v>(&self, factor: &Factor, values: &'v Values) -> Option<(&'v Pose3, Option<&'v Pose3>)> {
        let keys = factor.keys();
        let xi = values.get(keys[0])?;
        let xj = match keys.get(1) {
            Some(k) => Some(values.get(*k)?),
            None => None,
        };
        Some((xi, xj))
    }

    fn chi_squared(&self, values: &Values) -> f64 {
        self.factors
            .iter()
            .filter_map(|(factor, info)| {
                let (xi, xj) = self.poses(factor, values)?;
                let e = factor.error(xi, xj);
                Some((e.transpose() * info * e)[(0, 0)])
            })
            .sum()
    }

    fn build_linear_system(&self, values: &Values) -> (DMatrix<f64>, DVector<f64>) {
        let dim = self.dim();
        let mut h = DMatrix::<f64>::zeros(dim, dim);
        let mut b = DVector::<f64>::zeros(dim);

        for (factor, info) in &self.factors {
            let Some((xi, xj)) = self.poses(factor, values) else {
                continue;
            };
            let Some(lin) = factor.linearize(xi, xj) else {
                continue;
            };
            let weighted_error: Vector6<f64> = info * lin.error;

            for (key_r, j_r) in &lin.jacobians {
                let r = self.index[key_r] * 6;
                let jt_info = j_r.transpose() * info;
                let mut b_block = b.fixed_rows_mut::<6>(r);
                b_block += j_r.transpose() * weighted_error;

                for (key_c, j_c) in &lin.jacobians {
                    let c = self.index[key_c] * 6;
                    let mut h_block = h.fixed_view_mut::<6, 6>(r, c);
                    h_block += jt_info * j_c;
                }
            }
        }

        if let Some(g) = self.gauge {
            for i in 0..6 {
                h[(g * 6 + i, g * 6 + i)] += GAUGE_WEIGHT;
            }
        }

        (h, b)
    }

    fn retract(&self, values: &Values, dx: &DVector<f64>) -> Values {
        values
            .iter()
            .map(|(key, pose)| match self.index.get(&key) {
                Some(col) => {
                    let delta: Vector6<f64> = dx.fixed_rows::<6>(col * 6).into_owned();
                    (key, pose.retract(&delta))
                }
                None => (key, *pose),
            })
            .collect()
    }
}
