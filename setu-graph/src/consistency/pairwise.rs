//! Pairwise consistency graph and inlier selection.
//!
//! Two loop closures `a: i → j` and `b: k → l` are consistent when the cycle
//!
//! ```text
//! i ──z_a──► j ──odom──► l ──z_b⁻¹──► k ──odom──► i
//! ```
//!
//! closes within the pairwise χ² bound. Consistent pairs are joined by an
//! edge, and the inlier set is a maximum clique of that graph.

use std::collections::{BTreeSet, HashMap};

use super::clique::{greedy_clique, maximum_clique};
use super::odometric::odometry_between;
use super::{CliqueMethod, ConsistencyConfig};
use crate::core::{Key, PoseWithCovariance};
use crate::graph::{FactorIndex, OdometryTrajectory};

/// A loop closure admitted by the odometric filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopClosureCandidate {
    /// Factor slot holding the loop closure.
    pub factor: FactorIndex,
    /// Source key.
    pub from: Key,
    /// Target key.
    pub to: Key,
    /// Measured relative pose with covariance.
    pub measurement: PoseWithCovariance,
}

impl LoopClosureCandidate {
    /// Squared Mahalanobis distance of the cycle through `self` and `other`.
    ///
    /// `None` if an endpoint is off the trajectory.
    pub fn pairwise_distance_sq(
        &self,
        other: &LoopClosureCandidate,
        trajectory: &OdometryTrajectory,
    ) -> Option<f64> {
        let odom_jl = odometry_between(trajectory, self.to, other.to)?;
        let odom_ki = odometry_between(trajectory, other.from, self.from)?;

        let cycle = self
            .measurement
            .compose(&odom_jl)
            .compose(&other.measurement.inverse())
            .compose(&odom_ki);

        Some(cycle.mahalanobis_sq().unwrap_or(f64::INFINITY))
    }
}

/// Undirected graph of candidates with pairwise-consistency edges.
///
/// Nodes live in an arena and keep their id until removed; removed slots are
/// tombstoned so ids of older nodes never shift. Lower ids are older.
#[derive(Debug, Clone, Default)]
pub struct ConsistencyGraph {
    nodes: Vec<Option<LoopClosureCandidate>>,
    adjacency: Vec<BTreeSet<usize>>,
    node_of: HashMap<FactorIndex, usize>,
}

impl ConsistencyGraph {
    /// Empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.node_of.len()
    }

    /// True if there are no live nodes.
    pub fn is_empty(&self) -> bool {
        self.node_of.is_empty()
    }

    /// True if the factor is a live node.
    pub fn contains(&self, factor: FactorIndex) -> bool {
        self.node_of.contains_key(&factor)
    }

    /// Live node ids, oldest first.
    pub fn live_nodes(&self) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(id, node)| node.map(|_| id))
            .collect()
    }

    /// Candidate stored at a node id.
    pub fn node(&self, id: usize) -> Option<&LoopClosureCandidate> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    /// Number of consistent partners of a factor.
    pub fn degree(&self, factor: FactorIndex) -> Option<usize> {
        self.node_of.get(&factor).map(|id| self.adjacency[*id].len())
    }

    /// Adjacency sets indexed by node id.
    pub fn adjacency(&self) -> &[BTreeSet<usize>] {
        &self.adjacency
    }

    fn add_node(&mut self, candidate: LoopClosureCandidate) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Some(candidate));
        self.adjacency.push(BTreeSet::new());
        self.node_of.insert(candidate.factor, id);
        id
    }

    fn connect(&mut self, a: usize, b: usize) {
        self.adjacency[a].insert(b);
        self.adjacency[b].insert(a);
    }

    fn remove(&mut self, factor: FactorIndex) -> Option<LoopClosureCandidate> {
        let id = self.node_of.remove(&factor)?;
        let neighbors = std::mem::take(&mut self.adjacency[id]);
        for n in neighbors {
            self.adjacency[n].remove(&id);
        }
        self.nodes[id].take()
    }
}

/// Maintains the consistency graph and picks the inlier set.
#[derive(Debug, Clone)]
pub struct PairwiseSelector {
    config: ConsistencyConfig,
    graph: ConsistencyGraph,
    inliers: BTreeSet<FactorIndex>,
    pruned: Vec<FactorIndex>,
}

impl PairwiseSelector {
    /// Create an empty selector.
    pub fn new(config: ConsistencyConfig) -> Self {
        Self {
            config,
            graph: ConsistencyGraph::new(),
            inliers: BTreeSet::new(),
            pruned: Vec::new(),
        }
    }

    /// Underlying consistency graph.
    pub fn graph(&self) -> &ConsistencyGraph {
        &self.graph
    }

    /// Number of stored candidates.
    pub fn len(&self) -> usize {
        self.graph.len()
    }

    /// True if no candidates are stored.
    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    /// Inliers from the last [`find_inliers`](Self::find_inliers).
    pub fn inliers(&self) -> &BTreeSet<FactorIndex> {
        &self.inliers
    }

    /// Factors pruned since the last call, oldest first.
    ///
    /// A pruned candidate is gone from the graph for good; the owner should
    /// drop its factor too.
    pub fn take_pruned(&mut self) -> Vec<FactorIndex> {
        std::mem::take(&mut self.pruned)
    }

    /// Add a candidate and test it against every stored one.
    ///
    /// Returns `false` if the factor is already stored.
    pub fn insert(&mut self, candidate: LoopClosureCandidate, trajectory: &OdometryTrajectory) -> bool {
        if self.graph.contains(candidate.factor) {
            return false;
        }

        let partners: Vec<usize> = self
            .graph
            .live_nodes()
            .into_iter()
            .filter(|id| {
                self.graph.node(*id).is_some_and(|other| {
                    candidate
                        .pairwise_distance_sq(other, trajectory)
                        .is_some_and(|d2| d2 < self.config.pairwise_threshold)
                })
            })
            .collect();

        let id = self.graph.add_node(candidate);
        for other in &partners {
            self.graph.connect(id, *other);
        }

        log::debug!(
            "Loop closure {} ({} -> {}) consistent with {} stored candidate(s)",
            candidate.factor,
            candidate.from,
            candidate.to,
            partners.len()
        );
        true
    }

    /// Drop a candidate.
    pub fn remove(&mut self, factor: FactorIndex) -> bool {
        self.inliers.remove(&factor);
        self.graph.remove(factor).is_some()
    }

    /// Recompute the maximum clique and return its factors.
    ///
    /// When the pool exceeds `max_candidates`, the oldest non-inliers are
    /// pruned afterwards and reported by [`take_pruned`](Self::take_pruned).
    pub fn find_inliers(&mut self) -> Vec<FactorIndex> {
        let live = self.graph.live_nodes();
        let clique = match self.config.clique_method {
            CliqueMethod::Exact if live.len() <= self.config.max_exact_candidates => {
                maximum_clique(self.graph.adjacency(), &live)
            }
            CliqueMethod::Exact => {
                log::debug!(
                    "{} candidates exceed exact limit {}, using greedy clique",
                    live.len(),
                    self.config.max_exact_candidates
                );
                greedy_clique(self.graph.adjacency(), &live)
            }
            CliqueMethod::Greedy => greedy_clique(self.graph.adjacency(), &live),
        };

        self.inliers = clique
            .iter()
            .filter_map(|id| self.graph.node(*id).map(|c| c.factor))
            .collect();

        self.prune(&clique);

        log::info!(
            "Pairwise consistency: {} of {} loop closures are inliers",
            self.inliers.len(),
            self.graph.len()
        );
        self.inliers.iter().copied().collect()
    }

    fn prune(&mut self, clique: &[usize]) {
        let excess = self.graph.len().saturating_sub(self.config.max_candidates);
        if excess == 0 {
            return;
        }

        let victims: Vec<FactorIndex> = self
            .graph
            .live_nodes()
            .into_iter()
            .filter(|id| clique.binary_search(id).is_err())
            .filter_map(|id| self.graph.node(id).map(|c| c.factor))
            .take(excess)
            .collect();

        for factor in &victims {
            self.graph.remove(*factor);
        }
        log::debug!("Pruned {} oldest outlier candidate(s)", victims.len());
        self.pruned.extend(victims);
    }
}
