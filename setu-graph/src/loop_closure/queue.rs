//! Pending loop-closure candidates.

use std::collections::VecDeque;

use super::{LoopCandidate, Prioritization};

/// FIFO of candidates awaiting verification.
#[derive(Debug, Clone, Default)]
pub struct CandidateQueue {
    pending: VecDeque<LoopCandidate>,
}

impl CandidateQueue {
    /// Empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one candidate.
    pub fn push(&mut self, candidate: LoopCandidate) {
        self.pending.push_back(candidate);
    }

    /// Append candidates in order.
    pub fn extend(&mut self, candidates: impl IntoIterator<Item = LoopCandidate>) {
        self.pending.extend(candidates);
    }

    /// Reorder pending candidates. Ties keep arrival order.
    pub fn prioritize(&mut self, order: Prioritization) {
        match order {
            Prioritization::Fifo => {}
            Prioritization::NearestFirst => {
                self.pending
                    .make_contiguous()
                    .sort_by(|a, b| a.distance().total_cmp(&b.distance()));
            }
        }
    }

    /// Remove and return everything pending, in queue order.
    pub fn drain(&mut self) -> Vec<LoopCandidate> {
        self.pending.drain(..).collect()
    }

    /// Number of pending candidates.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
