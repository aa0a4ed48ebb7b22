//! Batch verification of queued candidates.

use std::sync::Arc;

use super::{CandidateQueue, InsertOutcome, LoopCandidate, LoopClosureConfig, LoopClosureEdge, ScanStore};
use crate::core::{Key, PointCloud};
use crate::registration::{RegistrationConfig, RegistrationError, RejectionReason, ScanAligner};

/// Summary of one [`LoopClosureComputer::compute_transforms`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Candidates turned into edges.
    pub aligned: usize,
    /// Candidates dropped because a scan was missing.
    pub skipped: usize,
    /// Candidates that failed registration, with the reason.
    pub rejected: Vec<(LoopCandidate, RejectionReason)>,
}

impl BatchReport {
    /// Number of candidates consumed by the batch.
    pub fn total(&self) -> usize {
        self.aligned + self.skipped + self.rejected.len()
    }
}

/// Owns keyed scans, pending candidates and verified edges.
pub struct LoopClosureComputer {
    config: LoopClosureConfig,
    aligner: ScanAligner,
    scans: ScanStore,
    input: CandidateQueue,
    output: Vec<LoopClosureEdge>,
}

impl LoopClosureComputer {
    /// Create a computer with its own [`ScanAligner`].
    pub fn new(
        config: LoopClosureConfig,
        registration: RegistrationConfig,
    ) -> Result<Self, RegistrationError> {
        Ok(Self {
            config,
            aligner: ScanAligner::new(registration)?,
            scans: ScanStore::new(),
            input: CandidateQueue::new(),
            output: Vec::new(),
        })
    }

    /// Registration engine.
    pub fn aligner(&self) -> &ScanAligner {
        &self.aligner
    }

    /// Stored scans.
    pub fn scans(&self) -> &ScanStore {
        &self.scans
    }

    /// Candidates waiting for the next batch.
    pub fn pending(&self) -> usize {
        self.input.len()
    }

    /// Store the scan taken at `key`.
    pub fn insert_scan(&mut self, key: Key, scan: impl Into<Arc<PointCloud>>) -> InsertOutcome {
        self.scans.insert(key, scan)
    }

    /// Queue candidates for the next batch.
    pub fn add_candidates(&mut self, candidates: impl IntoIterator<Item = LoopCandidate>) {
        self.input.extend(candidates);
    }

    /// Verify every candidate pending at call time.
    ///
    /// Accepted edges accumulate until [`take_loop_closures`](Self::take_loop_closures).
    pub fn compute_transforms(&mut self) -> BatchReport {
        self.input.prioritize(self.config.prioritization);
        let batch = self.input.drain();
        let mut report = BatchReport::default();

        for candidate in batch {
            let (Some(scan_from), Some(scan_to)) = (self.scans.get(candidate.from), self.scans.get(candidate.to))
            else {
                let missing = if self.scans.contains(candidate.from) {
                    candidate.to
                } else {
                    candidate.from
                };
                log::debug!(
                    "Skipping {} -> {}: {}",
                    candidate.from,
                    candidate.to,
                    RejectionReason::MissingScan(missing)
                );
                report.skipped += 1;
                continue;
            };

            match self.aligner.align(
                candidate.from,
                &scan_from,
                &candidate.pose_from,
                candidate.to,
                &scan_to,
                &candidate.pose_to,
            ) {
                Ok(alignment) => {
                    log::debug!(
                        "Verified {} -> {} (fitness {:.4})",
                        candidate.from,
                        candidate.to,
                        alignment.fitness
                    );
                    self.output.push(LoopClosureEdge {
                        from: candidate.from,
                        to: candidate.to,
                        pose: alignment.pose,
                        covariance: alignment.covariance,
                    });
                    report.aligned += 1;
                }
                Err(reason) => {
                    log::debug!("Rejected {} -> {}: {}", candidate.from, candidate.to, reason);
                    report.rejected.push((candidate, reason));
                }
            }
        }

        if report.total() > 0 {
            log::info!(
                "Loop closure batch: {} aligned, {} skipped, {} rejected",
                report.aligned,
                report.skipped,
                report.rejected.len()
            );
        }
        report
    }

    /// Hand over every verified edge.
    pub fn take_loop_closures(&mut self) -> Vec<LoopClosureEdge> {
        std::mem::take(&mut self.output)
    }
}
