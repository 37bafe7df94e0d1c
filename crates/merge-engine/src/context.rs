//! Per-process run state: the index replica and all counters.
//!
//! Every mutable counter lives here rather than in process-wide statics, so
//! a test can build two contexts side by side, replay the same update
//! sequence into both, and assert that they converge.

use serde::Serialize;

use crate::index::CommunityIndex;

/// Counters accumulated over one run of a coordinator or worker loop.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    /// Proposals this worker fired at the coordinator.
    pub proposals_sent: u64,
    /// Proposals the coordinator received.
    pub proposals_received: u64,
    /// Update broadcasts this worker drained.
    pub updates_received: u64,
    /// Proposals naming an id that was no longer live at validation time.
    pub stale_rejected: u64,
    /// Undecodable or impossible messages.
    pub invalid_discarded: u64,
    /// Merges applied to the local index replica.
    pub merges_applied: u64,
    /// Candidate pairs run through the evaluator.
    pub pairs_checked: u64,
    /// Pairs that passed the overlap gate.
    pub overlap_pass: u64,
    /// Pairs that passed the edge-cut gate.
    pub edge_pass: u64,
    /// Pairs that passed the spectral-gain gate.
    pub spectral_pass: u64,
    /// Pairs accepted through the embedding shortcut.
    pub embedding_accepts: u64,
    /// Eigensolver failures (each one a conservative rejection).
    pub solver_failures: u64,
}

/// One process's worth of state, threaded through its loop.
pub struct RunContext {
    pub rank: usize,
    pub index: CommunityIndex,
    pub stats: RunStats,
}

impl RunContext {
    pub fn new(rank: usize, index: CommunityIndex) -> Self {
        Self {
            rank,
            index,
            stats: RunStats::default(),
        }
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            rank: self.rank,
            live_communities: self.index.live_count(),
            max_live_id: self.index.max_live_id(),
            stats: self.stats.clone(),
        }
    }
}

/// Informational exit report; not part of the replication contract.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub rank: usize,
    pub live_communities: usize,
    pub max_live_id: Option<u32>,
    pub stats: RunStats,
}
