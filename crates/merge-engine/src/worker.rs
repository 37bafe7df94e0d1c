//! The search loop run by every non-coordinator process.
//!
//! A worker alternates between two phases: a non-blocking drain of pending
//! broadcasts (replaying each accepted merge into its local replica) and one
//! sample-evaluate-propose step. It never waits for the outcome of its own
//! proposals; a proposal that loses a race is silently rejected upstream.
//! An in-flight evaluation always finishes before termination is rechecked,
//! so shutdown latency is bounded by one evaluation.

use std::sync::Arc;

use rand::Rng;
use rand::SeedableRng;
use rand_pcg::Pcg64;
use tracing::{debug, info, trace};

use crate::context::{RunContext, RunReport};
use crate::error::{EngineError, Result};
use crate::evaluator::{CommunityRef, MergeEvaluator, Rejection, Verdict};
use crate::graph::Graph;
use crate::message::Message;
use crate::transport::{Inbound, WorkerLinks};

/// Bound on resampling per loop iteration; on a graph with almost no
/// multi-community nodes left, the worker yields instead of spinning inside
/// the sampler.
const MAX_SAMPLE_ATTEMPTS: usize = 64;

pub struct Worker {
    ctx: RunContext,
    links: WorkerLinks,
    graph: Arc<Graph>,
    evaluator: MergeEvaluator,
    rng: Pcg64,
}

impl Worker {
    pub fn new(
        ctx: RunContext,
        links: WorkerLinks,
        graph: Arc<Graph>,
        evaluator: MergeEvaluator,
        seed: u64,
    ) -> Self {
        Self {
            ctx,
            links,
            graph,
            evaluator,
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    pub async fn run(mut self) -> anyhow::Result<RunReport> {
        info!(
            rank = self.ctx.rank,
            live = self.ctx.index.live_count(),
            "worker running"
        );

        'search: loop {
            // Drain everything already waiting, in arrival order.
            loop {
                match self.links.inbox.poll() {
                    Inbound::Frame(frame) => {
                        if self.handle(&frame)? {
                            break 'search;
                        }
                    }
                    Inbound::Empty => break,
                    Inbound::Closed => break 'search,
                }
            }

            if let Some((a, b)) = self.sample_pair() {
                self.evaluate_and_propose(a, b);
            }

            tokio::task::yield_now().await;
        }

        let report = self.ctx.report();
        info!(
            rank = self.ctx.rank,
            sent = self.ctx.stats.proposals_sent,
            received = self.ctx.stats.updates_received,
            live = report.live_communities,
            "worker stopped"
        );
        Ok(report)
    }

    /// Apply one inbound frame. Returns `Ok(true)` on termination.
    fn handle(&mut self, frame: &[u8]) -> Result<bool> {
        let msg = match Message::decode(frame) {
            Ok(msg) => msg,
            Err(err) => {
                self.ctx.stats.invalid_discarded += 1;
                debug!(%err, "discarding frame");
                return Ok(false);
            }
        };

        match msg {
            Message::Update { a, b, merged } => {
                self.ctx.stats.updates_received += 1;
                // Broadcast order matches the coordinator's apply order, so
                // both inputs must still be live here; a miss means this
                // replica has diverged and cannot be trusted. A malformed
                // update, by contrast, is counted and dropped like any other
                // bad frame.
                match self.ctx.index.apply_update(a, b, merged) {
                    Ok(true) => {
                        self.ctx.stats.merges_applied += 1;
                        trace!(a, b, merged, "replayed merge");
                        Ok(false)
                    }
                    Ok(false) => Err(EngineError::IndexCorruption(format!(
                        "update ({a},{b})->{merged} named a dead id on replica {}",
                        self.ctx.rank
                    ))),
                    Err(EngineError::InvalidMessage(reason)) => {
                        self.ctx.stats.invalid_discarded += 1;
                        debug!(%reason, "discarding malformed update");
                        Ok(false)
                    }
                    Err(err) => Err(err),
                }
            }
            Message::Terminate => Ok(true),
            Message::Propose { .. } => {
                self.ctx.stats.invalid_discarded += 1;
                Ok(false)
            }
        }
    }

    /// Pick a random node with at least two community memberships, then two
    /// random entries of its list (with replacement), resolved to live
    /// representatives. Distinct, size-capped pairs are evaluated; anything
    /// else is resampled a bounded number of times.
    fn sample_pair(&mut self) -> Option<(u32, u32)> {
        let node_count = self.ctx.index.node_count() as u32;
        let cap = self.evaluator.params().max_community_size;

        for _ in 0..MAX_SAMPLE_ATTEMPTS {
            let node = self.rng.random_range(0..node_count);
            let memberships = self.ctx.index.node_communities(node);
            if memberships.len() < 2 {
                continue;
            }

            let first = memberships[self.rng.random_range(0..memberships.len())];
            let second = memberships[self.rng.random_range(0..memberships.len())];

            let a = self.ctx.index.resolve_live(first);
            let b = self.ctx.index.resolve_live(second);
            if a == b {
                continue;
            }

            let size_a = self.ctx.index.data(a).map(|d| d.len()).unwrap_or(usize::MAX);
            let size_b = self.ctx.index.data(b).map(|d| d.len()).unwrap_or(usize::MAX);
            if size_a > cap || size_b > cap {
                continue;
            }

            return Some((a, b));
        }

        None
    }

    fn evaluate_and_propose(&mut self, a: u32, b: u32) {
        let evaluation = {
            let da = match self.ctx.index.data(a) {
                Some(data) => data,
                None => return,
            };
            let db = match self.ctx.index.data(b) {
                Some(data) => data,
                None => return,
            };
            self.evaluator.check_pair(
                &self.graph,
                CommunityRef {
                    id: a,
                    nodes: &da.nodes,
                    spectral: da.spectral,
                },
                CommunityRef {
                    id: b,
                    nodes: &db.nodes,
                    spectral: db.spectral,
                },
            )
        };

        self.ctx.stats.pairs_checked += 1;

        // An input eigenvalue is cached whatever the verdict; the spectral
        // gate rejects far more often than it accepts.
        if let Some((id, ev)) = evaluation.computed_input {
            self.ctx.index.set_spectral(id, ev);
        }

        match evaluation.verdict {
            Verdict::Accepted(acc) => {
                if acc.embedding {
                    self.ctx.stats.embedding_accepts += 1;
                } else {
                    self.ctx.stats.overlap_pass += 1;
                    self.ctx.stats.edge_pass += 1;
                    self.ctx.stats.spectral_pass += 1;
                }
                self.links.coordinator.send(&Message::Propose { a, b });
                self.ctx.stats.proposals_sent += 1;
                debug!(a, b, "proposed merge");
            }
            Verdict::Rejected(reason) => {
                match reason {
                    Rejection::Overlap => {}
                    Rejection::EdgeCut => {
                        self.ctx.stats.overlap_pass += 1;
                    }
                    Rejection::SpectralGain => {
                        self.ctx.stats.overlap_pass += 1;
                        self.ctx.stats.edge_pass += 1;
                    }
                    Rejection::Solver => {
                        self.ctx.stats.overlap_pass += 1;
                        self.ctx.stats.edge_pass += 1;
                        self.ctx.stats.solver_failures += 1;
                    }
                }
                trace!(a, b, ?reason, "pair rejected");
            }
        }
    }
}
