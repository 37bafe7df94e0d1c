//! The single authoritative process of the run.
//!
//! The coordinator blocks on its inbox, re-validates every proposal against
//! its own index, and totally orders the merges it accepts: it is the sole
//! writer of the authoritative state and the sole issuer of merged ids.
//! Racing proposals are resolved here by rejection, never by locking.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info};

use crate::context::{RunContext, RunReport};
use crate::error::Result;
use crate::message::Message;
use crate::transport::CoordinatorLinks;

pub struct Coordinator {
    ctx: RunContext,
    links: CoordinatorLinks,
}

impl Coordinator {
    pub fn new(ctx: RunContext, links: CoordinatorLinks) -> Self {
        Self { ctx, links }
    }

    /// Serve proposals until the wall-clock deadline, then broadcast
    /// `Terminate` and stop.
    pub async fn run(mut self, run_for: Duration) -> anyhow::Result<RunReport> {
        let deadline = Instant::now() + run_for;
        info!(
            rank = self.ctx.rank,
            live = self.ctx.index.live_count(),
            "coordinator running"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                frame = self.links.inbox.recv() => match frame {
                    Some(frame) => self.handle(&frame)?,
                    // Every worker hung up; nothing left to coordinate.
                    None => break,
                },
            }
        }

        self.links.broadcast(&Message::Terminate);

        let report = self.ctx.report();
        info!(
            merges = self.ctx.stats.merges_applied,
            stale = self.ctx.stats.stale_rejected,
            invalid = self.ctx.stats.invalid_discarded,
            live = report.live_communities,
            "coordinator stopped"
        );
        Ok(report)
    }

    fn handle(&mut self, frame: &[u8]) -> Result<()> {
        let msg = match Message::decode(frame) {
            Ok(msg) => msg,
            Err(err) => {
                self.ctx.stats.invalid_discarded += 1;
                debug!(%err, "discarding frame");
                return Ok(());
            }
        };

        let (a, b) = match msg {
            Message::Propose { a, b } if a != b => (a, b),
            Message::Propose { a, b } => {
                self.ctx.stats.invalid_discarded += 1;
                debug!(a, b, "discarding self-merge proposal");
                return Ok(());
            }
            // Workers never send updates or termination.
            other => {
                self.ctx.stats.invalid_discarded += 1;
                debug!(?other, "discarding unexpected message kind");
                return Ok(());
            }
        };

        self.ctx.stats.proposals_received += 1;

        // A proposal loses the race when a merge accepted since its sample
        // time consumed either of its ids. Expected, not an error.
        if !self.ctx.index.is_live(a) || !self.ctx.index.is_live(b) {
            self.ctx.stats.stale_rejected += 1;
            debug!(a, b, "stale proposal");
            return Ok(());
        }

        let merged = self.ctx.index.next_id();
        self.ctx.index.apply_update(a, b, merged)?;
        self.ctx.stats.merges_applied += 1;
        debug!(a, b, merged, "merge accepted");

        // The coordinator's own index is already updated; only the workers
        // need the broadcast.
        self.links.broadcast(&Message::Update { a, b, merged });

        Ok(())
    }
}
