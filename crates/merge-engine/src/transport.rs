//! In-process reference transport.
//!
//! The protocol only assumes reliable, ordered, per-sender-receiver
//! channels; tokio's mpsc channels provide exactly that, so the reference
//! deployment wires a coordinator and N workers as tasks in one process.
//! Broadcast is an independent send per recipient, not an atomic multicast.

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tracing::warn;

use crate::message::Message;

/// Sending half of a channel to one peer.
#[derive(Clone)]
pub struct Peer {
    tx: UnboundedSender<Vec<u8>>,
}

impl Peer {
    /// Encode and send, fire-and-forget. A hung-up receiver is not an
    /// error: the run is terminating and the frame no longer matters.
    pub fn send(&self, msg: &Message) {
        match msg.encode() {
            Ok(frame) => {
                let _ = self.tx.send(frame);
            }
            Err(err) => warn!(%err, "dropping unencodable message"),
        }
    }
}

/// Result of a non-blocking mailbox poll.
pub enum Inbound {
    Frame(Vec<u8>),
    /// Nothing waiting right now.
    Empty,
    /// Every sender hung up; no more frames will ever arrive.
    Closed,
}

/// Receiving half of this process's inbound channel.
pub struct Mailbox {
    rx: UnboundedReceiver<Vec<u8>>,
}

impl Mailbox {
    /// Block until the next frame, or `None` once all senders hung up.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }

    /// Non-blocking poll used by the worker's drain phase.
    pub fn poll(&mut self) -> Inbound {
        match self.rx.try_recv() {
            Ok(frame) => Inbound::Frame(frame),
            Err(TryRecvError::Empty) => Inbound::Empty,
            Err(TryRecvError::Disconnected) => Inbound::Closed,
        }
    }
}

/// Coordinator's endpoints: one merged inbox (per-sender ordering is all the
/// protocol needs) and a channel to every worker.
pub struct CoordinatorLinks {
    pub inbox: Mailbox,
    pub workers: Vec<Peer>,
}

impl CoordinatorLinks {
    pub fn broadcast(&self, msg: &Message) {
        for peer in &self.workers {
            peer.send(msg);
        }
    }
}

/// A worker's endpoints.
pub struct WorkerLinks {
    pub inbox: Mailbox,
    pub coordinator: Peer,
}

/// Wire up a coordinator and `worker_count` workers with in-process
/// channels.
pub fn local_cluster(worker_count: usize) -> (CoordinatorLinks, Vec<WorkerLinks>) {
    let (to_coordinator, coordinator_rx) = mpsc::unbounded_channel();

    let mut worker_peers = Vec::with_capacity(worker_count);
    let mut worker_links = Vec::with_capacity(worker_count);

    for _ in 0..worker_count {
        let (to_worker, worker_rx) = mpsc::unbounded_channel();
        worker_peers.push(Peer { tx: to_worker });
        worker_links.push(WorkerLinks {
            inbox: Mailbox { rx: worker_rx },
            coordinator: Peer {
                tx: to_coordinator.clone(),
            },
        });
    }

    let coordinator = CoordinatorLinks {
        inbox: Mailbox { rx: coordinator_rx },
        workers: worker_peers,
    };

    (coordinator, worker_links)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_arrive_in_send_order() {
        let (mut coordinator, workers) = local_cluster(2);

        workers[0].coordinator.send(&Message::Propose { a: 1, b: 2 });
        workers[0].coordinator.send(&Message::Propose { a: 3, b: 4 });

        let first = Message::decode(&coordinator.inbox.recv().await.unwrap()).unwrap();
        let second = Message::decode(&coordinator.inbox.recv().await.unwrap()).unwrap();
        assert_eq!(first, Message::Propose { a: 1, b: 2 });
        assert_eq!(second, Message::Propose { a: 3, b: 4 });
    }

    #[tokio::test]
    async fn broadcast_reaches_every_worker() {
        let (coordinator, mut workers) = local_cluster(3);
        coordinator.broadcast(&Message::Terminate);

        for links in &mut workers {
            match links.inbox.poll() {
                Inbound::Frame(frame) => {
                    assert_eq!(Message::decode(&frame).unwrap(), Message::Terminate)
                }
                _ => panic!("expected a frame"),
            }
        }
    }

    #[tokio::test]
    async fn poll_distinguishes_empty_from_closed() {
        let (coordinator, mut workers) = local_cluster(1);
        assert!(matches!(workers[0].inbox.poll(), Inbound::Empty));
        drop(coordinator);
        assert!(matches!(workers[0].inbox.poll(), Inbound::Closed));
    }
}
