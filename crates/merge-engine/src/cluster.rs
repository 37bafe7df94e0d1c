//! Role dispatch over the in-process reference transport.

use std::sync::Arc;

use serde::Serialize;

use crate::config::EngineConfig;
use crate::context::{RunContext, RunReport};
use crate::coordinator::Coordinator;
use crate::evaluator::MergeEvaluator;
use crate::graph::Graph;
use crate::index::CommunityIndex;
use crate::spectral::JacobiSolver;
use crate::transport::local_cluster;
use crate::worker::Worker;

/// Build one process's replica of the initial index from loader output.
/// The graph and community collections arrive fully validated; nothing is
/// re-checked here.
pub fn prepare(graph: &Graph, communities: &[Vec<u32>]) -> crate::error::Result<CommunityIndex> {
    CommunityIndex::new(graph.node_count(), communities.to_vec())
}

#[derive(Debug, Serialize)]
pub struct ClusterReport {
    pub coordinator: RunReport,
    pub workers: Vec<RunReport>,
}

/// Run a coordinator and `config.workers` workers as tasks in this process,
/// each owning an independent index replica, until the configured deadline.
pub async fn run_local(
    graph: Arc<Graph>,
    communities: Vec<Vec<u32>>,
    config: EngineConfig,
) -> anyhow::Result<ClusterReport> {
    let (coordinator_links, worker_links) = local_cluster(config.workers);

    let coordinator = Coordinator::new(
        RunContext::new(0, prepare(&graph, &communities)?),
        coordinator_links,
    );

    let mut handles = Vec::with_capacity(config.workers);
    for (i, links) in worker_links.into_iter().enumerate() {
        let rank = i + 1;
        let worker = Worker::new(
            RunContext::new(rank, prepare(&graph, &communities)?),
            links,
            Arc::clone(&graph),
            MergeEvaluator::new(config.params, Box::new(JacobiSolver::default())),
            config.seed.wrapping_add(rank as u64),
        );
        handles.push(tokio::spawn(worker.run()));
    }

    let coordinator_report = tokio::spawn(coordinator.run(config.run_for())).await??;

    let mut workers = Vec::with_capacity(handles.len());
    for handle in handles {
        workers.push(handle.await??);
    }

    Ok(ClusterReport {
        coordinator: coordinator_report,
        workers,
    })
}
