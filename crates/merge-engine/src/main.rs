//! Demo driver: refine a synthetic ring of overlapping cliques.
//!
//! Every knob is a `CONFLUX_*` environment variable; the exit reports are
//! printed as JSON so runs can be diffed or scripted.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use conflux_core::{run_local, EngineConfig, Graph};

const DEFAULT_CLIQUES: usize = 24;
const DEFAULT_CLIQUE_SIZE: usize = 12;

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// A ring of cliques bridged by single edges, covered by two overlapping
/// seed communities per clique. Plenty of mergeable pairs, and the bridges
/// keep the edge-cut gate honest.
fn demo_input(cliques: usize, clique_size: usize) -> (Graph, Vec<Vec<u32>>) {
    let n = cliques * clique_size;
    let mut edges = Vec::new();

    for c in 0..cliques {
        let base = (c * clique_size) as u32;
        for i in 0..clique_size as u32 {
            for j in (i + 1)..clique_size as u32 {
                edges.push((base + i, base + j));
            }
        }
        if cliques > 1 {
            let next = (((c + 1) % cliques) * clique_size) as u32;
            edges.push((base + clique_size as u32 - 1, next));
        }
    }

    let span = ((2 * clique_size) / 3).max(2).min(clique_size) as u32;
    let mut communities = Vec::with_capacity(2 * cliques);
    for c in 0..cliques {
        let base = (c * clique_size) as u32;
        let end = base + clique_size as u32;
        communities.push((base..base + span).collect());
        communities.push((end - span..end).collect());
    }

    (Graph::from_edges(n, &edges), communities)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::from_env();
    let cliques = env_usize("CONFLUX_CLIQUES", DEFAULT_CLIQUES);
    let clique_size = env_usize("CONFLUX_CLIQUE_SIZE", DEFAULT_CLIQUE_SIZE);

    let (graph, communities) = demo_input(cliques, clique_size);
    info!(
        nodes = graph.node_count(),
        communities = communities.len(),
        workers = config.workers,
        run_ms = config.run_for_ms,
        "starting demo run"
    );

    let report = tokio::select! {
        report = run_local(Arc::new(graph), communities, config) => report?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted before the deadline");
            return Ok(());
        }
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn demo_input_covers_every_clique_twice() {
        let (graph, communities) = demo_input(4, 6);
        assert_eq!(graph.node_count(), 24);
        assert_eq!(communities.len(), 8);
        for pair in communities.chunks(2) {
            assert!(conflux_core::sets::common_elements(&pair[0], &pair[1]) > 0);
        }
    }
}
