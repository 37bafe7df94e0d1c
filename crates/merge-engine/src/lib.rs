//! Conflux: distributed, randomized refinement of overlapping graph
//! communities.
//!
//! A run starts from a pre-computed cover of a static undirected graph and
//! repeatedly merges pairs of communities that pass a chain of structural
//! gates, the last of which compares the second-smallest eigenvalue of the
//! normalized Laplacian before and after the merge. One coordinator owns
//! the authoritative community index; workers hold full replicas, search
//! for mergeable pairs at random, and replay the coordinator's accepted
//! merges in broadcast order.
//!
//! The index itself is a sorted id chain with a square-root checkpoint
//! accelerator, rebuilt lazily as the community count drifts.

pub mod cluster;
pub mod community;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod index;
pub mod message;
pub mod sets;
pub mod spectral;
pub mod transport;
pub mod worker;

pub use cluster::{prepare, run_local, ClusterReport};
pub use community::{CommunityData, CommunityTable};
pub use config::EngineConfig;
pub use context::{RunContext, RunReport, RunStats};
pub use coordinator::Coordinator;
pub use error::{EngineError, Result};
pub use evaluator::{
    Acceptance, CommunityRef, Evaluation, MergeEvaluator, MergeParams, Rejection, Verdict,
};
pub use graph::Graph;
pub use index::{Catalog, CommunityIndex};
pub use message::Message;
pub use spectral::{Eigensolver, JacobiSolver};
pub use worker::Worker;
