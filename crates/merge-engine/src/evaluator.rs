//! Merge acceptance: the three-gate topological and spectral test.
//!
//! `check_pair` is pure: it never mutates its inputs and reports its outcome
//! as a value. Any spectral value it had to compute for an *input* community
//! is handed back to the caller for caching, since the evaluator itself
//! holds no state.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::graph::Graph;
use crate::sets;
use crate::spectral::{community_spectral, Eigensolver};

pub const DEFAULT_OVERLAP_THRESHOLD: f64 = 0.1;
pub const DEFAULT_EDGE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_EV_DELTA: f64 = 0.001;
/// Communities larger than this are never sampled for evaluation, bounding
/// the cost of a single eigensolve.
pub const DEFAULT_MAX_COMMUNITY_SIZE: usize = 400;

/// Acceptance thresholds for the three gates.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MergeParams {
    /// Overlap gate: required common fraction of the larger community.
    pub overlap_threshold: f64,
    /// Edge-cut gate: required ratio of disjoint edges to inner edges.
    pub edge_threshold: f64,
    /// Spectral gate: required eigenvalue improvement margin.
    pub ev_delta: f64,
    /// Sampling cap on community size.
    pub max_community_size: usize,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            overlap_threshold: DEFAULT_OVERLAP_THRESHOLD,
            edge_threshold: DEFAULT_EDGE_THRESHOLD,
            ev_delta: DEFAULT_EV_DELTA,
            max_community_size: DEFAULT_MAX_COMMUNITY_SIZE,
        }
    }
}

/// Borrowed view of a community record handed to the evaluator.
#[derive(Debug, Clone, Copy)]
pub struct CommunityRef<'a> {
    pub id: u32,
    pub nodes: &'a [u32],
    pub spectral: Option<f64>,
}

/// Outcome of `check_pair`, always a value.
///
/// `computed_input` travels outside the verdict: an eigenvalue solved for an
/// input community is worth caching on that record whether or not the pair
/// was accepted, and rejection by the spectral gate is the common case.
#[derive(Debug)]
pub struct Evaluation {
    pub verdict: Verdict,
    /// Eigenvalue freshly computed for an input community, for the caller
    /// to memoize on that record.
    pub computed_input: Option<(u32, f64)>,
}

#[derive(Debug)]
pub enum Verdict {
    Accepted(Acceptance),
    Rejected(Rejection),
}

#[derive(Debug)]
pub struct Acceptance {
    /// Union of the two input node sets, sorted.
    pub nodes: Vec<u32>,
    /// Spectral value of the merged community, when known. Set on the
    /// spectral-gain path; carried over from the non-subset input on the
    /// embedding path (and so possibly still unset).
    pub spectral: Option<f64>,
    /// True when one input was a subset of the other.
    pub embedding: bool,
}

/// Which gate rejected the pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Overlap,
    EdgeCut,
    SpectralGain,
    /// The eigensolver failed; the pair is conservatively rejected.
    Solver,
}

pub struct MergeEvaluator {
    params: MergeParams,
    solver: Box<dyn Eigensolver>,
}

impl MergeEvaluator {
    pub fn new(params: MergeParams, solver: Box<dyn Eigensolver>) -> Self {
        Self { params, solver }
    }

    pub fn params(&self) -> &MergeParams {
        &self.params
    }

    /// Decide whether merging `c1` and `c2` improves the clustering.
    ///
    /// Gate order: embedding shortcut, node overlap, edge cut between the
    /// disjoint parts, spectral gain of the union over the larger input.
    pub fn check_pair(
        &self,
        graph: &Graph,
        c1: CommunityRef<'_>,
        c2: CommunityRef<'_>,
    ) -> Evaluation {
        let common = sets::common_elements(c1.nodes, c2.nodes);

        // One community embedded in the other: always worth collapsing. The
        // union equals the non-subset side, so its cached value carries over.
        if common == c1.nodes.len() || common == c2.nodes.len() {
            let spectral = if common == c1.nodes.len() {
                c2.spectral
            } else {
                c1.spectral
            };
            return Evaluation {
                verdict: Verdict::Accepted(Acceptance {
                    nodes: sets::union(c1.nodes, c2.nodes),
                    spectral,
                    embedding: true,
                }),
                computed_input: None,
            };
        }

        let big = c1.nodes.len().max(c2.nodes.len());
        if common as f64 <= self.params.overlap_threshold * big as f64 {
            return Evaluation {
                verdict: Verdict::Rejected(Rejection::Overlap),
                computed_input: None,
            };
        }

        let a = sets::minus(c1.nodes, c2.nodes);
        let b = sets::minus(c2.nodes, c1.nodes);
        let larger_diff = if a.len() > b.len() { &a } else { &b };

        let disjoint_edges = graph.edges_between(&a, &b);
        // Scanning a set against itself counts every inner edge twice.
        let inner_edges = graph.edges_between(larger_diff, larger_diff) / 2;

        if disjoint_edges as f64 <= self.params.edge_threshold * inner_edges as f64 {
            return Evaluation {
                verdict: Verdict::Rejected(Rejection::EdgeCut),
                computed_input: None,
            };
        }

        let merged_nodes = sets::union(c1.nodes, c2.nodes);
        let merged_ev = match community_spectral(graph, &merged_nodes, self.solver.as_ref()) {
            Ok(ev) => ev,
            Err(err) => {
                debug!(%err, "eigensolver failed on merged candidate");
                return Evaluation {
                    verdict: Verdict::Rejected(Rejection::Solver),
                    computed_input: None,
                };
            }
        };

        let larger = if c1.nodes.len() > c2.nodes.len() { c1 } else { c2 };
        let (larger_ev, computed_input) = match larger.spectral {
            Some(ev) => (ev, None),
            None => match community_spectral(graph, larger.nodes, self.solver.as_ref()) {
                Ok(ev) => (ev, Some((larger.id, ev))),
                Err(err) => {
                    debug!(%err, "eigensolver failed on input community");
                    return Evaluation {
                        verdict: Verdict::Rejected(Rejection::Solver),
                        computed_input: None,
                    };
                }
            },
        };

        let verdict = if merged_ev - self.params.ev_delta > larger_ev {
            Verdict::Accepted(Acceptance {
                nodes: merged_nodes,
                spectral: Some(merged_ev),
                embedding: false,
            })
        } else {
            Verdict::Rejected(Rejection::SpectralGain)
        };

        Evaluation {
            verdict,
            computed_input,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::spectral::JacobiSolver;
    use ndarray::Array2;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn evaluator() -> MergeEvaluator {
        MergeEvaluator::new(MergeParams::default(), Box::new(JacobiSolver::default()))
    }

    fn cref(id: u32, nodes: &[u32]) -> CommunityRef<'_> {
        CommunityRef {
            id,
            nodes,
            spectral: None,
        }
    }

    #[test]
    fn path_graph_pair_fails_edge_cut() {
        // Path 0-1-2-3-4, communities {0,1,2} and {2,3,4}. The overlap gate
        // passes (1 > 0.1 × 3) but there are no edges between {0,1} and
        // {3,4} and no inner edges either, so 0 > 0.5 × 0 fails.
        let g = Graph::from_edges(5, &[(0, 1), (1, 2), (2, 3), (3, 4)]);
        let eval = evaluator().check_pair(&g, cref(0, &[0, 1, 2]), cref(1, &[2, 3, 4]));
        assert!(matches!(
            eval.verdict,
            Verdict::Rejected(Rejection::EdgeCut)
        ));
    }

    #[test]
    fn low_overlap_is_rejected_before_edges_are_counted() {
        let g = Graph::from_edges(12, &[(0, 1), (5, 6)]);
        // 1 common node out of 11 in the larger community: 1 ≤ 0.1 × 11.
        let c1: Vec<u32> = (0..11).collect();
        let eval = evaluator().check_pair(&g, cref(0, &c1), cref(1, &[10, 11]));
        assert!(matches!(eval.verdict, Verdict::Rejected(Rejection::Overlap)));
    }

    #[test]
    fn embedding_accepts_unconditionally_and_carries_spectral() {
        let g = Graph::from_edges(4, &[(0, 1), (1, 2), (2, 3)]);
        let c1 = cref(0, &[0, 1, 2]);
        let c2 = CommunityRef {
            id: 1,
            nodes: &[0, 1, 2, 3],
            spectral: Some(0.25),
        };

        let eval = evaluator().check_pair(&g, c1, c2);
        assert!(eval.computed_input.is_none());
        match eval.verdict {
            Verdict::Accepted(acc) => {
                assert!(acc.embedding);
                assert_eq!(acc.nodes, vec![0, 1, 2, 3]);
                assert_eq!(acc.spectral, Some(0.25));
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn spectral_gain_accepts_when_union_is_better_connected() {
        // {0,1,3,4} induces two disjoint edges (eigenvalue exactly 0);
        // merging in {1,2,3} connects everything through node 2.
        let g = Graph::from_edges(
            5,
            &[(0, 1), (3, 4), (0, 2), (2, 4), (1, 2), (2, 3)],
        );
        let c1 = cref(7, &[0, 1, 3, 4]);
        let c2 = cref(8, &[1, 2, 3]);

        let eval = evaluator().check_pair(&g, c1, c2);
        // The larger input's eigenvalue was computed fresh and is a genuine
        // zero, reported for memoization.
        let (id, ev) = eval.computed_input.expect("input value was computed");
        assert_eq!(id, 7);
        assert!(ev.abs() < 1e-9);
        match eval.verdict {
            Verdict::Accepted(acc) => {
                assert!(!acc.embedding);
                assert_eq!(acc.nodes, vec![0, 1, 2, 3, 4]);
                let merged_ev = acc.spectral.expect("computed on the spectral path");
                assert!(merged_ev > 0.001);
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn check_pair_is_symmetric() {
        let g = Graph::from_edges(
            5,
            &[(0, 1), (3, 4), (0, 2), (2, 4), (1, 2), (2, 3)],
        );
        let ev = evaluator();
        let ab = ev.check_pair(&g, cref(7, &[0, 1, 3, 4]), cref(8, &[1, 2, 3]));
        let ba = ev.check_pair(&g, cref(8, &[1, 2, 3]), cref(7, &[0, 1, 3, 4]));

        match (ab.verdict, ba.verdict) {
            (Verdict::Accepted(x), Verdict::Accepted(y)) => {
                assert_eq!(x.nodes, y.nodes);
                assert_eq!(x.spectral, y.spectral);
            }
            other => panic!("expected both accepted, got {other:?}"),
        }
    }

    #[test]
    fn memoized_input_value_is_not_recomputed() {
        let g = Graph::from_edges(
            5,
            &[(0, 1), (3, 4), (0, 2), (2, 4), (1, 2), (2, 3)],
        );
        let c1 = CommunityRef {
            id: 7,
            nodes: &[0, 1, 3, 4],
            spectral: Some(0.0),
        };
        let eval = evaluator().check_pair(&g, c1, cref(8, &[1, 2, 3]));
        assert!(eval.computed_input.is_none());
        assert!(matches!(eval.verdict, Verdict::Accepted(_)));
    }

    struct CountingSolver {
        inner: JacobiSolver,
        calls: Arc<AtomicUsize>,
    }

    impl Eigensolver for CountingSolver {
        fn kth_smallest(&self, matrix: &Array2<f64>, k: usize) -> crate::error::Result<f64> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.inner.kth_smallest(matrix, k)
        }
    }

    #[test]
    fn rejected_pairs_still_surface_the_input_eigenvalue() {
        // K4 with communities {0,1,2} and {1,2,3}: the union is K4 itself
        // (second eigenvalue 4/3) while the larger input induces a triangle
        // (second eigenvalue 1.5), so the spectral gate rejects.
        let g = Graph::from_edges(4, &[(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
        let calls = Arc::new(AtomicUsize::new(0));
        let ev = MergeEvaluator::new(
            MergeParams::default(),
            Box::new(CountingSolver {
                inner: JacobiSolver::default(),
                calls: Arc::clone(&calls),
            }),
        );

        let first = ev.check_pair(&g, cref(0, &[0, 1, 2]), cref(1, &[1, 2, 3]));
        assert!(matches!(
            first.verdict,
            Verdict::Rejected(Rejection::SpectralGain)
        ));
        // Two solves: merged candidate plus the uncached larger input. The
        // input value must come back even though the pair was rejected.
        assert_eq!(calls.load(Ordering::Relaxed), 2);
        let (id, value) = first.computed_input.expect("input value was computed");
        assert_eq!(id, 1);
        assert!((value - 1.5).abs() < 1e-8);

        // With the value cached on the record, re-evaluation solves only
        // for the merged candidate.
        let cached = CommunityRef {
            id: 1,
            nodes: &[1, 2, 3],
            spectral: Some(value),
        };
        let second = ev.check_pair(&g, cref(0, &[0, 1, 2]), cached);
        assert!(second.computed_input.is_none());
        assert_eq!(calls.load(Ordering::Relaxed), 3);
    }

    struct FailingSolver;

    impl Eigensolver for FailingSolver {
        fn kth_smallest(&self, _matrix: &Array2<f64>, _k: usize) -> crate::error::Result<f64> {
            Err(EngineError::Eigensolver("simulated failure".into()))
        }
    }

    #[test]
    fn solver_failure_rejects_conservatively() {
        let g = Graph::from_edges(
            5,
            &[(0, 1), (3, 4), (0, 2), (2, 4), (1, 2), (2, 3)],
        );
        let ev = MergeEvaluator::new(MergeParams::default(), Box::new(FailingSolver));
        let eval = ev.check_pair(&g, cref(7, &[0, 1, 3, 4]), cref(8, &[1, 2, 3]));
        assert!(matches!(eval.verdict, Verdict::Rejected(Rejection::Solver)));
    }
}
