//! Induced-subgraph spectral machinery.
//!
//! The merge evaluator scores a community by the second-smallest eigenvalue
//! of the normalized Laplacian of its induced subgraph. The eigensolver
//! itself is an external collaborator behind the [`Eigensolver`] trait; the
//! bundled implementation is a cyclic Jacobi sweep for dense symmetric
//! matrices, which is plenty for community-sized matrices (the worker caps
//! evaluated communities at a configured size).
//!
//! Disconnected induced subgraphs drive the second eigenvalue to ~0. That is
//! a known limitation of the acceptance rule and is deliberately not
//! special-cased here.

use ndarray::Array2;

use crate::error::{EngineError, Result};
use crate::graph::Graph;

/// Dense symmetric eigensolver interface.
pub trait Eigensolver: Send + Sync {
    /// The `k`-th smallest eigenvalue (1-based rank) of a symmetric matrix.
    fn kth_smallest(&self, matrix: &Array2<f64>, k: usize) -> Result<f64>;
}

/// Cyclic Jacobi eigensolver for dense symmetric matrices.
#[derive(Debug, Clone)]
pub struct JacobiSolver {
    max_sweeps: usize,
    tolerance: f64,
}

impl Default for JacobiSolver {
    fn default() -> Self {
        Self {
            max_sweeps: 64,
            tolerance: 1e-10,
        }
    }
}

impl JacobiSolver {
    pub fn new(max_sweeps: usize, tolerance: f64) -> Self {
        Self {
            max_sweeps,
            tolerance,
        }
    }

    fn off_diagonal_norm(a: &Array2<f64>) -> f64 {
        let n = a.nrows();
        let mut sum = 0.0;
        for i in 0..n {
            for j in (i + 1)..n {
                sum += a[[i, j]] * a[[i, j]];
            }
        }
        sum.sqrt()
    }

    /// All eigenvalues, unsorted. Rotates the full matrix; the input is
    /// expected to be symmetric.
    fn eigenvalues(&self, matrix: &Array2<f64>) -> Result<Vec<f64>> {
        let n = matrix.nrows();
        if n != matrix.ncols() {
            return Err(EngineError::Eigensolver(format!(
                "matrix is {}x{}, expected square",
                n,
                matrix.ncols()
            )));
        }

        let mut a = matrix.clone();

        for _ in 0..self.max_sweeps {
            if Self::off_diagonal_norm(&a) <= self.tolerance {
                return Ok((0..n).map(|i| a[[i, i]]).collect());
            }

            for p in 0..n.saturating_sub(1) {
                for q in (p + 1)..n {
                    let apq = a[[p, q]];
                    if apq.abs() <= f64::EPSILON {
                        continue;
                    }

                    let theta = (a[[q, q]] - a[[p, p]]) / (2.0 * apq);
                    let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                    let c = 1.0 / (t * t + 1.0).sqrt();
                    let s = t * c;

                    for i in 0..n {
                        let aip = a[[i, p]];
                        let aiq = a[[i, q]];
                        a[[i, p]] = c * aip - s * aiq;
                        a[[i, q]] = s * aip + c * aiq;
                    }
                    for i in 0..n {
                        let api = a[[p, i]];
                        let aqi = a[[q, i]];
                        a[[p, i]] = c * api - s * aqi;
                        a[[q, i]] = s * api + c * aqi;
                    }
                }
            }
        }

        if Self::off_diagonal_norm(&a) <= self.tolerance {
            Ok((0..n).map(|i| a[[i, i]]).collect())
        } else {
            Err(EngineError::Eigensolver(format!(
                "no convergence after {} sweeps on order-{n} matrix",
                self.max_sweeps
            )))
        }
    }
}

impl Eigensolver for JacobiSolver {
    fn kth_smallest(&self, matrix: &Array2<f64>, k: usize) -> Result<f64> {
        if matrix.nrows() < k {
            return Err(EngineError::Eigensolver(format!(
                "order-{} matrix has no rank-{k} eigenvalue",
                matrix.nrows()
            )));
        }
        let mut values = self.eigenvalues(matrix)?;
        values.sort_by(|a, b| a.total_cmp(b));
        Ok(values[k - 1])
    }
}

/// Adjacency matrix of the subgraph induced by a sorted node set.
///
/// Intersects each member's (sorted) graph neighbor list against the set, so
/// the cost is O(|S| × averageDegree).
pub fn induced_adjacency(graph: &Graph, nodes: &[u32]) -> Array2<f64> {
    let n = nodes.len();
    let mut adj = Array2::zeros((n, n));

    for (i, &u) in nodes.iter().enumerate() {
        let neighbors = graph.neighbors(u);
        let mut k = 0;
        let mut j = 0;
        while k < n && j < neighbors.len() {
            if nodes[k] < neighbors[j] {
                k += 1;
            } else if neighbors[j] < nodes[k] {
                j += 1;
            } else {
                adj[[i, k]] = 1.0;
                k += 1;
                j += 1;
            }
        }
    }

    adj
}

/// Normalized Laplacian of an adjacency matrix: diagonal 1 where the induced
/// degree is nonzero, off-diagonal −1/√(deg(i)·deg(j)) where an edge exists.
pub fn normalized_laplacian(adj: &Array2<f64>) -> Array2<f64> {
    let n = adj.nrows();
    let degrees: Vec<f64> = (0..n).map(|i| adj.row(i).sum()).collect();

    let mut laplacian = Array2::zeros((n, n));
    for i in 0..n {
        if degrees[i] != 0.0 {
            laplacian[[i, i]] = 1.0;
        }
        for j in 0..i {
            if adj[[i, j]] != 0.0 {
                let value = -1.0 / (degrees[i] * degrees[j]).sqrt();
                laplacian[[i, j]] = value;
                laplacian[[j, i]] = value;
            }
        }
    }

    laplacian
}

/// Second-smallest normalized-Laplacian eigenvalue of the subgraph induced
/// by `nodes`. Rank 1 is ~0 for a connected induced subgraph and discarded.
pub fn community_spectral(graph: &Graph, nodes: &[u32], solver: &dyn Eigensolver) -> Result<f64> {
    let adj = induced_adjacency(graph, nodes);
    let laplacian = normalized_laplacian(&adj);
    solver.kth_smallest(&laplacian, 2)
}
