//! Graph quality measures and structural checks.
//!
//! None of these run on the hot path. [`avg_neighbor_rank`] and [`brute_force_knn`]
//! scan every vertex and are meant for tests and offline evaluation.

use std::collections::HashSet;

use crate::feature::FeatureVector;
use crate::graph::RegularGraph;

/// Relative tolerance when comparing stored edge weights to recomputed distances.
const WEIGHT_TOLERANCE: f32 = 1e-4;

/// A broken structural property, reported by [`validate_graph`].
#[derive(Clone, Debug, PartialEq)]
pub enum GraphIssue {
    OverDegree { label: u32, degree: usize },
    SelfLoop { label: u32 },
    /// `from` lists `to` but not the other way round.
    Asymmetric { from: u32, to: u32 },
    /// The two directions of an edge carry different weights.
    WeightMismatch { a: u32, b: u32 },
    /// The stored weight is not the distance between the endpoints.
    StaleWeight { a: u32, b: u32, stored: f32, actual: f32 },
}

#[derive(Clone, Debug, PartialEq)]
pub struct GraphStats {
    pub vertices: usize,
    /// Undirected edge count.
    pub edges: usize,
    /// Vertices with all edge slots in use.
    pub full_vertices: usize,
    pub avg_degree: f32,
    pub avg_edge_weight: f32,
}

/// Check degree bound, symmetry and weights of every edge.
///
/// Labels are reported instead of internal ids.
pub fn validate_graph(graph: &RegularGraph) -> Vec<GraphIssue> {
    let mut issues = Vec::new();
    let epv = graph.edges_per_vertex();
    for id in 0..graph.vertex_count() as u32 {
        let label = graph.label_of(id);
        let degree = graph.degree(id);
        if degree > epv {
            issues.push(GraphIssue::OverDegree { label, degree });
        }
        for (n, w) in graph.neighbors(id) {
            if n == id {
                issues.push(GraphIssue::SelfLoop { label });
                continue;
            }
            let other = graph.label_of(n);
            match graph.edge_weight(n, id) {
                None => issues.push(GraphIssue::Asymmetric { from: label, to: other }),
                // each undirected edge is checked once, from its lower id
                Some(back) if id < n => {
                    if back != w {
                        issues.push(GraphIssue::WeightMismatch { a: label, b: other });
                    }
                    let actual = graph.distance(id, n);
                    if (actual - w).abs() > WEIGHT_TOLERANCE * actual.abs().max(1.0) {
                        issues.push(GraphIssue::StaleWeight {
                            a: label,
                            b: other,
                            stored: w,
                            actual,
                        });
                    }
                }
                Some(_) => {}
            }
        }
    }
    issues
}

pub fn graph_stats(graph: &RegularGraph) -> GraphStats {
    let vertices = graph.vertex_count();
    let epv = graph.edges_per_vertex();
    let mut directed = 0usize;
    let mut full = 0usize;
    let mut weight = 0f64;
    for id in 0..vertices as u32 {
        let degree = graph.degree(id);
        directed += degree;
        if degree == epv {
            full += 1;
        }
        weight += f64::from(graph.edges(id).total_weight());
    }
    GraphStats {
        vertices,
        edges: directed / 2,
        full_vertices: full,
        avg_degree: if vertices > 0 {
            directed as f32 / vertices as f32
        } else {
            0.0
        },
        avg_edge_weight: if directed > 0 {
            (weight / directed as f64) as f32
        } else {
            0.0
        },
    }
}

/// Mean weight over all edges, 0 for an edgeless graph.
pub fn avg_edge_weight(graph: &RegularGraph) -> f32 {
    graph_stats(graph).avg_edge_weight
}

/// Mean position of each neighbor in its vertex's exact nearest-neighbor ranking,
/// starting at 1. A graph linking every vertex to its true nearest neighbors scores
/// `(edges_per_vertex + 1) / 2`.
pub fn avg_neighbor_rank(graph: &RegularGraph) -> f32 {
    let n = graph.vertex_count() as u32;
    let mut total = 0f64;
    let mut count = 0usize;
    let mut order: Vec<(f32, u32)> = Vec::with_capacity(n as usize);
    for id in 0..n {
        if graph.degree(id) == 0 {
            continue;
        }
        order.clear();
        order.extend((0..n).filter(|&o| o != id).map(|o| (graph.distance(id, o), o)));
        order.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        for (neighbor, _) in graph.neighbors(id) {
            if let Some(pos) = order.iter().position(|&(_, o)| o == neighbor) {
                total += (pos + 1) as f64;
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        (total / count as f64) as f32
    }
}

/// Vertices reachable from `start` (an internal id) and those that are not.
pub fn connectivity(graph: &RegularGraph, start: u32) -> (usize, usize) {
    let total = graph.vertex_count();
    if (start as usize) >= total {
        return (0, total);
    }
    let mut visited = vec![false; total];
    let mut stack = vec![start];
    visited[start as usize] = true;
    let mut reachable = 0;
    while let Some(id) = stack.pop() {
        reachable += 1;
        for (n, _) in graph.neighbors(id) {
            if !visited[n as usize] {
                visited[n as usize] = true;
                stack.push(n);
            }
        }
    }
    (reachable, total - reachable)
}

/// Whether every vertex can reach every other one. Empty graphs are connected.
pub fn is_connected(graph: &RegularGraph) -> bool {
    graph.is_empty() || connectivity(graph, 0).1 == 0
}

/// Exact `k` nearest labels to `query`, ascending by distance.
pub fn brute_force_knn(graph: &RegularGraph, query: &FeatureVector, k: usize) -> Vec<u32> {
    let mut all: Vec<(f32, u32)> = (0..graph.vertex_count() as u32)
        .map(|id| (graph.distance_to(query, id), graph.label_of(id)))
        .collect();
    all.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    all.into_iter().take(k).map(|(_, label)| label).collect()
}

/// Fraction of the first `k` ground truth labels found among the first `k` retrieved.
pub fn recall_at_k(ground_truth: &[u32], retrieved: &[u32], k: usize) -> f32 {
    if k == 0 || ground_truth.is_empty() {
        return 0.0;
    }
    let truth: HashSet<u32> = ground_truth.iter().take(k).copied().collect();
    let hits = retrieved
        .iter()
        .take(k)
        .collect::<HashSet<_>>()
        .into_iter()
        .filter(|&&l| truth.contains(&l))
        .count();
    hits as f32 / truth.len() as f32
}
