//! Best-first traversal over a [`RegularGraph`].
//!
//! # Algorithm
//!
//! Two queues drive the search:
//!
//! - a frontier `S` (min-heap by distance) of vertices still to expand,
//! - a result set `R` (sorted, capped at `k`) whose worst entry defines the radius `r`.
//!
//! The radius is infinite until `R` overflows, then only shrinks. A vertex is expanded
//! while its distance is within `r * (1 + eps)`; `eps > 0` lets the search walk through
//! slightly worse vertices to escape local minima.
//!
//! With several queries, each vertex is ranked by its smallest distance to any query.
//!
//! A highly selective filter makes graph walks wasteful (most neighbors are rejected),
//! so below [`SearchConfig::brute_force_rate`] the admitted labels are scanned directly.

mod results;
pub(crate) mod visited;

pub use results::QueryDistance;
use results::ResultSet;

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use serde::{Deserialize, Serialize};

use crate::feature::FeatureVector;
use crate::filter::VertexFilter;
use crate::graph::RegularGraph;
use visited::with_visited;

/// Search tuning shared by every query of an index.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Filters admitting less than this fraction of the graph are scanned exhaustively.
    pub brute_force_rate: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            brute_force_rate: 0.05,
        }
    }
}

/// Read-only search over a graph. Cheap to construct per query.
pub struct GraphSearch<'g> {
    graph: &'g RegularGraph,
    config: &'g SearchConfig,
}

impl<'g> GraphSearch<'g> {
    pub fn new(graph: &'g RegularGraph, config: &'g SearchConfig) -> Self {
        Self { graph, config }
    }

    /// The `k` vertices closest to any of `queries`, starting from `seeds` (internal ids).
    ///
    /// Seeds are eligible results. Vertices in `forbidden` start out checked: they are
    /// never expanded, never used as a seed and never returned. Results are ordered by
    /// ascending distance.
    pub fn search(
        &self,
        queries: &[&FeatureVector],
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
        seeds: &[u32],
        forbidden: &[u32],
    ) -> Vec<QueryDistance<'g>> {
        if let Some(f) = filter {
            if self.prefers_scan(f) {
                return self.scan(queries, k, f, &[], forbidden);
            }
        }
        self.traverse(queries, k, eps, filter, seeds, forbidden, true)
    }

    /// Diverse neighborhood of `seeds`: the `k` closest vertices to any seed, seeds excluded.
    ///
    /// Forbidden vertices are treated as in [`search`](Self::search), except that a
    /// forbidden seed still contributes its feature as a query.
    pub fn explore(
        &self,
        seeds: &[u32],
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
        forbidden: &[u32],
    ) -> Vec<QueryDistance<'g>> {
        let queries: Vec<&FeatureVector> = seeds.iter().map(|&s| self.graph.feature(s)).collect();
        if let Some(f) = filter {
            if self.prefers_scan(f) {
                return self.scan(&queries, k, f, seeds, forbidden);
            }
        }
        self.traverse(&queries, k, eps, filter, seeds, forbidden, false)
    }

    /// Whether `to` is reachable from `from` by a bounded search towards `to`.
    ///
    /// Returns the path `[from_x, .., to]` if found. The search keeps `k` results and
    /// gives up when the radius test stops it, so `None` means "not found cheaply",
    /// not "disconnected".
    pub fn has_path(&self, from: &[u32], to: u32, k: usize, eps: f32) -> Option<Vec<u32>> {
        if from.contains(&to) {
            return Some(vec![to]);
        }
        let k = k.max(1);
        let graph = self.graph;
        let target = graph.feature(to);
        let mut parent: HashMap<u32, u32> = HashMap::new();

        with_visited(graph.vertex_count(), |visited| {
            let mut frontier = BinaryHeap::new();
            let mut results = ResultSet::new(k);
            for &seed in from {
                if visited.insert(seed) {
                    let qd = self.measure(&[target], seed);
                    frontier.push(Reverse(qd));
                    if results.insert(qd) > k {
                        results.pop_worst();
                    }
                }
            }
            let mut radius = f32::INFINITY;

            while let Some(Reverse(current)) = frontier.pop() {
                if current.distance > radius * (1.0 + eps) {
                    break;
                }
                for (n, _) in graph.neighbors(current.id) {
                    if !visited.insert(n) {
                        continue;
                    }
                    parent.insert(n, current.id);
                    if n == to {
                        return Some(trace(&parent, to));
                    }
                    let qd = self.measure(&[target], n);
                    if qd.distance <= radius * (1.0 + eps) {
                        frontier.push(Reverse(qd));
                        if qd.distance < radius && results.insert(qd) > k {
                            results.pop_worst();
                            radius = results.worst_distance();
                        }
                    }
                }
            }
            None
        })
    }

    fn prefers_scan(&self, filter: &VertexFilter) -> bool {
        (filter.len() as f32) < self.config.brute_force_rate * self.graph.vertex_count() as f32
    }

    #[allow(clippy::too_many_arguments)]
    fn traverse(
        &self,
        queries: &[&FeatureVector],
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
        seeds: &[u32],
        forbidden: &[u32],
        seeds_in_result: bool,
    ) -> Vec<QueryDistance<'g>> {
        if k == 0 || queries.is_empty() || self.graph.is_empty() {
            return Vec::new();
        }
        let graph = self.graph;
        let admits = |label: u32| filter.map_or(true, |f| f.is_valid(label));

        with_visited(graph.vertex_count(), |visited| {
            let mut frontier = BinaryHeap::with_capacity(k * 2);
            let mut results = ResultSet::new(k);
            let mut radius = f32::INFINITY;

            for &id in forbidden {
                if (id as usize) < graph.vertex_count() {
                    visited.insert(id);
                }
            }
            for &seed in seeds {
                if !visited.insert(seed) {
                    continue;
                }
                let qd = self.measure(queries, seed);
                frontier.push(Reverse(qd));
                if seeds_in_result && admits(qd.label) && results.insert(qd) > k {
                    results.pop_worst();
                    radius = results.worst_distance();
                    note_radius(radius);
                }
            }

            while let Some(Reverse(current)) = frontier.pop() {
                if current.distance > radius * (1.0 + eps) {
                    break;
                }
                for (n, _) in graph.neighbors(current.id) {
                    if !visited.insert(n) || !admits(graph.label_of(n)) {
                        continue;
                    }
                    let qd = self.measure(queries, n);
                    if qd.distance > radius * (1.0 + eps) {
                        continue;
                    }
                    frontier.push(Reverse(qd));
                    if qd.distance < radius && results.insert(qd) > k {
                        results.pop_worst();
                        radius = results.worst_distance();
                        note_radius(radius);
                    }
                }
            }
            results.into_vec()
        })
    }

    /// Exhaustive search over the admitted labels, skipping `seeds` and `forbidden`.
    fn scan(
        &self,
        queries: &[&FeatureVector],
        k: usize,
        filter: &VertexFilter,
        seeds: &[u32],
        forbidden: &[u32],
    ) -> Vec<QueryDistance<'g>> {
        if k == 0 || queries.is_empty() {
            return Vec::new();
        }
        let mut results = ResultSet::new(k);
        for label in filter.iter() {
            let Some(id) = self.graph.id_of(label) else {
                continue;
            };
            if seeds.contains(&id) || forbidden.contains(&id) {
                continue;
            }
            if results.insert(self.measure(queries, id)) > k {
                results.pop_worst();
            }
        }
        results.into_vec()
    }

    /// Smallest distance from any query to vertex `id`.
    #[inline]
    fn measure(&self, queries: &[&FeatureVector], id: u32) -> QueryDistance<'g> {
        let feature = self.graph.feature(id);
        let space = self.graph.space();
        let mut best = (0, f32::INFINITY);
        for (i, q) in queries.iter().enumerate() {
            let d = space.distance(q, feature);
            if d < best.1 {
                best = (i, d);
            }
        }
        QueryDistance {
            id,
            label: self.graph.label_of(id),
            feature,
            distance: best.1,
            query_index: best.0,
        }
    }
}

#[cfg(test)]
thread_local! {
    static RADIUS_TRACE: std::cell::RefCell<Vec<f32>> = std::cell::RefCell::new(Vec::new());
}

/// Record a radius update of `traverse` on this thread (tests only).
#[inline(always)]
fn note_radius(_radius: f32) {
    #[cfg(test)]
    RADIUS_TRACE.with(|t| t.borrow_mut().push(_radius));
}

fn trace(parent: &HashMap<u32, u32>, to: u32) -> Vec<u32> {
    let mut path = vec![to];
    let mut at = to;
    while let Some(&p) = parent.get(&at) {
        path.push(p);
        at = p;
    }
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::space::FloatSpace;

    /// Points on a line, each linked to its two neighbors on either side.
    fn line(n: u32) -> RegularGraph {
        let mut g = RegularGraph::new(Arc::new(FloatSpace::l2(1)), 4);
        for i in 0..n {
            g.add_vertex(i, FeatureVector::from_f32s(&[i as f32])).unwrap();
        }
        for i in 0..n {
            for j in [i + 1, i + 2] {
                if j < n {
                    let w = g.distance(i, j);
                    g.add_edge(i, j, w);
                }
            }
        }
        g
    }

    #[test]
    fn finds_nearest_on_line() {
        let g = line(50);
        let cfg = SearchConfig::default();
        let q = FeatureVector::from_f32s(&[31.2]);
        let res = GraphSearch::new(&g, &cfg).search(&[&q], 3, 0.1, None, &[0], &[]);
        let labels: Vec<u32> = res.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![31, 32, 30]);
        assert!(res.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn filter_is_respected() {
        let g = line(40);
        let cfg = SearchConfig::default();
        let q = FeatureVector::from_f32s(&[20.0]);
        let evens = VertexFilter::from_labels((0..40).step_by(2), 40);
        let res = GraphSearch::new(&g, &cfg).search(&[&q], 4, 0.2, Some(&evens), &[0], &[]);
        assert!(!res.is_empty());
        assert!(res.iter().all(|r| r.label % 2 == 0));
        assert_eq!(res[0].label, 20);
    }

    #[test]
    fn selective_filter_scans() {
        let g = line(100);
        let cfg = SearchConfig::default();
        let q = FeatureVector::from_f32s(&[0.0]);
        let f = VertexFilter::from_labels([97, 60], 100);
        let res = GraphSearch::new(&g, &cfg).search(&[&q], 5, 0.0, Some(&f), &[0], &[]);
        let labels: Vec<u32> = res.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![60, 97]);
    }

    #[test]
    fn explore_excludes_seeds() {
        let g = line(30);
        let cfg = SearchConfig::default();
        let res = GraphSearch::new(&g, &cfg).explore(&[10], 4, 0.1, None, &[]);
        let mut labels: Vec<u32> = res.iter().map(|r| r.label).collect();
        assert!(!labels.contains(&10));
        labels.sort_unstable();
        assert_eq!(labels, vec![8, 9, 11, 12]);
    }

    #[test]
    fn multi_query_uses_min_distance() {
        let g = line(60);
        let cfg = SearchConfig::default();
        let a = FeatureVector::from_f32s(&[5.0]);
        let b = FeatureVector::from_f32s(&[50.0]);
        let res = GraphSearch::new(&g, &cfg).search(&[&a, &b], 2, 0.5, None, &[5, 50], &[]);
        let mut labels: Vec<u32> = res.iter().map(|r| r.label).collect();
        labels.sort_unstable();
        assert_eq!(labels, vec![5, 50]);
        assert_eq!(res.iter().find(|r| r.label == 50).map(|r| r.query_index), Some(1));
    }

    #[test]
    fn forbidden_nearest_is_skipped() {
        let g = line(50);
        let cfg = SearchConfig::default();
        let q = FeatureVector::from_f32s(&[31.2]);
        let res = GraphSearch::new(&g, &cfg).search(&[&q], 3, 0.1, None, &[0], &[31]);
        let labels: Vec<u32> = res.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![32, 30, 33]);
    }

    #[test]
    fn forbidden_seed_is_not_returned() {
        let g = line(50);
        let cfg = SearchConfig::default();
        let q = FeatureVector::from_f32s(&[10.0]);
        let res = GraphSearch::new(&g, &cfg).search(&[&q], 2, 0.1, None, &[10, 0], &[10]);
        let mut labels: Vec<u32> = res.iter().map(|r| r.label).collect();
        labels.sort_unstable();
        assert_eq!(labels, vec![9, 11]);
    }

    #[test]
    fn forbidden_applies_to_scan_and_explore() {
        let g = line(100);
        let cfg = SearchConfig::default();
        let q = FeatureVector::from_f32s(&[0.0]);
        let f = VertexFilter::from_labels([97, 60], 100);
        let res = GraphSearch::new(&g, &cfg).search(&[&q], 5, 0.0, Some(&f), &[0], &[60]);
        let labels: Vec<u32> = res.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![97]);

        let g = line(30);
        let res = GraphSearch::new(&g, &cfg).explore(&[10], 4, 0.1, None, &[11]);
        let labels: Vec<u32> = res.iter().map(|r| r.label).collect();
        assert_eq!(labels.len(), 4);
        assert!(!labels.contains(&10) && !labels.contains(&11));
        for expected in [8, 9, 12] {
            assert!(labels.contains(&expected), "{expected} missing from {labels:?}");
        }
    }

    #[test]
    fn radius_never_grows() {
        let g = line(120);
        let cfg = SearchConfig::default();
        let q = FeatureVector::from_f32s(&[83.4]);
        let seed_sets: [&[u32]; 2] = [&[0], &[0, 119, 60, 10, 100, 30, 90]];
        for eps in [0.0, 0.1, 0.5, 2.0] {
            for seeds in seed_sets {
                RADIUS_TRACE.with(|t| t.borrow_mut().clear());
                let res = GraphSearch::new(&g, &cfg).search(&[&q], 2, eps, None, seeds, &[]);
                let radii = RADIUS_TRACE.with(|t| t.take());
                assert!(!radii.is_empty(), "eps {eps}: radius never set");
                assert!(
                    radii.windows(2).all(|w| w[1] <= w[0]),
                    "eps {eps}, seeds {seeds:?}: {radii:?}"
                );
                assert_eq!(res[0].label, 83);
                assert_eq!(radii.last().copied(), res.last().map(|r| r.distance));
            }
        }
    }

    #[test]
    fn has_path_returns_trace() {
        let g = line(20);
        let cfg = SearchConfig::default();
        let path = GraphSearch::new(&g, &cfg).has_path(&[0], 15, 4, 0.1).unwrap();
        assert_eq!(path.first(), Some(&0));
        assert_eq!(path.last(), Some(&15));
        for w in path.windows(2) {
            assert!(g.has_edge(w[0], w[1]));
        }
    }
}
