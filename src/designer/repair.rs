//! Deficit repair: restoring the target degree of vertices that lost edges.
//!
//! For a vertex `v` short of edges, in order of preference:
//!
//! 1. connect to a nearby vertex that is also short (*free slot*);
//! 2. if `v` misses at least two edges, split a nearby edge `c`–`w` into `v`–`c` and
//!    `v`–`w`;
//! 3. if another short vertex `x` is already adjacent to `v`, split an edge `b`–`d`
//!    near both into `v`–`b` and `x`–`d`;
//! 4. take a nearby `u` whose heaviest edge `u`–`w` is heavier than `u`–`v`, replace it
//!    by `u`–`v` and continue with `w`, which is now the short vertex. Chains stop after
//!    `max_path_length` hops.
//!
//! A vertex that cannot be repaired stays short; that is not an error.

use std::collections::VecDeque;

use tracing::trace;

use super::{nearest, GraphDesigner};
use crate::graph::RegularGraph;

/// Statistics from a repair pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepairStats {
    /// Edges added to vertices that had free slots
    pub edges_added: usize,
    /// Edges split to serve one or two short vertices
    pub splits: usize,
    /// Swap chain hops
    pub swaps: usize,
    /// Vertices left below the target degree
    pub unresolved: usize,
}

impl GraphDesigner {
    /// Restore the degree of `vertices` as far as local changes allow.
    pub(crate) fn repair(&self, graph: &mut RegularGraph, vertices: &[u32]) -> RepairStats {
        let mut stats = RepairStats::default();
        let epv = graph.edges_per_vertex();
        let k = self.config.extend_k_for(epv);
        let eps = self.config.extend_eps;

        let mut queue: VecDeque<(u32, usize)> = vertices.iter().map(|&v| (v, 0)).collect();
        while let Some((v, hops)) = queue.pop_front() {
            while graph.deficit(v) > 0 {
                let candidates = self.candidates_around(graph, v, k, eps);

                if let Some(&(c, dc)) = candidates
                    .iter()
                    .find(|&&(c, _)| c != v && graph.deficit(c) > 0 && !graph.has_edge(v, c))
                {
                    graph.add_edge(v, c, dc);
                    stats.edges_added += 1;
                    continue;
                }

                if graph.deficit(v) >= 2 {
                    if let Some(split) = best_split(graph, v, &candidates) {
                        graph.remove_edge(split.c, split.w);
                        graph.add_edge(v, split.c, split.dc);
                        graph.add_edge(v, split.w, split.dw);
                        stats.splits += 1;
                        continue;
                    }
                }

                if let Some(pair) = best_paired_split(graph, v, &candidates) {
                    graph.remove_edge(pair.b, pair.d);
                    graph.add_edge(v, pair.b, pair.vb);
                    graph.add_edge(pair.x, pair.d, pair.xd);
                    stats.splits += 1;
                    continue;
                }

                if hops >= self.config.max_path_length {
                    break;
                }
                let Some((u, du, w)) = best_swap(graph, v, &candidates) else {
                    break;
                };
                graph.remove_edge(u, w);
                graph.add_edge(v, u, du);
                stats.swaps += 1;
                queue.push_back((w, hops + 1));
            }
            if graph.deficit(v) > 0 {
                stats.unresolved += 1;
                trace!(vertex = v, deficit = graph.deficit(v), "vertex left short");
            }
        }
        stats
    }

    fn candidates_around(&self, graph: &RegularGraph, v: u32, k: usize, eps: f32) -> Vec<(u32, f32)> {
        let mut seeds = vec![v];
        if graph.degree(v) == 0 {
            // An isolated vertex cannot lead the search anywhere.
            seeds.push(if v == 0 { 1 } else { 0 });
        }
        let feature = graph.feature(v).clone();
        nearest(graph, &self.search, &feature, k, eps, &seeds)
    }
}

struct Split {
    c: u32,
    dc: f32,
    w: u32,
    dw: f32,
}

/// Edge `c`–`w` near `v` whose replacement by `v`–`c`, `v`–`w` adds the least weight.
fn best_split(graph: &RegularGraph, v: u32, candidates: &[(u32, f32)]) -> Option<Split> {
    let mut best: Option<(f32, Split)> = None;
    for &(c, dc) in candidates {
        if c == v || graph.has_edge(v, c) {
            continue;
        }
        for e in graph.edges(c).iter() {
            if e.id == v || graph.has_edge(v, e.id) {
                continue;
            }
            let dw = graph.distance(v, e.id);
            let cost = dc + dw - e.weight;
            if best.as_ref().map_or(true, |(b, _)| cost < *b) {
                best = Some((
                    cost,
                    Split {
                        c,
                        dc,
                        w: e.id,
                        dw,
                    },
                ));
            }
        }
    }
    best.map(|(_, s)| s)
}

struct PairedSplit {
    x: u32,
    b: u32,
    d: u32,
    vb: f32,
    xd: f32,
}

/// Serve `v` and another short vertex `x` at once by splitting an edge `b`–`d`.
fn best_paired_split(
    graph: &RegularGraph,
    v: u32,
    candidates: &[(u32, f32)],
) -> Option<PairedSplit> {
    let x = graph
        .neighbors(v)
        .map(|(n, _)| n)
        .chain(candidates.iter().map(|&(c, _)| c))
        .find(|&x| x != v && graph.deficit(x) > 0)?;

    let mut best: Option<(f32, PairedSplit)> = None;
    for &(b, vb) in candidates {
        if b == v || b == x || graph.has_edge(v, b) {
            continue;
        }
        for e in graph.edges(b).iter() {
            let d = e.id;
            if d == v || d == x || graph.has_edge(x, d) {
                continue;
            }
            let xd = graph.distance(x, d);
            let cost = vb + xd - e.weight;
            if best.as_ref().map_or(true, |(c, _)| cost < *c) {
                best = Some((cost, PairedSplit { x, b, d, vb, xd }));
            }
        }
    }
    best.map(|(_, p)| p)
}

/// Candidate `u` with the largest gain `weight(u, w) - dist(u, v)` over its heaviest edge.
fn best_swap(graph: &RegularGraph, v: u32, candidates: &[(u32, f32)]) -> Option<(u32, f32, u32)> {
    candidates
        .iter()
        .filter(|&&(u, _)| u != v && !graph.has_edge(v, u))
        .filter_map(|&(u, du)| {
            let worst = graph.edges(u).worst()?;
            (worst.weight > du).then_some((u, du, worst.id, worst.weight - du))
        })
        .max_by(|a, b| a.3.total_cmp(&b.3))
        .map(|(u, du, w, _)| (u, du, w))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::feature::FeatureVector;
    use crate::space::FloatSpace;

    /// A ring of `n` points on a line where each vertex links to its two closest
    /// neighbors on each side.
    fn ring(n: u32) -> RegularGraph {
        let mut g = RegularGraph::new(Arc::new(FloatSpace::l2(1)), 4);
        for i in 0..n {
            g.add_vertex(i, FeatureVector::from_f32s(&[i as f32])).unwrap();
        }
        for i in 0..n {
            for step in [1, 2] {
                let j = (i + step) % n;
                let w = g.distance(i, j);
                g.add_edge(i, j, w);
            }
        }
        g
    }

    #[test]
    fn split_fills_two_slots() {
        let mut g = ring(20);
        let designer = GraphDesigner::default();
        // isolate vertex 10 and give its former neighbors their degree back
        for n in [8, 9, 11, 12] {
            g.remove_edge(10, n);
        }
        g.add_edge(8, 11, 9.0);
        g.add_edge(9, 12, 9.0);
        let stats = designer.repair(&mut g, &[10]);
        assert_eq!(g.degree(10), 4);
        assert_eq!(stats.unresolved, 0);
        for v in 0..20 {
            assert!(g.degree(v) <= 4);
        }
    }

    #[test]
    fn adjacent_short_pair_is_joined_by_paired_split() {
        let mut g = ring(20);
        let designer = GraphDesigner::default();
        g.remove_edge(5, 3);
        g.remove_edge(6, 8);
        g.add_edge(3, 8, 25.0);
        // 5 and 6 are each one edge short and already adjacent
        let stats = designer.repair(&mut g, &[5, 6]);
        assert_eq!(g.degree(5), 4);
        assert_eq!(g.degree(6), 4);
        assert_eq!(stats.unresolved, 0);
        for v in 0..20 {
            assert_eq!(g.degree(v), 4);
        }
    }
}
