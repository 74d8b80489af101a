//! Edge improvement by gain-positive swap chains.
//!
//! Removing an edge `v1`–`v2` leaves both endpoints one edge short. The chain connects
//! `v2` to some nearby `v3` and drops one of `v3`'s edges `v3`–`v4`, so the hole moves
//! to `v4`. It ends successfully once `v1` and `v4` can be joined and the total weight
//! of the graph went down; otherwise every change is undone.

use tracing::trace;

use super::{nearest, GraphDesigner};
use crate::graph::RegularGraph;
use crate::search::GraphSearch;

/// One logged edge mutation.
#[derive(Clone, Copy, Debug)]
struct Change {
    a: u32,
    b: u32,
    weight: f32,
    removed: bool,
}

struct ChangeLog {
    changes: Vec<Change>,
}

impl ChangeLog {
    fn new() -> Self {
        Self {
            changes: Vec::new(),
        }
    }

    fn add(&mut self, graph: &mut RegularGraph, a: u32, b: u32, weight: f32) {
        graph.add_edge(a, b, weight);
        self.changes.push(Change {
            a,
            b,
            weight,
            removed: false,
        });
    }

    fn remove(&mut self, graph: &mut RegularGraph, a: u32, b: u32, weight: f32) {
        graph.remove_edge(a, b);
        self.changes.push(Change {
            a,
            b,
            weight,
            removed: true,
        });
    }

    fn undo(self, graph: &mut RegularGraph) {
        for change in self.changes.into_iter().rev() {
            if change.removed {
                graph.add_edge(change.a, change.b, change.weight);
            } else {
                graph.remove_edge(change.a, change.b);
            }
        }
    }
}

impl GraphDesigner {
    /// Run `tries` improvement attempts on the heaviest edge of random vertices.
    ///
    /// Returns the number of attempts that lowered the total edge weight.
    pub fn improve(&mut self, graph: &mut RegularGraph, tries: usize) -> usize {
        if graph.vertex_count() <= graph.edges_per_vertex() + 1 {
            return 0;
        }
        let mut improved = 0;
        for _ in 0..tries {
            let Some(v) = graph.random_vertex(&mut self.rng) else {
                break;
            };
            let Some(worst) = graph.edges(v).worst() else {
                continue;
            };
            if self.improve_edge(graph, v, worst.id) {
                improved += 1;
            }
        }
        trace!(tries, improved, "improvement pass finished");
        improved
    }

    /// Try to replace edge `v1`–`v2` by a chain of swaps with lower total weight.
    ///
    /// Leaves the graph unchanged and returns `false` if no such chain is found.
    pub fn improve_edge(&self, graph: &mut RegularGraph, v1: u32, v2: u32) -> bool {
        let Some(w12) = graph.edge_weight(v1, v2) else {
            return false;
        };
        let mut log = ChangeLog::new();
        log.remove(graph, v1, v2, w12);
        if self.improve_chain(graph, &mut log, v1, v2, v1, v1, w12, 0) {
            trace!(v1, v2, steps = log.changes.len(), "edge improved");
            true
        } else {
            log.undo(graph);
            false
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn improve_chain(
        &self,
        graph: &mut RegularGraph,
        log: &mut ChangeLog,
        mut v1: u32,
        v2: u32,
        v3: u32,
        v4: u32,
        mut gain: f32,
        steps: usize,
    ) -> bool {
        let epv = graph.edges_per_vertex();
        let k = self.config.improve_k_for(epv);
        let eps = self.config.improve_eps;

        // 1. connect v2 to a vertex near the v3/v4 side and drop one of its edges
        let (v3, mut v4) = {
            let feature = graph.feature(v2).clone();
            let results = nearest(graph, &self.search, &feature, k, eps, &[v3, v4]);
            let mut best_gain = gain;
            let mut best = None;
            for &(c3, d23) in &results {
                if c3 == v1 || c3 == v2 || graph.has_edge(v2, c3) {
                    continue;
                }
                for e in graph.edges(c3).iter() {
                    let g = (gain - d23) + e.weight;
                    if e.id != v2 && best_gain < g {
                        best_gain = g;
                        best = Some((c3, e.id, d23, e.weight));
                    }
                }
            }
            let Some((c3, c4, d23, d34)) = best else {
                return false;
            };
            gain -= d23;
            log.add(graph, v2, c3, d23);
            gain += d34;
            log.remove(graph, c3, c4, d34);
            (c3, c4)
        };

        // 2. close the chain between v1 and v4
        if v1 == v4 {
            // v1 is now two edges short: split a nearby edge into two edges to v1
            let feature = graph.feature(v4).clone();
            let results = nearest(graph, &self.search, &feature, k, eps, &[v2, v3]);
            let mut best_gain = 0.0f32;
            let mut best = None;
            for &(good, d_good) in &results {
                if good == v4 || graph.has_edge(v4, good) {
                    continue;
                }
                for e in graph.edges(good).iter() {
                    let s = e.id;
                    if s == v4 || graph.has_edge(v4, s) {
                        continue;
                    }
                    let d_new = graph.distance(v4, s);
                    let g = (gain + e.weight) - (d_good + d_new);
                    if best_gain < g {
                        best_gain = g;
                        best = Some((good, d_good, s, e.weight, d_new));
                    }
                }
            }
            if let Some((good, d_good, s, d_old, d_new)) = best {
                log.remove(graph, good, s, d_old);
                log.add(graph, v1, good, d_good);
                log.add(graph, v1, s, d_new);
                return true;
            }
        } else if !graph.has_edge(v1, v4) {
            let d14 = graph.distance(v1, v4);
            if gain - d14 > 0.0 {
                let search = GraphSearch::new(graph, &self.search);
                let reachable = search.has_path(&[v2, v3], v1, k, eps).is_some()
                    || search.has_path(&[v2, v3], v4, k, eps).is_some();
                if reachable {
                    log.add(graph, v1, v4, d14);
                    return true;
                }
            }
        }

        // 3. bounded chain length
        if steps >= self.config.max_path_length {
            return false;
        }

        // 4. alternate which end continues the chain
        if steps % 2 == 1 {
            std::mem::swap(&mut v1, &mut v4);
        }

        if gain < 0.0 {
            return false;
        }
        self.improve_chain(graph, log, v1, v4, v2, v3, gain, steps + 1)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::feature::FeatureVector;
    use crate::space::FloatSpace;

    fn total_weight(graph: &RegularGraph) -> f32 {
        (0..graph.vertex_count() as u32)
            .map(|v| graph.edges(v).total_weight())
            .sum()
    }

    fn degrees(graph: &RegularGraph) -> Vec<usize> {
        (0..graph.vertex_count() as u32)
            .map(|v| graph.degree(v))
            .collect()
    }

    #[test]
    fn improve_never_raises_weight_or_degree() {
        let mut graph = RegularGraph::new(Arc::new(FloatSpace::l2(3)), 6);
        let mut designer = GraphDesigner::default();
        let mut rng = StdRng::seed_from_u64(3);
        for label in 0..150u32 {
            let p: Vec<f32> = (0..3).map(|_| rng.gen::<f32>()).collect();
            designer
                .add(&mut graph, label, FeatureVector::from_f32s(&p))
                .unwrap();
        }
        let before_degrees = degrees(&graph);
        let before = total_weight(&graph);
        designer.improve(&mut graph, 100);
        assert!(total_weight(&graph) <= before + 1e-3);
        for (v, (&b, a)) in before_degrees.iter().zip(degrees(&graph)).enumerate() {
            assert!(a >= b.min(6), "vertex {v} lost an edge");
            assert!(a <= 6);
        }
    }

    #[test]
    fn failed_improvement_is_undone() {
        let mut graph = RegularGraph::new(Arc::new(FloatSpace::l2(1)), 2);
        let designer = GraphDesigner::default();
        for i in 0..3u32 {
            graph
                .add_vertex(i, FeatureVector::from_f32s(&[i as f32]))
                .unwrap();
        }
        graph.add_edge(0, 1, 1.0);
        graph.add_edge(1, 2, 1.0);
        graph.add_edge(0, 2, 4.0);
        assert!(!designer.improve_edge(&mut graph, 0, 2));
        assert_eq!(graph.edge_weight(0, 2), Some(4.0));
        assert_eq!(degrees(&graph), vec![2, 2, 2]);
    }
}
