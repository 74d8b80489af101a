//! Incremental construction and maintenance of a [`RegularGraph`].
//!
//! # Insertion
//!
//! 1. Search the graph for the `extend_k` closest vertices to the new feature, starting
//!    at an entry vertex picked by [`EntryPolicy`].
//! 2. Walk the candidates in ascending distance. A candidate `c` gives up one edge
//!    `(c, w)` and both endpoints connect to the new vertex instead (an *edge split*):
//!    `c` and `w` keep their degree and the new vertex gains two edges. The first pass
//!    only accepts candidates that are not closer to an already accepted neighbor than to
//!    the new vertex (relative neighborhood rule); a second pass drops that check.
//! 3. Whatever is still missing (odd degree, exhausted candidates) is handed to the
//!    deficit repair in [`repair`].
//!
//! Graphs with at most `edges_per_vertex + 1` vertices are kept complete.
//!
//! # Removal
//!
//! The former neighbors of a removed vertex are paired greedily by ascending distance,
//! then any vertex still short of edges goes through the same deficit repair.

mod improve;
mod repair;

pub use repair::RepairStats;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{DegError, Result};
use crate::feature::FeatureVector;
use crate::graph::RegularGraph;
use crate::search::{GraphSearch, SearchConfig};

/// How a candidate chooses the edge it gives up during an edge split.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtendSchema {
    /// Drop the candidate's heaviest edge.
    #[default]
    WorstEdge,
    /// Drop the edge whose replacement adds the least total weight:
    /// `dist(new, c) + dist(new, w) - weight(c, w)`.
    Distortion,
}

/// Where the insertion search starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryPolicy {
    /// Always vertex id 0.
    Anchor,
    /// A uniformly random vertex from the designer's seeded generator.
    #[default]
    Random,
    /// The vertex with the largest mean edge weight (a poorly placed one).
    WorstAverageEdge,
}

/// Designer hyperparameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesignerConfig {
    /// Candidates gathered per insertion. `0` means `2 * edges_per_vertex`.
    pub extend_k: usize,
    /// Search relaxation during insertion.
    pub extend_eps: f32,
    pub extend_schema: ExtendSchema,
    /// Candidates gathered per improvement step. `0` means `edges_per_vertex`.
    pub improve_k: usize,
    pub improve_eps: f32,
    /// Maximum length of a swap chain, in hops.
    pub max_path_length: usize,
    pub entry_policy: EntryPolicy,
    pub seed: u64,
}

impl Default for DesignerConfig {
    fn default() -> Self {
        Self {
            extend_k: 0,
            extend_eps: 0.2,
            extend_schema: ExtendSchema::WorstEdge,
            improve_k: 0,
            improve_eps: 0.001,
            max_path_length: 5,
            entry_policy: EntryPolicy::Random,
            seed: 7,
        }
    }
}

impl DesignerConfig {
    pub fn extend_k_for(&self, edges_per_vertex: usize) -> usize {
        match self.extend_k {
            0 => (2 * edges_per_vertex).max(1),
            k => k,
        }
    }

    pub fn improve_k_for(&self, edges_per_vertex: usize) -> usize {
        match self.improve_k {
            0 => edges_per_vertex.max(1),
            k => k,
        }
    }
}

/// Mutates a graph so it stays close to a relative neighborhood graph under the
/// degree bound. Owns the random state used for entry vertices and sampling.
#[derive(Clone, Debug)]
pub struct GraphDesigner {
    config: DesignerConfig,
    search: SearchConfig,
    rng: StdRng,
}

impl GraphDesigner {
    pub fn new(config: DesignerConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self {
            config,
            search: SearchConfig::default(),
            rng,
        }
    }

    pub fn config(&self) -> &DesignerConfig {
        &self.config
    }

    /// Restart the random sequence.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    /// Insert a vertex and wire it into the graph. Returns its id.
    ///
    /// Fails without touching the graph if the label exists or the feature has the
    /// wrong size.
    pub fn add(
        &mut self,
        graph: &mut RegularGraph,
        label: u32,
        feature: FeatureVector,
    ) -> Result<u32> {
        if graph.has_vertex(label) {
            return Err(DegError::DuplicateLabel(label));
        }
        graph.space().check(&feature)?;

        let epv = graph.edges_per_vertex();
        if graph.vertex_count() < epv + 1 {
            let id = graph.add_vertex(label, feature)?;
            for other in 0..id {
                let weight = graph.distance(id, other);
                graph.add_edge(id, other, weight);
            }
            trace!(label, id, "connected vertex to the complete graph");
            return Ok(id);
        }

        let entry = self.entry_vertex(graph);
        let candidates = nearest(
            graph,
            &self.search,
            &feature,
            self.config.extend_k_for(epv),
            self.config.extend_eps,
            &[entry],
        );
        let id = graph.add_vertex(label, feature)?;
        self.connect_new(graph, id, &candidates);

        if graph.deficit(id) > 0 {
            let stats = self.repair(graph, &[id]);
            trace!(label, id, ?stats, "repaired new vertex");
        }
        debug!(label, id, entry, degree = graph.degree(id), "inserted vertex");
        Ok(id)
    }

    /// Remove the vertex with `label` and reconnect its former neighbors.
    ///
    /// Returns `false` if the label is absent.
    pub fn remove(&mut self, graph: &mut RegularGraph, label: u32) -> bool {
        let Some(removed) = graph.remove_vertex_by_label(label) else {
            return false;
        };

        let epv = graph.edges_per_vertex();
        if graph.vertex_count() <= epv + 1 {
            complete(graph);
            trace!(label, "graph small enough to keep complete");
            return true;
        }

        let involved: Vec<u32> = removed.neighbors.iter().map(|e| e.id).collect();
        let mut pairs = Vec::new();
        for (i, &a) in involved.iter().enumerate() {
            for &b in &involved[i + 1..] {
                if !graph.has_edge(a, b) {
                    pairs.push((graph.distance(a, b), a, b));
                }
            }
        }
        pairs.sort_by(|x, y| x.0.total_cmp(&y.0));
        let mut paired = 0usize;
        for (weight, a, b) in pairs {
            if graph.deficit(a) > 0 && graph.deficit(b) > 0 && graph.add_edge(a, b, weight) {
                paired += 1;
            }
        }

        let pending: Vec<u32> = involved
            .iter()
            .copied()
            .filter(|&v| graph.deficit(v) > 0)
            .collect();
        let stats = self.repair(graph, &pending);
        debug!(
            label,
            former_neighbors = involved.len(),
            paired,
            ?stats,
            "removed vertex"
        );
        true
    }

    fn connect_new(&self, graph: &mut RegularGraph, id: u32, candidates: &[(u32, f32)]) {
        for check_rng in [true, false] {
            for &(c, dc) in candidates {
                if graph.deficit(id) == 0 {
                    return;
                }
                if graph.has_edge(id, c) {
                    continue;
                }
                if check_rng && !rng_conform(graph, id, c, dc) {
                    continue;
                }
                if graph.deficit(c) > 0 {
                    graph.add_edge(id, c, dc);
                    continue;
                }
                if graph.deficit(id) < 2 {
                    continue;
                }
                if let Some((w, dw)) = self.split_partner(graph, id, c, dc) {
                    graph.remove_edge(c, w);
                    graph.add_edge(id, c, dc);
                    graph.add_edge(id, w, dw);
                }
            }
        }
    }

    /// The neighbor `w` of `c` whose edge `c`–`w` is replaced by `id`–`c` and `id`–`w`.
    fn split_partner(&self, graph: &RegularGraph, id: u32, c: u32, dc: f32) -> Option<(u32, f32)> {
        let usable = |w: u32| w != id && !graph.has_edge(id, w);
        match self.config.extend_schema {
            ExtendSchema::WorstEdge => graph
                .edges(c)
                .worst_where(|e| usable(e.id))
                .map(|e| (e.id, graph.distance(id, e.id))),
            ExtendSchema::Distortion => graph
                .edges(c)
                .iter()
                .filter(|e| usable(e.id))
                .map(|e| {
                    let dw = graph.distance(id, e.id);
                    (e.id, dw, dc + dw - e.weight)
                })
                .min_by(|a, b| a.2.total_cmp(&b.2))
                .map(|(w, dw, _)| (w, dw)),
        }
    }

    pub(crate) fn entry_vertex(&mut self, graph: &RegularGraph) -> u32 {
        match self.config.entry_policy {
            EntryPolicy::Anchor => 0,
            EntryPolicy::Random => graph.random_vertex(&mut self.rng).unwrap_or(0),
            EntryPolicy::WorstAverageEdge => graph
                .vertices()
                .iter()
                .enumerate()
                .filter(|(_, v)| !v.edges.is_empty())
                .map(|(id, v)| (id as u32, v.edges.total_weight() / v.edges.len() as f32))
                .max_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(id, _)| id),
        }
    }
}

impl Default for GraphDesigner {
    fn default() -> Self {
        Self::new(DesignerConfig::default())
    }
}

/// Relative neighborhood rule: `c` is rejected if it is closer to one of the
/// vertices already accepted by `id` than to `id` itself.
fn rng_conform(graph: &RegularGraph, id: u32, c: u32, dc: f32) -> bool {
    graph.neighbors(id).all(|(a, _)| {
        let dca = graph
            .edge_weight(c, a)
            .unwrap_or_else(|| graph.distance(c, a));
        dca >= dc
    })
}

/// Connect every missing pair. Only valid while `vertex_count <= edges_per_vertex + 1`.
fn complete(graph: &mut RegularGraph) {
    let n = graph.vertex_count() as u32;
    for a in 0..n {
        for b in a + 1..n {
            if !graph.has_edge(a, b) {
                let weight = graph.distance(a, b);
                graph.add_edge(a, b, weight);
            }
        }
    }
}

/// Closest vertices to `query` as owned `(id, distance)` pairs, ascending.
pub(crate) fn nearest(
    graph: &RegularGraph,
    search: &SearchConfig,
    query: &FeatureVector,
    k: usize,
    eps: f32,
    seeds: &[u32],
) -> Vec<(u32, f32)> {
    GraphSearch::new(graph, search)
        .search(&[query], k, eps, None, seeds, &[])
        .into_iter()
        .map(|qd| (qd.id, qd.distance))
        .collect()
}
