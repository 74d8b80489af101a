//! Weighted undirected regular graph over feature vectors.
//!
//! Vertices live in a dense arena: internal ids are exactly `0..vertex_count`.
//! Removing a vertex moves the highest-numbered vertex into the freed slot and
//! rewrites every edge that referenced it, so no id ever dangles.
//!
//! Callers address vertices by *label* (their own `u32` identifier); internal ids are
//! an implementation detail that changes on removal.
//!
//! The graph keeps edges symmetric and free of self loops. It does not enforce the
//! degree bound: [`GraphDesigner`](crate::designer::GraphDesigner) does.

mod cursor;
mod edges;

pub use cursor::{VertexCursor, VertexView};
pub use edges::{Edge, EdgeList};

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::Rng;

use crate::error::{DegError, Result};
use crate::feature::FeatureVector;
use crate::filter::VertexFilter;
use crate::space::FeatureSpace;

/// A stored vertex.
#[derive(Clone, Debug)]
pub struct VertexData {
    pub label: u32,
    pub feature: FeatureVector,
    pub edges: EdgeList,
}

/// A vertex taken out of the graph, with its former neighbors (already renumbered).
#[derive(Clone, Debug)]
pub struct RemovedVertex {
    pub label: u32,
    pub feature: FeatureVector,
    pub neighbors: Vec<Edge>,
}

#[derive(Clone)]
pub struct RegularGraph {
    space: Arc<dyn FeatureSpace>,
    edges_per_vertex: usize,
    vertices: Vec<VertexData>,
    label_to_id: HashMap<u32, u32>,
}

impl RegularGraph {
    pub fn new(space: Arc<dyn FeatureSpace>, edges_per_vertex: usize) -> Self {
        Self::with_capacity(space, edges_per_vertex, 0)
    }

    pub fn with_capacity(
        space: Arc<dyn FeatureSpace>,
        edges_per_vertex: usize,
        capacity: usize,
    ) -> Self {
        Self {
            space,
            edges_per_vertex,
            vertices: Vec::with_capacity(capacity),
            label_to_id: HashMap::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn space(&self) -> &Arc<dyn FeatureSpace> {
        &self.space
    }

    /// Target degree.
    #[inline]
    pub fn edges_per_vertex(&self) -> usize {
        self.edges_per_vertex
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[inline]
    pub fn has_vertex(&self, label: u32) -> bool {
        self.label_to_id.contains_key(&label)
    }

    #[inline]
    pub fn id_of(&self, label: u32) -> Option<u32> {
        self.label_to_id.get(&label).copied()
    }

    /// # Panics
    ///
    /// Panics if `id` is out of range.
    #[inline]
    pub fn label_of(&self, id: u32) -> u32 {
        self.vertices[id as usize].label
    }

    #[inline]
    pub fn feature(&self, id: u32) -> &FeatureVector {
        &self.vertices[id as usize].feature
    }

    pub fn feature_by_label(&self, label: u32) -> Option<&FeatureVector> {
        self.id_of(label).map(|id| self.feature(id))
    }

    #[inline]
    pub fn edges(&self, id: u32) -> &EdgeList {
        &self.vertices[id as usize].edges
    }

    /// Neighbors of `id` as `(neighbor id, weight)`.
    #[inline]
    pub fn neighbors(&self, id: u32) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.vertices[id as usize]
            .edges
            .iter()
            .map(|e| (e.id, e.weight))
    }

    #[inline]
    pub fn degree(&self, id: u32) -> usize {
        self.vertices[id as usize].edges.len()
    }

    /// Missing edges of `id` relative to the target degree.
    #[inline]
    pub fn deficit(&self, id: u32) -> usize {
        self.edges_per_vertex.saturating_sub(self.degree(id))
    }

    /// Labels of all vertices, in id order.
    pub fn labels(&self) -> impl Iterator<Item = u32> + '_ {
        self.vertices.iter().map(|v| v.label)
    }

    pub fn vertices(&self) -> &[VertexData] {
        &self.vertices
    }

    /// Distance between two stored vertices.
    #[inline]
    pub fn distance(&self, a: u32, b: u32) -> f32 {
        self.space.distance(self.feature(a), self.feature(b))
    }

    /// Distance from an arbitrary feature to a stored vertex.
    #[inline]
    pub fn distance_to(&self, query: &FeatureVector, id: u32) -> f32 {
        self.space.distance(query, self.feature(id))
    }

    /// Append a vertex without edges and return its id.
    pub fn add_vertex(&mut self, label: u32, feature: FeatureVector) -> Result<u32> {
        if self.has_vertex(label) {
            return Err(DegError::DuplicateLabel(label));
        }
        self.space.check(&feature)?;
        let id = u32::try_from(self.vertices.len()).map_err(|_| {
            DegError::CapacityExceeded("vertex count does not fit in u32".to_string())
        })?;
        self.vertices.push(VertexData {
            label,
            feature,
            edges: EdgeList::with_capacity(self.edges_per_vertex),
        });
        self.label_to_id.insert(label, id);
        Ok(id)
    }

    /// Remove the vertex with `label`. Returns `false` if absent.
    pub fn remove_vertex(&mut self, label: u32) -> bool {
        self.remove_vertex_by_label(label).is_some()
    }

    /// Remove the vertex with `label` and return it together with its former neighbors.
    ///
    /// Neighbor ids in the result are valid *after* the removal: if the former last
    /// vertex was one of them, it is reported under its new id.
    pub fn remove_vertex_by_label(&mut self, label: u32) -> Option<RemovedVertex> {
        let id = self.label_to_id.remove(&label)?;
        let edges = self.vertices[id as usize].edges.take();
        for e in edges.iter() {
            self.vertices[e.id as usize].edges.remove(id);
        }

        let last = (self.vertices.len() - 1) as u32;
        let removed = self.vertices.swap_remove(id as usize);
        if id != last {
            self.relabel_moved(last, id);
        }

        let neighbors = edges
            .iter()
            .map(|e| Edge {
                id: if e.id == last { id } else { e.id },
                weight: e.weight,
            })
            .collect();
        Some(RemovedVertex {
            label,
            feature: removed.feature,
            neighbors,
        })
    }

    /// The vertex formerly at `from` now sits at `to`; fix references to it.
    fn relabel_moved(&mut self, from: u32, to: u32) {
        let moved = &self.vertices[to as usize];
        let label = moved.label;
        let neighbor_ids: Vec<u32> = moved.edges.iter().map(|e| e.id).collect();
        for n in neighbor_ids {
            self.vertices[n as usize].edges.rename(from, to);
        }
        self.label_to_id.insert(label, to);
    }

    /// Add or reweight the undirected edge `a`–`b`.
    ///
    /// Returns `true` if the edge did not exist. Self loops are ignored.
    pub fn add_edge(&mut self, a: u32, b: u32, weight: f32) -> bool {
        if a == b {
            return false;
        }
        let added = self.vertices[a as usize].edges.upsert(b, weight);
        self.vertices[b as usize].edges.upsert(a, weight);
        added
    }

    /// Remove the undirected edge `a`–`b`. Returns `false` if it did not exist.
    pub fn remove_edge(&mut self, a: u32, b: u32) -> bool {
        let removed = self.vertices[a as usize].edges.remove(b).is_some();
        if removed {
            self.vertices[b as usize].edges.remove(a);
        }
        removed
    }

    #[inline]
    pub fn has_edge(&self, a: u32, b: u32) -> bool {
        self.vertices[a as usize].edges.contains(b)
    }

    #[inline]
    pub fn edge_weight(&self, a: u32, b: u32) -> Option<f32> {
        self.vertices[a as usize].edges.weight(b)
    }

    /// Uniformly random vertex id.
    pub fn random_vertex<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<u32> {
        if self.vertices.is_empty() {
            return None;
        }
        Some(rng.gen_range(0..self.vertices.len()) as u32)
    }

    /// Uniformly random id among the vertices whose label `filter` admits.
    pub fn random_vertex_filtered<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        filter: &VertexFilter,
    ) -> Option<u32> {
        if filter.is_empty() || self.vertices.is_empty() {
            return None;
        }
        // Filters usually come from this graph, so a few draws almost always hit.
        for _ in 0..8 {
            let label = filter.select(rng.gen_range(0..filter.len()))?;
            if let Some(id) = self.id_of(label) {
                return Some(id);
            }
        }
        let present: Vec<u32> = filter.iter().filter_map(|l| self.id_of(l)).collect();
        if present.is_empty() {
            return None;
        }
        Some(present[rng.gen_range(0..present.len())])
    }

    /// Lazy cursor over all vertices in id order.
    pub fn cursor(&self) -> VertexCursor<'_> {
        VertexCursor::new(self)
    }

    /// Iterate over all vertices in id order.
    pub fn iter(&self) -> impl Iterator<Item = VertexView<'_>> {
        (0..self.vertices.len() as u32).map(move |id| VertexView::new(self, id))
    }
}

impl fmt::Debug for RegularGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegularGraph")
            .field("space", &self.space)
            .field("edges_per_vertex", &self.edges_per_vertex)
            .field("vertex_count", &self.vertices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::FloatSpace;

    fn graph(epv: usize) -> RegularGraph {
        RegularGraph::new(Arc::new(FloatSpace::l2(1)), epv)
    }

    fn fv(x: f32) -> FeatureVector {
        FeatureVector::from_f32s(&[x])
    }

    #[test]
    fn add_vertex_rejects_duplicates() {
        let mut g = graph(2);
        assert_eq!(g.add_vertex(7, fv(0.0)).unwrap(), 0);
        assert!(matches!(
            g.add_vertex(7, fv(1.0)),
            Err(DegError::DuplicateLabel(7))
        ));
        assert_eq!(g.vertex_count(), 1);
    }

    #[test]
    fn add_vertex_rejects_wrong_size() {
        let mut g = graph(2);
        let err = g
            .add_vertex(1, FeatureVector::from_f32s(&[0.0, 1.0]))
            .unwrap_err();
        assert!(matches!(err, DegError::FeatureSizeMismatch { .. }));
        assert!(g.is_empty());
    }

    #[test]
    fn edges_are_symmetric_and_idempotent() {
        let mut g = graph(2);
        g.add_vertex(10, fv(0.0)).unwrap();
        g.add_vertex(11, fv(1.0)).unwrap();
        assert!(g.add_edge(0, 1, 1.0));
        assert!(!g.add_edge(1, 0, 1.0));
        assert_eq!(g.degree(0), 1);
        assert_eq!(g.edge_weight(1, 0), Some(1.0));
        assert!(!g.add_edge(0, 0, 0.0));
        assert!(g.remove_edge(1, 0));
        assert!(!g.remove_edge(0, 1));
        assert!(!g.has_edge(0, 1));
    }

    #[test]
    fn removal_moves_last_vertex_into_hole() {
        let mut g = graph(2);
        for (label, x) in [(100, 0.0), (101, 1.0), (102, 2.0), (103, 3.0)] {
            g.add_vertex(label, fv(x)).unwrap();
        }
        g.add_edge(0, 1, 1.0);
        g.add_edge(1, 3, 4.0);
        g.add_edge(2, 3, 1.0);
        g.add_edge(0, 3, 9.0);

        let removed = g.remove_vertex_by_label(101).unwrap();
        assert_eq!(g.vertex_count(), 3);
        // label 103 moved from id 3 to id 1
        assert_eq!(g.id_of(103), Some(1));
        assert_eq!(g.label_of(1), 103);
        assert!(g.has_edge(1, 2));
        assert!(g.has_edge(0, 1));
        assert_eq!(g.edge_weight(0, 1), Some(9.0));
        let mut former: Vec<u32> = removed.neighbors.iter().map(|e| e.id).collect();
        former.sort_unstable();
        assert_eq!(former, vec![0, 1]);
        for v in g.iter() {
            for (n, _) in g.neighbors(v.id()) {
                assert!((n as usize) < g.vertex_count());
                assert!(g.has_edge(n, v.id()));
            }
        }
    }

    #[test]
    fn removing_last_vertex_and_absent_label() {
        let mut g = graph(2);
        g.add_vertex(1, fv(0.0)).unwrap();
        g.add_vertex(2, fv(1.0)).unwrap();
        g.add_edge(0, 1, 1.0);
        assert!(g.remove_vertex(2));
        assert_eq!(g.degree(0), 0);
        assert!(!g.remove_vertex(2));
        assert!(g.remove_vertex(1));
        assert!(g.is_empty());
    }
}
