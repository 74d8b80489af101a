//! Per-vertex weighted adjacency.

use smallvec::SmallVec;

/// Inline capacity of an edge list. Typical degrees (8..30) stay on the stack.
const INLINE_EDGES: usize = 32;

/// A weighted edge seen from one endpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub id: u32,
    pub weight: f32,
}

/// Neighbors of a vertex, in insertion order.
///
/// Lookups scan linearly: lists are short and scanning a contiguous array beats hashing.
#[derive(Clone, Debug, Default)]
pub struct EdgeList {
    entries: SmallVec<[Edge; INLINE_EDGES]>,
}

impl EdgeList {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: SmallVec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    #[inline]
    pub fn weight(&self, id: u32) -> Option<f32> {
        self.entries.iter().find(|e| e.id == id).map(|e| e.weight)
    }

    /// Insert or overwrite. Returns `true` if the edge is new.
    pub fn upsert(&mut self, id: u32, weight: f32) -> bool {
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == id) {
            e.weight = weight;
            return false;
        }
        self.entries.push(Edge { id, weight });
        true
    }

    /// Remove the edge to `id`, returning its weight.
    pub fn remove(&mut self, id: u32) -> Option<f32> {
        let pos = self.entries.iter().position(|e| e.id == id)?;
        Some(self.entries.remove(pos).weight)
    }

    /// Point the edge to `from` at `to` instead, keeping its weight.
    pub fn rename(&mut self, from: u32, to: u32) {
        if let Some(e) = self.entries.iter_mut().find(|e| e.id == from) {
            e.id = to;
        }
    }

    /// Heaviest edge, ties resolved to the lowest id.
    pub fn worst(&self) -> Option<Edge> {
        self.worst_where(|_| true)
    }

    /// Heaviest edge satisfying `pred`, ties resolved to the lowest id.
    pub fn worst_where(&self, mut pred: impl FnMut(&Edge) -> bool) -> Option<Edge> {
        self.entries
            .iter()
            .filter(|e| pred(e))
            .copied()
            .max_by(|a, b| a.weight.total_cmp(&b.weight).then(b.id.cmp(&a.id)))
    }

    /// Sum of all edge weights.
    pub fn total_weight(&self) -> f32 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = Edge> + '_ {
        self.entries.iter().copied()
    }

    /// Edges ordered by ascending neighbor id.
    pub fn sorted_by_id(&self) -> SmallVec<[Edge; INLINE_EDGES]> {
        let mut sorted = self.entries.clone();
        sorted.sort_unstable_by_key(|e| e.id);
        sorted
    }

    pub(crate) fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent() {
        let mut list = EdgeList::default();
        assert!(list.upsert(3, 1.0));
        assert!(!list.upsert(3, 2.0));
        assert_eq!(list.len(), 1);
        assert_eq!(list.weight(3), Some(2.0));
    }

    #[test]
    fn worst_prefers_heaviest_then_lowest_id() {
        let mut list = EdgeList::default();
        list.upsert(5, 1.0);
        list.upsert(2, 4.0);
        list.upsert(1, 4.0);
        assert_eq!(list.worst().map(|e| e.id), Some(1));
        assert_eq!(list.worst_where(|e| e.id != 1).map(|e| e.id), Some(2));
    }

    #[test]
    fn rename_and_remove() {
        let mut list = EdgeList::default();
        list.upsert(9, 0.5);
        list.rename(9, 4);
        assert!(list.contains(4));
        assert_eq!(list.remove(4), Some(0.5));
        assert!(list.is_empty());
    }
}
