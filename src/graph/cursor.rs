use super::RegularGraph;
use crate::feature::FeatureVector;

/// Borrowed view of one vertex.
#[derive(Clone, Copy)]
pub struct VertexView<'a> {
    graph: &'a RegularGraph,
    id: u32,
}

impl<'a> VertexView<'a> {
    pub(super) fn new(graph: &'a RegularGraph, id: u32) -> Self {
        Self { graph, id }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn label(&self) -> u32 {
        self.graph.label_of(self.id)
    }

    pub fn feature(&self) -> &'a FeatureVector {
        self.graph.feature(self.id)
    }

    /// Neighbors as `(label, weight)`.
    pub fn neighbors(&self) -> impl Iterator<Item = (u32, f32)> + 'a {
        let graph = self.graph;
        graph
            .neighbors(self.id)
            .map(move |(n, w)| (graph.label_of(n), w))
    }
}

/// Forward-only cursor over the vertices of a graph.
///
/// ```ignore
/// let mut cursor = index.vertex_cursor();
/// while cursor.move_next() {
///     cursor.for_each_neighbor(|label, weight| println!("{} -> {label} ({weight})", cursor.label()));
/// }
/// ```
pub struct VertexCursor<'a> {
    graph: &'a RegularGraph,
    next: u32,
    current: Option<u32>,
}

impl<'a> VertexCursor<'a> {
    pub(super) fn new(graph: &'a RegularGraph) -> Self {
        Self {
            graph,
            next: 0,
            current: None,
        }
    }

    /// Advance to the next vertex. Returns `false` once exhausted.
    pub fn move_next(&mut self) -> bool {
        if (self.next as usize) < self.graph.vertex_count() {
            self.current = Some(self.next);
            self.next += 1;
            true
        } else {
            self.current = None;
            false
        }
    }

    fn current(&self) -> u32 {
        self.current
            .unwrap_or_else(|| panic!("VertexCursor used before move_next() or after the end"))
    }

    /// # Panics
    ///
    /// Panics unless the last [`move_next`](Self::move_next) returned `true`.
    pub fn label(&self) -> u32 {
        self.graph.label_of(self.current())
    }

    pub fn feature(&self) -> &'a FeatureVector {
        self.graph.feature(self.current())
    }

    pub fn for_each_neighbor(&self, mut f: impl FnMut(u32, f32)) {
        let id = self.current();
        for (n, w) in self.graph.neighbors(id) {
            f(self.graph.label_of(n), w);
        }
    }
}

impl<'a> Iterator for VertexCursor<'a> {
    type Item = VertexView<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.move_next() {
            self.current.map(|id| VertexView::new(self.graph, id))
        } else {
            None
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.graph.vertex_count().saturating_sub(self.next as usize);
        (left, Some(left))
    }
}
