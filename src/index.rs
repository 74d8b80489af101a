//! Single-layer index: a regular graph with its designer and search settings.

use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use crate::designer::{DesignerConfig, GraphDesigner};
use crate::error::{DegError, Result};
use crate::feature::{ComponentType, FeatureVector};
use crate::filter::VertexFilter;
use crate::graph::{RegularGraph, VertexCursor};
use crate::persistence::{self, SpaceSource};
use crate::search::{GraphSearch, QueryDistance, SearchConfig};
use crate::space::FeatureSpace;

/// Dynamic exploration graph over one feature space.
///
/// Mutation takes `&mut self`; search and exploration take `&self` and may run
/// concurrently from several threads.
#[derive(Clone, Debug)]
pub struct DEGIndex {
    graph: RegularGraph,
    designer: GraphDesigner,
    search: SearchConfig,
}

impl DEGIndex {
    /// Empty index with default designer and search settings.
    pub fn new(space: Arc<dyn FeatureSpace>, edges_per_vertex: usize) -> Result<Self> {
        Self::with_capacity(space, edges_per_vertex, 0)
    }

    pub fn with_capacity(
        space: Arc<dyn FeatureSpace>,
        edges_per_vertex: usize,
        expected_vertices: usize,
    ) -> Result<Self> {
        Self::with_config(
            space,
            edges_per_vertex,
            expected_vertices,
            DesignerConfig::default(),
            SearchConfig::default(),
        )
    }

    pub fn with_config(
        space: Arc<dyn FeatureSpace>,
        edges_per_vertex: usize,
        expected_vertices: usize,
        designer: DesignerConfig,
        search: SearchConfig,
    ) -> Result<Self> {
        validate(space.as_ref(), edges_per_vertex)?;
        Ok(Self {
            graph: RegularGraph::with_capacity(space, edges_per_vertex, expected_vertices),
            designer: GraphDesigner::new(designer),
            search,
        })
    }

    pub(crate) fn from_graph(graph: RegularGraph, designer: DesignerConfig) -> Self {
        Self {
            graph,
            designer: GraphDesigner::new(designer),
            search: SearchConfig::default(),
        }
    }

    pub fn space(&self) -> &Arc<dyn FeatureSpace> {
        self.graph.space()
    }

    pub fn edges_per_vertex(&self) -> usize {
        self.graph.edges_per_vertex()
    }

    pub fn len(&self) -> usize {
        self.graph.vertex_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.is_empty()
    }

    pub fn has_label(&self, label: u32) -> bool {
        self.graph.has_vertex(label)
    }

    pub fn graph(&self) -> &RegularGraph {
        &self.graph
    }

    pub fn designer_mut(&mut self) -> &mut GraphDesigner {
        &mut self.designer
    }

    pub fn search_config(&self) -> &SearchConfig {
        &self.search
    }

    pub fn set_search_config(&mut self, search: SearchConfig) {
        self.search = search;
    }

    /// Insert a vertex.
    ///
    /// # Errors
    ///
    /// [`DegError::DuplicateLabel`] or [`DegError::FeatureSizeMismatch`]; the index is
    /// unchanged in both cases.
    pub fn add(&mut self, label: u32, feature: FeatureVector) -> Result<()> {
        self.designer.add(&mut self.graph, label, feature)?;
        Ok(())
    }

    /// Remove a vertex and repair its neighborhood. Returns `false` if absent.
    pub fn remove(&mut self, label: u32) -> bool {
        self.designer.remove(&mut self.graph, label)
    }

    /// Run `tries` edge improvement attempts. Returns how many succeeded.
    pub fn improve(&mut self, tries: usize) -> usize {
        self.designer.improve(&mut self.graph, tries)
    }

    /// Try to replace the edge between two labels by a cheaper swap chain.
    ///
    /// Returns `Ok(false)` if the labels are not connected or no chain was found.
    ///
    /// # Errors
    ///
    /// [`DegError::UnknownLabel`] if either label is absent.
    pub fn improve_edge(&mut self, label1: u32, label2: u32) -> Result<bool> {
        let id_of = |label| self.graph.id_of(label).ok_or(DegError::UnknownLabel(label));
        let (v1, v2) = (id_of(label1)?, id_of(label2)?);
        Ok(self.designer.improve_edge(&mut self.graph, v1, v2))
    }

    /// The `k` vertices closest to any of `queries`.
    ///
    /// The search starts at the `seed_labels` present in the index, or at the first
    /// vertex if none is. Results are ordered by ascending distance and only contain
    /// labels admitted by `filter`.
    pub fn search(
        &self,
        queries: &[FeatureVector],
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
        seed_labels: &[u32],
    ) -> Result<Vec<QueryDistance<'_>>> {
        self.search_excluding(queries, k, eps, filter, seed_labels, &[])
    }

    /// [`search`](Self::search) that never visits or returns `forbidden_labels`.
    ///
    /// Forbidden seeds are dropped; if no seed remains the search starts at the first
    /// vertex that is not forbidden.
    pub fn search_excluding(
        &self,
        queries: &[FeatureVector],
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
        seed_labels: &[u32],
        forbidden_labels: &[u32],
    ) -> Result<Vec<QueryDistance<'_>>> {
        for q in queries {
            self.graph.space().check(q)?;
        }
        let forbidden = self.seed_ids(forbidden_labels);
        let mut seeds = self.seed_ids(seed_labels);
        seeds.retain(|id| !forbidden.contains(id));
        if seeds.is_empty() {
            let first = (0..self.graph.vertex_count() as u32).find(|id| !forbidden.contains(id));
            match first {
                Some(id) => seeds.push(id),
                None => return Ok(Vec::new()),
            }
        }
        let queries: Vec<&FeatureVector> = queries.iter().collect();
        Ok(GraphSearch::new(&self.graph, &self.search)
            .search(&queries, k, eps, filter, &seeds, &forbidden))
    }

    /// Convenience form of [`search`](Self::search) for one query returning labels.
    pub fn search_labels(&self, query: &FeatureVector, k: usize, eps: f32) -> Result<Vec<u32>> {
        Ok(self
            .search(std::slice::from_ref(query), k, eps, None, &[])?
            .into_iter()
            .map(|r| r.label)
            .collect())
    }

    /// The `k` vertices around `seed_labels`, excluding the seeds.
    ///
    /// # Errors
    ///
    /// [`DegError::SeedNotFound`] if none of the seeds is present.
    pub fn explore(
        &self,
        seed_labels: &[u32],
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
    ) -> Result<Vec<QueryDistance<'_>>> {
        self.explore_excluding(seed_labels, k, eps, filter, &[])
    }

    /// [`explore`](Self::explore) that never visits or returns `forbidden_labels`.
    pub fn explore_excluding(
        &self,
        seed_labels: &[u32],
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
        forbidden_labels: &[u32],
    ) -> Result<Vec<QueryDistance<'_>>> {
        let seeds = self.seed_ids(seed_labels);
        if seeds.is_empty() {
            return Err(DegError::SeedNotFound(seed_labels.to_vec()));
        }
        let forbidden = self.seed_ids(forbidden_labels);
        Ok(GraphSearch::new(&self.graph, &self.search)
            .explore(&seeds, k, eps, filter, &forbidden))
    }

    fn seed_ids(&self, seed_labels: &[u32]) -> Vec<u32> {
        let mut ids: Vec<u32> = seed_labels
            .iter()
            .filter_map(|&l| self.graph.id_of(l))
            .collect();
        ids.dedup();
        ids
    }

    /// Filter admitting every label currently in the index.
    pub fn label_filter(&self) -> VertexFilter {
        VertexFilter::from_labels(self.graph.labels(), self.graph.vertex_count())
    }

    pub fn vertex_cursor(&self) -> VertexCursor<'_> {
        self.graph.cursor()
    }

    pub fn feature(&self, label: u32) -> Option<&FeatureVector> {
        self.graph.feature_by_label(label)
    }

    /// Call `f(neighbor_label, weight)` for each neighbor. Returns `false` if absent.
    pub fn for_each_neighbor(&self, label: u32, mut f: impl FnMut(u32, f32)) -> bool {
        let Some(id) = self.graph.id_of(label) else {
            return false;
        };
        for (n, w) in self.graph.neighbors(id) {
            f(self.graph.label_of(n), w);
        }
        true
    }

    /// A random label, restricted to `filter` if given.
    pub fn random_label<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        filter: Option<&VertexFilter>,
    ) -> Option<u32> {
        let id = match filter {
            Some(filter) => self.graph.random_vertex_filtered(rng, filter),
            None => self.graph.random_vertex(rng),
        };
        id.map(|id| self.graph.label_of(id))
    }

    /// Persist the graph. See [`persistence::format`] for the layout.
    pub fn write_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        persistence::write_graph(&self.graph, path.as_ref())
    }

    /// Load a graph, taking the feature type from the `<name>.<type>.deg` file name.
    pub fn read_from_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::read_with(path.as_ref(), SpaceSource::FileName)
    }

    /// Load a graph of a known component type.
    pub fn read_from_file_as(path: impl AsRef<Path>, component_type: ComponentType) -> Result<Self> {
        Self::read_with(path.as_ref(), SpaceSource::Type(component_type))
    }

    /// Load a graph into a caller-provided space.
    pub fn read_from_file_with_space(
        path: impl AsRef<Path>,
        space: Arc<dyn FeatureSpace>,
    ) -> Result<Self> {
        Self::read_with(path.as_ref(), SpaceSource::Space(space))
    }

    fn read_with(path: &Path, source: SpaceSource) -> Result<Self> {
        let graph = persistence::read_graph(path, source)?;
        Ok(Self::from_graph(graph, DesignerConfig::default()))
    }
}

pub(crate) fn validate(space: &dyn FeatureSpace, edges_per_vertex: usize) -> Result<()> {
    if edges_per_vertex == 0 {
        return Err(DegError::InvalidParameter(
            "edges_per_vertex must be at least 1".to_string(),
        ));
    }
    if edges_per_vertex > usize::from(u8::MAX) {
        return Err(DegError::CapacityExceeded(format!(
            "{edges_per_vertex} edges per vertex do not fit in u8"
        )));
    }
    if space.dims() > usize::from(u16::MAX) {
        return Err(DegError::CapacityExceeded(format!(
            "{} dims do not fit in u16",
            space.dims()
        )));
    }
    Ok(())
}
