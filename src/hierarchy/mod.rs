//! Hierarchical index: a stack of dynamic exploration graphs.
//!
//! Layer 0 holds every vertex. Each upper layer holds a random subset of the layer
//! below, roughly `1 / shrink_factor` of it, and the top layer is kept near
//! `top_rank_size` vertices. A search walks the stack top down and uses each
//! layer's results as the seeds of the next one.
//!
//! ```text
//!   layer 2   o-----o                 ~ top_rank_size
//!   layer 1   o--o--o--o--o           ~ top_rank_size * f
//!   layer 0   o-o-o-o-o-o-o-o-o-o     everything
//! ```

mod rank;

pub use rank::{draw_level, rank_distribution};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::designer::DesignerConfig;
use crate::error::{DegError, Result};
use crate::feature::FeatureVector;
use crate::filter::VertexFilter;
use crate::index::{self, DEGIndex};
use crate::persistence::manifest::{self, HierarchyManifest};
use crate::persistence::{self, SpaceSource};
use crate::search::{QueryDistance, SearchConfig};
use crate::space::{builtin_space, FeatureSpace};

/// How layers are sized and built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Target size of the top layer.
    pub top_rank_size: usize,
    /// Size ratio between neighboring layers.
    pub shrink_factor: f32,
    /// Designer settings shared by every layer.
    pub designer: DesignerConfig,
    /// Seed of the level generator.
    pub seed: u64,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            top_rank_size: 256,
            shrink_factor: 4.0,
            designer: DesignerConfig::default(),
            seed: 7,
        }
    }
}

#[derive(Clone, Debug)]
pub struct HierarchicalDEGIndex {
    space: Arc<dyn FeatureSpace>,
    edges_per_vertex: usize,
    config: HierarchyConfig,
    layers: Vec<DEGIndex>,
    /// Highest layer of every label.
    levels: HashMap<u32, usize>,
    rng: StdRng,
}

impl HierarchicalDEGIndex {
    pub fn new(space: Arc<dyn FeatureSpace>, edges_per_vertex: usize) -> Result<Self> {
        Self::with_config(space, edges_per_vertex, HierarchyConfig::default())
    }

    /// # Errors
    ///
    /// [`DegError::InvalidParameter`] for a zero `top_rank_size` or a
    /// `shrink_factor` not above 1, plus the checks of [`DEGIndex::with_config`].
    pub fn with_config(
        space: Arc<dyn FeatureSpace>,
        edges_per_vertex: usize,
        config: HierarchyConfig,
    ) -> Result<Self> {
        index::validate(space.as_ref(), edges_per_vertex)?;
        validate_config(&config)?;
        let base = DEGIndex::with_config(
            space.clone(),
            edges_per_vertex,
            0,
            config.designer.clone(),
            SearchConfig::default(),
        )?;
        Ok(Self {
            space,
            edges_per_vertex,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            layers: vec![base],
            levels: HashMap::new(),
        })
    }

    pub fn space(&self) -> &Arc<dyn FeatureSpace> {
        &self.space
    }

    pub fn edges_per_vertex(&self) -> usize {
        self.edges_per_vertex
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// Number of vertices in layer 0.
    pub fn len(&self) -> usize {
        self.layers[0].len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, level: usize) -> Option<&DEGIndex> {
        self.layers.get(level)
    }

    pub fn has_label(&self, label: u32) -> bool {
        self.levels.contains_key(&label)
    }

    /// Highest layer holding `label`.
    pub fn level_of(&self, label: u32) -> Option<usize> {
        self.levels.get(&label).copied()
    }

    /// Insert `label` into layer 0 and a randomly drawn number of upper layers.
    ///
    /// # Errors
    ///
    /// [`DegError::DuplicateLabel`] or [`DegError::FeatureSizeMismatch`], with no
    /// layer touched.
    pub fn insert(&mut self, label: u32, feature: FeatureVector) -> Result<()> {
        if self.levels.contains_key(&label) {
            return Err(DegError::DuplicateLabel(label));
        }
        self.space.check(&feature)?;

        let ranks = rank_distribution(
            self.len() + 1,
            self.config.top_rank_size,
            self.config.shrink_factor,
        );
        let level = draw_level(&mut self.rng, self.config.shrink_factor, ranks.len() - 1);
        while self.layers.len() <= level {
            let layer = self.new_layer(self.layers.len())?;
            self.layers.push(layer);
            debug!(layers = self.layers.len(), "added layer");
        }
        for layer in &mut self.layers[..=level] {
            layer.add(label, feature.clone())?;
        }
        self.levels.insert(label, level);
        Ok(())
    }

    /// Remove `label` from every layer. Returns `false` if absent.
    pub fn remove(&mut self, label: u32) -> bool {
        let Some(level) = self.levels.remove(&label) else {
            return false;
        };
        for layer in &mut self.layers[..=level] {
            layer.remove(label);
        }
        while self.layers.len() > 1 && self.layers.last().is_some_and(DEGIndex::is_empty) {
            self.layers.pop();
            debug!(layers = self.layers.len(), "dropped empty layer");
        }
        true
    }

    /// The `k` vertices closest to `query`, descending from the top layer.
    pub fn search(&self, query: &FeatureVector, k: usize, eps: f32) -> Result<Vec<QueryDistance<'_>>> {
        self.search_filtered(query, k, eps, None)
    }

    /// Like [`search`](Self::search); `filter` only applies in layer 0.
    pub fn search_filtered(
        &self,
        query: &FeatureVector,
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
    ) -> Result<Vec<QueryDistance<'_>>> {
        self.space.check(query)?;
        let queries = std::slice::from_ref(query);
        let seeds = self.descend(query, k, eps, 1)?;
        self.layers[0].search(queries, k, eps, filter, &seeds)
    }

    /// Search a single layer, seeded from the layers above it.
    ///
    /// # Errors
    ///
    /// [`DegError::InvalidParameter`] if `level` does not exist.
    pub fn search_at_level(
        &self,
        query: &FeatureVector,
        level: usize,
        k: usize,
        eps: f32,
    ) -> Result<Vec<QueryDistance<'_>>> {
        let Some(layer) = self.layers.get(level) else {
            return Err(DegError::InvalidParameter(format!(
                "level {level} out of range for {} layers",
                self.layers.len()
            )));
        };
        self.space.check(query)?;
        let seeds = self.descend(query, k, eps, level + 1)?;
        layer.search(std::slice::from_ref(query), k, eps, None, &seeds)
    }

    /// Vertices around `seed_labels` in layer 0.
    pub fn explore(
        &self,
        seed_labels: &[u32],
        k: usize,
        eps: f32,
        filter: Option<&VertexFilter>,
    ) -> Result<Vec<QueryDistance<'_>>> {
        self.layers[0].explore(seed_labels, k, eps, filter)
    }

    /// Walk layers from the top down to `stop` (exclusive) and return the labels
    /// found in the last visited layer.
    fn descend(&self, query: &FeatureVector, k: usize, eps: f32, stop: usize) -> Result<Vec<u32>> {
        let queries = std::slice::from_ref(query);
        let keep = k.max(self.config.top_rank_size);
        let mut seeds: Vec<u32> = Vec::new();
        for level in (stop..self.layers.len()).rev() {
            let layer = &self.layers[level];
            if layer.is_empty() {
                continue;
            }
            let found = if level + 1 == self.layers.len() {
                layer.search(queries, self.config.top_rank_size, eps, None, &[])?
            } else {
                layer.search(queries, keep, eps, None, &seeds)?
            };
            seeds = found.into_iter().map(|r| r.label).collect();
        }
        Ok(seeds)
    }

    fn new_layer(&self, level: usize) -> Result<DEGIndex> {
        let mut designer = self.config.designer.clone();
        designer.seed = designer.seed.wrapping_add(level as u64);
        DEGIndex::with_config(
            self.space.clone(),
            self.edges_per_vertex,
            0,
            designer,
            SearchConfig::default(),
        )
    }

    /// Write every layer as `layer<i>.<type>.deg` plus a `manifest.json` into `dir`.
    ///
    /// The manifest is written last, so a directory whose manifest is readable holds
    /// a complete set of layers.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let component_type = self.space.component_type();
        let mut files = Vec::with_capacity(self.layers.len());
        for (level, layer) in self.layers.iter().enumerate() {
            let name = persistence::graph_file_name(&format!("layer{level}"), component_type);
            layer.write_to_file(dir.join(&name))?;
            files.push(name);
        }
        let manifest = HierarchyManifest {
            version: manifest::MANIFEST_VERSION,
            feature_type: component_type,
            feature_size: self.space.feature_size(),
            dims: self.space.dims(),
            metric: self.space.metric(),
            edges_per_vertex: self.edges_per_vertex,
            top_rank_size: self.config.top_rank_size,
            layer_count: files.len(),
            layers: files,
            config: self.config.clone(),
        };
        manifest::write_manifest(dir, &manifest)?;
        info!(dir = %dir.display(), layers = self.layers.len(), vertices = self.len(), "wrote hierarchy");
        Ok(())
    }

    /// Load a hierarchy written by [`write_to_dir`](Self::write_to_dir).
    pub fn read_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest = manifest::read_manifest(dir)?;
        let space = builtin_space(manifest.feature_type, manifest.metric, manifest.dims)?;
        Self::load(dir, manifest, space)
    }

    /// Load a hierarchy into a caller-provided space.
    pub fn read_from_dir_with_space(
        dir: impl AsRef<Path>,
        space: Arc<dyn FeatureSpace>,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let manifest = manifest::read_manifest(dir)?;
        Self::load(dir, manifest, space)
    }

    fn load(dir: &Path, manifest: HierarchyManifest, space: Arc<dyn FeatureSpace>) -> Result<Self> {
        if space.feature_size() != manifest.feature_size {
            return Err(DegError::FeatureSizeMismatch {
                expected: manifest.feature_size,
                actual: space.feature_size(),
            });
        }
        validate_config(&manifest.config)?;
        if manifest.layers.is_empty() {
            return Err(DegError::CorruptFile("manifest lists no layers".to_string()));
        }

        let mut layers = Vec::with_capacity(manifest.layers.len());
        let mut levels = HashMap::new();
        for (level, name) in manifest.layers.iter().enumerate() {
            let graph = persistence::read_graph(&dir.join(name), SpaceSource::Space(space.clone()))?;
            if graph.edges_per_vertex() != manifest.edges_per_vertex {
                return Err(DegError::CorruptFile(format!(
                    "{name} has {} edges per vertex, manifest says {}",
                    graph.edges_per_vertex(),
                    manifest.edges_per_vertex
                )));
            }
            for label in graph.labels() {
                if level > 0 && levels.get(&label) != Some(&(level - 1)) {
                    return Err(DegError::CorruptFile(format!(
                        "label {label} of {name} is missing from the layer below"
                    )));
                }
                levels.insert(label, level);
            }
            let mut designer = manifest.config.designer.clone();
            designer.seed = designer.seed.wrapping_add(level as u64);
            layers.push(DEGIndex::from_graph(graph, designer));
        }
        debug!(dir = %dir.display(), layers = layers.len(), "read hierarchy");

        Ok(Self {
            space,
            edges_per_vertex: manifest.edges_per_vertex,
            rng: StdRng::seed_from_u64(manifest.config.seed),
            config: manifest.config,
            layers,
            levels,
        })
    }
}

fn validate_config(config: &HierarchyConfig) -> Result<()> {
    if config.top_rank_size == 0 {
        return Err(DegError::InvalidParameter(
            "top_rank_size must be at least 1".to_string(),
        ));
    }
    if !(config.shrink_factor > 1.0) {
        return Err(DegError::InvalidParameter(format!(
            "shrink_factor must be above 1, got {}",
            config.shrink_factor
        )));
    }
    Ok(())
}
