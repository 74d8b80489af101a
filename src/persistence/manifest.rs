//! `manifest.json` of a hierarchy directory.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::write_atomic;
use crate::distance::Metric;
use crate::error::{DegError, Result};
use crate::feature::ComponentType;
use crate::hierarchy::HierarchyConfig;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const MANIFEST_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HierarchyManifest {
    pub version: u32,
    pub feature_type: ComponentType,
    /// Bytes per feature.
    pub feature_size: usize,
    pub dims: usize,
    pub metric: Metric,
    pub edges_per_vertex: usize,
    pub top_rank_size: usize,
    pub layer_count: usize,
    /// Layer file names relative to the directory, layer 0 first.
    pub layers: Vec<String>,
    pub config: HierarchyConfig,
}

pub fn write_manifest(dir: &Path, manifest: &HierarchyManifest) -> Result<()> {
    write_atomic(&dir.join(MANIFEST_FILE), |w| {
        serde_json::to_writer_pretty(&mut *w, manifest)?;
        Ok(())
    })
}

/// # Errors
///
/// [`DegError::Manifest`] for malformed JSON, [`DegError::CorruptFile`] for an
/// unknown version, a wrong layer count or a layer name escaping the directory.
pub fn read_manifest(dir: &Path) -> Result<HierarchyManifest> {
    let file = File::open(dir.join(MANIFEST_FILE))?;
    let manifest: HierarchyManifest = serde_json::from_reader(BufReader::new(file))?;
    if manifest.version != MANIFEST_VERSION {
        return Err(DegError::CorruptFile(format!(
            "manifest version {} is not supported",
            manifest.version
        )));
    }
    if manifest.layer_count != manifest.layers.len() {
        return Err(DegError::CorruptFile(format!(
            "manifest announces {} layers but names {}",
            manifest.layer_count,
            manifest.layers.len()
        )));
    }
    if let Some(bad) = manifest
        .layers
        .iter()
        .find(|name| Path::new(name).components().count() != 1 || name.starts_with('.'))
    {
        return Err(DegError::CorruptFile(format!("invalid layer file name {bad:?}")));
    }
    Ok(manifest)
}
