//! Disk persistence for graphs and hierarchies.
//!
//! # Layer files
//!
//! One graph per file in the little-endian layout shared with other DEG
//! implementations (see [`format`]). The feature component type is not stored in the
//! file; it travels in the file name: `sift1m_k30.float.deg`.
//!
//! # Hierarchies
//!
//! A directory with one layer file per level and a JSON `manifest.json` describing the
//! shared space and configuration (see [`manifest`]).
//!
//! # Write discipline
//!
//! Every file is written to `<target>.tmp` in the same directory, synced, and renamed
//! over the target, so readers never observe a half-written file.

pub mod format;
#[cfg(feature = "hierarchy")]
pub mod manifest;

pub use format::{read_graph, write_graph, SpaceSource};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::feature::ComponentType;

/// File extension of layer files.
pub const GRAPH_EXTENSION: &str = "deg";

/// Write `path` through a temporary sibling file and an atomic rename.
pub(crate) fn write_atomic(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<File>) -> Result<()>,
) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let temp_path = temp_path_for(path);
    let result = (|| -> Result<()> {
        let mut writer = BufWriter::new(File::create(&temp_path)?);
        write(&mut writer)?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Component type tag of a file named `<name>.<type>.deg`.
pub fn type_tag(path: &Path) -> Option<&str> {
    let stem = Path::new(path.file_stem()?);
    stem.extension()?.to_str()
}

/// `<name>.<type>.deg`
pub fn graph_file_name(name: &str, component_type: ComponentType) -> String {
    format!("{name}.{}.{GRAPH_EXTENSION}", component_type.name())
}
