//! Layer file codec.
//!
//! # Layout
//!
//! All integers and floats are little-endian.
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Header (8B):                            │
//! │   u8   metric id                        │
//! │   u16  dims                             │
//! │   u32  vertex count                     │
//! │   u8   edges per vertex (k)             │
//! ├─────────────────────────────────────────┤
//! │ Vertex records, id order:               │
//! │   feature bytes                         │
//! │   u32 x k  neighbor ids (ascending)     │
//! │   f32 x k  edge weights                 │
//! │   u32      label                        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Vertices with fewer than `k` edges are padded with self references of weight 0.
//! The feature size is not stored: it is whatever remains of a record once the edges
//! and the label are accounted for, so the file length must divide evenly.

use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::{type_tag, write_atomic};
use crate::distance::Metric;
use crate::error::{DegError, Result};
use crate::feature::{ComponentType, FeatureVector};
use crate::graph::RegularGraph;
use crate::space::{builtin_space, FeatureSpace};

/// Header size in bytes.
pub const HEADER_SIZE: u64 = 8;

/// Where a reader gets the feature space of a file from.
#[derive(Clone, Debug)]
pub enum SpaceSource {
    /// The `<name>.<type>.deg` tag, or the metric if the name carries none.
    FileName,
    /// A built-in space of this component type.
    Type(ComponentType),
    /// A caller-provided space; must match the file's metric and layout.
    Space(Arc<dyn FeatureSpace>),
}

/// Parsed file header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphHeader {
    pub metric: Metric,
    pub dims: u16,
    pub vertex_count: u32,
    pub edges_per_vertex: u8,
}

impl GraphHeader {
    pub fn for_graph(graph: &RegularGraph) -> Result<Self> {
        let space = graph.space();
        let dims = u16::try_from(space.dims()).map_err(|_| {
            DegError::CapacityExceeded(format!("{} dims do not fit in u16", space.dims()))
        })?;
        let edges_per_vertex = u8::try_from(graph.edges_per_vertex()).map_err(|_| {
            DegError::CapacityExceeded(format!(
                "{} edges per vertex do not fit in u8",
                graph.edges_per_vertex()
            ))
        })?;
        let vertex_count = u32::try_from(graph.vertex_count()).map_err(|_| {
            DegError::CapacityExceeded(format!(
                "{} vertices do not fit in u32",
                graph.vertex_count()
            ))
        })?;
        Ok(Self {
            metric: space.metric(),
            dims,
            vertex_count,
            edges_per_vertex,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&[self.metric.id()])?;
        w.write_all(&self.dims.to_le_bytes())?;
        w.write_all(&self.vertex_count.to_le_bytes())?;
        w.write_all(&[self.edges_per_vertex])?;
        Ok(())
    }

    pub fn read<R: Read>(r: &mut R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        r.read_exact(&mut buf).map_err(truncated)?;
        let metric = Metric::from_id(buf[0]).ok_or_else(|| {
            DegError::UnsupportedFeatureType(format!("unknown metric id {:#04x}", buf[0]))
        })?;
        Ok(Self {
            metric,
            dims: u16::from_le_bytes([buf[1], buf[2]]),
            vertex_count: u32::from_le_bytes([buf[3], buf[4], buf[5], buf[6]]),
            edges_per_vertex: buf[7],
        })
    }

    /// Bytes of a vertex record besides the feature.
    fn record_overhead(&self) -> u64 {
        u64::from(self.edges_per_vertex) * 8 + 4
    }
}

/// Write `graph` to `path`, replacing any existing file atomically.
pub fn write_graph(graph: &RegularGraph, path: &Path) -> Result<()> {
    let header = GraphHeader::for_graph(graph)?;
    let epv = graph.edges_per_vertex();
    write_atomic(path, |w| {
        header.write(w)?;
        for (id, vertex) in graph.vertices().iter().enumerate() {
            let edges = vertex.edges.sorted_by_id();
            if edges.len() > epv {
                return Err(DegError::CapacityExceeded(format!(
                    "vertex {} has {} edges, more than {epv}",
                    vertex.label,
                    edges.len()
                )));
            }
            w.write_all(vertex.feature.as_bytes())?;
            for slot in 0..epv {
                let neighbor = edges.get(slot).map_or(id as u32, |e| e.id);
                w.write_all(&neighbor.to_le_bytes())?;
            }
            for slot in 0..epv {
                let weight = edges.get(slot).map_or(0.0f32, |e| e.weight);
                w.write_all(&weight.to_le_bytes())?;
            }
            w.write_all(&vertex.label.to_le_bytes())?;
        }
        Ok(())
    })?;
    debug!(
        path = %path.display(),
        vertices = graph.vertex_count(),
        "wrote graph"
    );
    Ok(())
}

/// Read a graph written by [`write_graph`] or a compatible implementation.
pub fn read_graph(path: &Path, source: SpaceSource) -> Result<RegularGraph> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut r = BufReader::new(file);

    if file_len < HEADER_SIZE {
        return Err(DegError::CorruptFile(format!(
            "{} bytes is shorter than the header",
            file_len
        )));
    }
    let header = GraphHeader::read(&mut r)?;
    if header.edges_per_vertex == 0 {
        return Err(DegError::CorruptFile("edges per vertex is zero".to_string()));
    }
    let count = u64::from(header.vertex_count);
    let body = file_len - HEADER_SIZE;
    let feature_size = if count == 0 {
        if body != 0 {
            return Err(DegError::CorruptFile(format!(
                "{body} trailing bytes after an empty graph"
            )));
        }
        None
    } else {
        if body % count != 0 || body / count < header.record_overhead() {
            return Err(DegError::CorruptFile(format!(
                "{body} body bytes do not split into {count} vertex records"
            )));
        }
        Some((body / count - header.record_overhead()) as usize)
    };

    let space = resolve_space(path, &source, &header, feature_size)?;
    let epv = usize::from(header.edges_per_vertex);
    let feature_size = space.feature_size();
    let mut graph = RegularGraph::with_capacity(space, epv, count as usize);

    let mut neighbor_ids = vec![0u32; epv];
    let mut edges: Vec<(u32, u32, f32)> = Vec::with_capacity(count as usize * epv);
    for id in 0..header.vertex_count {
        let mut feature = vec![0u8; feature_size];
        r.read_exact(&mut feature).map_err(truncated)?;
        for slot in neighbor_ids.iter_mut() {
            *slot = read_u32(&mut r)?;
        }
        for &neighbor in &neighbor_ids {
            let weight = read_f32(&mut r)?;
            if neighbor == id {
                continue;
            }
            if neighbor >= header.vertex_count {
                return Err(DegError::CorruptFile(format!(
                    "vertex {id} references missing vertex {neighbor}"
                )));
            }
            edges.push((id, neighbor, weight));
        }
        let label = read_u32(&mut r)?;
        graph
            .add_vertex(label, FeatureVector::from_bytes(feature))
            .map_err(|e| match e {
                DegError::DuplicateLabel(l) => {
                    DegError::CorruptFile(format!("label {l} appears twice"))
                }
                other => other,
            })?;
    }

    for (a, b, weight) in edges {
        graph.add_edge(a, b, weight);
    }
    if let Some(v) = (0..header.vertex_count).find(|&v| graph.degree(v) > epv) {
        return Err(DegError::CorruptFile(format!(
            "vertex {v} has asymmetric edges"
        )));
    }

    debug!(
        path = %path.display(),
        vertices = graph.vertex_count(),
        edges_per_vertex = epv,
        "read graph"
    );
    Ok(graph)
}

fn resolve_space(
    path: &Path,
    source: &SpaceSource,
    header: &GraphHeader,
    feature_size: Option<usize>,
) -> Result<Arc<dyn FeatureSpace>> {
    let dims = usize::from(header.dims);
    let space = match source {
        SpaceSource::Space(space) => {
            if space.metric() != header.metric || space.dims() != dims {
                return Err(DegError::UnsupportedFeatureType(format!(
                    "file has metric {:?} with {dims} dims, space has {:?} with {}",
                    header.metric,
                    space.metric(),
                    space.dims()
                )));
            }
            Arc::clone(space)
        }
        SpaceSource::Type(ty) => builtin_space(*ty, header.metric, dims)?,
        SpaceSource::FileName => {
            let ty = match type_tag(path) {
                Some(tag) => ComponentType::from_name(tag).ok_or_else(|| {
                    DegError::UnsupportedFeatureType(format!("unknown feature type tag {tag:?}"))
                })?,
                None if header.metric == Metric::L2Uint8 => ComponentType::Byte,
                None => ComponentType::Float,
            };
            builtin_space(ty, header.metric, dims)?
        }
    };
    if let Some(size) = feature_size {
        if size != space.feature_size() {
            return Err(DegError::UnsupportedFeatureType(format!(
                "records hold {size} feature bytes, {} {} components need {}",
                dims,
                space.component_type(),
                space.feature_size()
            )));
        }
    }
    Ok(space)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(truncated)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(truncated)?;
    Ok(f32::from_le_bytes(buf))
}

fn truncated(e: std::io::Error) -> DegError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        DegError::CorruptFile("unexpected end of file".to_string())
    } else {
        DegError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space::{ByteSpace, FloatSpace};

    fn triangle(space: Arc<dyn FeatureSpace>, features: [FeatureVector; 3]) -> RegularGraph {
        let mut g = RegularGraph::new(space, 2);
        for (label, f) in features.into_iter().enumerate() {
            g.add_vertex(label as u32 + 10, f).unwrap();
        }
        g.add_edge(0, 1, 1.0);
        g.add_edge(1, 2, 2.0);
        g.add_edge(0, 2, 3.0);
        g
    }

    #[test]
    fn header_layout() {
        let h = GraphHeader {
            metric: Metric::L2,
            dims: 128,
            vertex_count: 3,
            edges_per_vertex: 30,
        };
        let mut buf = Vec::new();
        h.write(&mut buf).unwrap();
        assert_eq!(buf, vec![1, 128, 0, 3, 0, 0, 0, 30]);
        assert_eq!(GraphHeader::read(&mut buf.as_slice()).unwrap(), h);
    }

    #[test]
    fn file_size_matches_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.float.deg");
        let g = triangle(
            Arc::new(FloatSpace::l2(2)),
            [
                FeatureVector::from_f32s(&[0.0, 0.0]),
                FeatureVector::from_f32s(&[1.0, 0.0]),
                FeatureVector::from_f32s(&[0.0, 2.0]),
            ],
        );
        write_graph(&g, &path).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, 8 + 3 * (8 + 2 * 8 + 4));
    }

    #[test]
    fn byte_graph_loads_from_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.byte.deg");
        let g = triangle(
            Arc::new(ByteSpace::l2(3)),
            [
                FeatureVector::from_u8s(&[1, 2, 3]),
                FeatureVector::from_u8s(&[4, 5, 6]),
                FeatureVector::from_u8s(&[7, 8, 9]),
            ],
        );
        write_graph(&g, &path).unwrap();
        let loaded = read_graph(&path, SpaceSource::FileName).unwrap();
        assert_eq!(loaded.space().component_type(), ComponentType::Byte);
        assert_eq!(loaded.feature_by_label(11).unwrap().as_bytes(), &[4, 5, 6]);
        assert_eq!(loaded.edge_weight(1, 2), Some(2.0));
    }

    #[test]
    fn padding_is_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p.float.deg");
        let mut g = RegularGraph::new(Arc::new(FloatSpace::l2(1)), 4);
        g.add_vertex(1, FeatureVector::from_f32s(&[0.0])).unwrap();
        g.add_vertex(2, FeatureVector::from_f32s(&[1.0])).unwrap();
        g.add_edge(0, 1, 1.0);
        write_graph(&g, &path).unwrap();
        let loaded = read_graph(&path, SpaceSource::FileName).unwrap();
        assert_eq!(loaded.degree(0), 1);
        assert!(!loaded.has_edge(0, 0));
    }

    #[test]
    fn mismatched_space_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("m.float.deg");
        let g = triangle(
            Arc::new(FloatSpace::l2(1)),
            [
                FeatureVector::from_f32s(&[0.0]),
                FeatureVector::from_f32s(&[1.0]),
                FeatureVector::from_f32s(&[2.0]),
            ],
        );
        write_graph(&g, &path).unwrap();
        let err = read_graph(&path, SpaceSource::Type(ComponentType::Byte)).unwrap_err();
        assert!(matches!(err, DegError::UnsupportedFeatureType(_)));
        let err = read_graph(
            &path,
            SpaceSource::Space(Arc::new(FloatSpace::inner_product(1))),
        )
        .unwrap_err();
        assert!(matches!(err, DegError::UnsupportedFeatureType(_)));
    }

    #[test]
    fn truncated_file_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.float.deg");
        let g = triangle(
            Arc::new(FloatSpace::l2(1)),
            [
                FeatureVector::from_f32s(&[0.0]),
                FeatureVector::from_f32s(&[1.0]),
                FeatureVector::from_f32s(&[2.0]),
            ],
        );
        write_graph(&g, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 1]).unwrap();
        let err = read_graph(&path, SpaceSource::FileName).unwrap_err();
        assert!(matches!(err, DegError::CorruptFile(_)));
        std::fs::write(&path, &bytes[..5]).unwrap();
        let err = read_graph(&path, SpaceSource::FileName).unwrap_err();
        assert!(matches!(err, DegError::CorruptFile(_)));
    }
}
