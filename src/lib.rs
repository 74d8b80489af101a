//! expograph: dynamic exploration graphs for approximate nearest neighbor search.
//!
//! A dynamic exploration graph (DEG) is an undirected, weighted, even-regular graph:
//! every vertex keeps exactly `edges_per_vertex` edges whenever the graph has more
//! than `edges_per_vertex` vertices. Inserts and removals rewire the graph locally so
//! the degree bound holds after every operation, and searches walk it with a
//! best-first beam bounded by `k` and a radius slack `eps`.
//!
//! - [`graph`]: the vertex arena and its edge lists
//! - [`designer`]: insertion, removal, repair and edge improvement
//! - [`search`]: beam search, exploration around seeds, path checks
//! - [`index`]: [`DEGIndex`], the single-layer entry point
//! - [`hierarchy`]: [`HierarchicalDEGIndex`], a stack of layers searched top down
//! - [`persistence`]: the `.deg` layer file and the hierarchy manifest
//! - [`filter`]: label allow-lists for filtered search
//! - [`analysis`]: graph validation and quality measures
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use expograph::{DEGIndex, FeatureVector, FloatSpace};
//!
//! let mut index = DEGIndex::new(Arc::new(FloatSpace::l2(2)), 4)?;
//! for i in 0..50u32 {
//!     let x = i as f32;
//!     index.add(i, FeatureVector::from_f32s(&[x, x * 0.5]))?;
//! }
//! let query = FeatureVector::from_f32s(&[10.2, 5.1]);
//! let hits = index.search(&[query], 3, 0.1, None, &[])?;
//! assert_eq!(hits[0].label, 10);
//! # Ok::<(), expograph::DegError>(())
//! ```
//!
//! # Distances
//!
//! Float L2 and byte L2 return the squared Euclidean distance. Inner product returns
//! `1 - dot(a, b)`, which only orders correctly for normalized vectors.
//!
//! # Concurrency
//!
//! Mutation takes `&mut self`; search takes `&self`. Indexes are `Send + Sync`, so a
//! caller wanting concurrent writers wraps one in a lock.

pub mod analysis;
pub mod designer;
pub mod distance;
pub mod error;
pub mod feature;
pub mod filter;
pub mod graph;
#[cfg(feature = "hierarchy")]
pub mod hierarchy;
pub mod index;
pub mod persistence;
pub mod search;
pub mod space;

pub use designer::{DesignerConfig, EntryPolicy, ExtendSchema, GraphDesigner};
pub use distance::Metric;
pub use error::{DegError, Result};
pub use feature::{ComponentType, FeatureVector};
pub use filter::{VertexFilter, VertexFilterFactory};
pub use graph::{RegularGraph, VertexCursor, VertexView};
#[cfg(feature = "hierarchy")]
pub use hierarchy::{HierarchicalDEGIndex, HierarchyConfig};
pub use index::DEGIndex;
pub use search::{GraphSearch, QueryDistance, SearchConfig};
pub use space::{builtin_space, ByteSpace, FeatureSpace, FloatSpace};
