//! Feature vectors as immutable, shared byte buffers.
//!
//! A vertex feature is opaque to the graph: only the [`FeatureSpace`](crate::space::FeatureSpace)
//! interprets its bytes. Components are stored little-endian.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Primitive type of a single feature component.
///
/// The name is used as the type tag of persisted graph files (`sift.float.deg`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentType {
    /// 32-bit IEEE float.
    Float,
    /// Unsigned byte.
    Byte,
}

impl ComponentType {
    /// Size of one component in bytes.
    #[inline]
    pub const fn byte_size(self) -> usize {
        match self {
            ComponentType::Float => 4,
            ComponentType::Byte => 1,
        }
    }

    /// Type tag used in file names.
    pub const fn name(self) -> &'static str {
        match self {
            ComponentType::Float => "float",
            ComponentType::Byte => "byte",
        }
    }

    /// Parse a type tag.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float" => Some(ComponentType::Float),
            "byte" | "uint8" => Some(ComponentType::Byte),
            _ => None,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Immutable feature vector.
///
/// Cloning is cheap: the bytes are reference counted and never copied after
/// construction, so the graph, search results and callers can share them.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FeatureVector {
    bytes: Arc<[u8]>,
}

impl FeatureVector {
    /// Wrap raw little-endian bytes.
    pub fn from_bytes(bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// Encode `f32` components.
    pub fn from_f32s(values: &[f32]) -> Self {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for v in values {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        Self::from_bytes(bytes)
    }

    /// Encode `u8` components.
    pub fn from_u8s(values: &[u8]) -> Self {
        Self::from_bytes(values.to_vec())
    }

    /// Raw bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Read the `f32` component at `index`.
    ///
    /// # Panics
    ///
    /// Panics if the component lies outside the buffer.
    #[inline]
    pub fn read_f32(&self, index: usize) -> f32 {
        let at = index * 4;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.bytes[at..at + 4]);
        f32::from_le_bytes(raw)
    }

    /// Read the byte component at `index`.
    #[inline]
    pub fn read_u8(&self, index: usize) -> u8 {
        self.bytes[index]
    }

    /// Iterate over the buffer as `f32` components. A trailing partial component is ignored.
    pub fn f32s(&self) -> impl Iterator<Item = f32> + '_ {
        self.bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }

    /// Decode every component as `f32`.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.f32s().collect()
    }
}

impl fmt::Debug for FeatureVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeatureVector")
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl From<Vec<f32>> for FeatureVector {
    fn from(values: Vec<f32>) -> Self {
        Self::from_f32s(&values)
    }
}

impl From<&[f32]> for FeatureVector {
    fn from(values: &[f32]) -> Self {
        Self::from_f32s(values)
    }
}
