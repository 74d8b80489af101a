//! Error types for expograph.

use thiserror::Error;

/// Errors that can occur while building, querying or persisting an index.
#[derive(Debug, Error)]
pub enum DegError {
    /// A vertex with this label is already present.
    #[error("duplicate label: {0}")]
    DuplicateLabel(u32),

    /// An operation required a vertex that is not present.
    #[error("unknown label: {0}")]
    UnknownLabel(u32),

    /// None of the provided seed labels exist in the graph.
    #[error("none of the seed labels {0:?} exist in the graph")]
    SeedNotFound(Vec<u32>),

    /// Feature type, metric or dimensionality of a file does not match the space.
    #[error("unsupported feature type: {0}")]
    UnsupportedFeatureType(String),

    /// A persisted file is truncated or internally inconsistent.
    #[error("corrupt file: {0}")]
    CorruptFile(String),

    /// A value does not fit the width the file format reserves for it.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Feature byte length differs from the feature space.
    #[error("feature size mismatch: expected {expected} bytes, got {actual}")]
    FeatureSizeMismatch { expected: usize, actual: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest (de)serialization error
    #[cfg(feature = "hierarchy")]
    #[error("manifest error: {0}")]
    Manifest(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DegError>;
