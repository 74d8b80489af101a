//! Feature spaces: how feature bytes are interpreted and compared.
//!
//! The graph never looks inside a feature. Everything it needs (size, metric,
//! distance) comes from a [`FeatureSpace`], injected as `Arc<dyn FeatureSpace>`.

use std::fmt;
use std::sync::Arc;

use crate::distance::Metric;
use crate::error::{DegError, Result};
use crate::feature::{ComponentType, FeatureVector};

/// Distance function and layout of the feature vectors stored in a graph.
///
/// Implementations must be symmetric (`distance(a, b) == distance(b, a)`) and
/// return `0` for identical inputs.
pub trait FeatureSpace: Send + Sync + fmt::Debug {
    /// Primitive type of each component.
    fn component_type(&self) -> ComponentType;

    /// Number of components.
    fn dims(&self) -> usize;

    /// Metric identifier written to files.
    fn metric(&self) -> Metric;

    /// Bytes per feature.
    fn feature_size(&self) -> usize {
        self.dims() * self.component_type().byte_size()
    }

    /// Distance between two encoded features of size [`FeatureSpace::feature_size`].
    fn distance_bytes(&self, a: &[u8], b: &[u8]) -> f32;

    /// Distance between two features.
    #[inline]
    fn distance(&self, a: &FeatureVector, b: &FeatureVector) -> f32 {
        self.distance_bytes(a.as_bytes(), b.as_bytes())
    }

    /// Check a feature for the right byte length.
    fn check(&self, feature: &FeatureVector) -> Result<()> {
        if feature.size() != self.feature_size() {
            return Err(DegError::FeatureSizeMismatch {
                expected: self.feature_size(),
                actual: feature.size(),
            });
        }
        Ok(())
    }
}

/// `f32` vectors under [`Metric::L2`] or [`Metric::InnerProduct`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatSpace {
    dims: usize,
    metric: Metric,
}

impl FloatSpace {
    /// Squared Euclidean space.
    pub fn l2(dims: usize) -> Self {
        Self {
            dims,
            metric: Metric::L2,
        }
    }

    /// Inner product space (`1 - dot`).
    pub fn inner_product(dims: usize) -> Self {
        Self {
            dims,
            metric: Metric::InnerProduct,
        }
    }
}

impl FeatureSpace for FloatSpace {
    fn component_type(&self) -> ComponentType {
        ComponentType::Float
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> Metric {
        self.metric
    }

    #[inline]
    fn distance_bytes(&self, a: &[u8], b: &[u8]) -> f32 {
        self.metric.distance(a, b)
    }
}

/// `u8` vectors under squared Euclidean distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteSpace {
    dims: usize,
}

impl ByteSpace {
    pub fn l2(dims: usize) -> Self {
        Self { dims }
    }
}

impl FeatureSpace for ByteSpace {
    fn component_type(&self) -> ComponentType {
        ComponentType::Byte
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn metric(&self) -> Metric {
        Metric::L2Uint8
    }

    #[inline]
    fn distance_bytes(&self, a: &[u8], b: &[u8]) -> f32 {
        Metric::L2Uint8.distance(a, b)
    }
}

/// Resolve one of the built-in spaces.
///
/// Used by loaders when the caller does not provide a space.
pub fn builtin_space(
    component_type: ComponentType,
    metric: Metric,
    dims: usize,
) -> Result<Arc<dyn FeatureSpace>> {
    match (component_type, metric) {
        (ComponentType::Float, Metric::L2) => Ok(Arc::new(FloatSpace::l2(dims))),
        (ComponentType::Float, Metric::InnerProduct) => {
            Ok(Arc::new(FloatSpace::inner_product(dims)))
        }
        (ComponentType::Byte, Metric::L2Uint8) => Ok(Arc::new(ByteSpace::l2(dims))),
        (ty, m) => Err(DegError::UnsupportedFeatureType(format!(
            "no built-in space for {ty} components with metric {m:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn float_space_sizes() {
        let s = FloatSpace::l2(128);
        assert_eq!(s.feature_size(), 512);
        assert_eq!(ByteSpace::l2(128).feature_size(), 128);
    }

    #[test]
    fn check_rejects_wrong_size() {
        let s = FloatSpace::l2(2);
        assert!(s.check(&FeatureVector::from_f32s(&[1.0, 2.0])).is_ok());
        let err = s.check(&FeatureVector::from_f32s(&[1.0])).unwrap_err();
        assert!(matches!(
            err,
            DegError::FeatureSizeMismatch {
                expected: 8,
                actual: 4
            }
        ));
    }

    #[test]
    fn builtin_rejects_byte_inner_product() {
        assert!(builtin_space(ComponentType::Byte, Metric::InnerProduct, 4).is_err());
        let s = builtin_space(ComponentType::Float, Metric::InnerProduct, 4).unwrap();
        assert_eq!(s.metric(), Metric::InnerProduct);
    }
}
