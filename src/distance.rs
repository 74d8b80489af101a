//! Distance metrics and kernels over little-endian feature bytes.
//!
//! ## Important nuance
//!
//! [`Metric::L2`] is the *squared* Euclidean distance. It preserves the neighbor order of
//! the true distance and is what persisted graphs store as edge weights, so weights read
//! from files produced by other implementations compare directly.
//! [`Metric::InnerProduct`] is `1 - <a,b>` and expects L2-normalized inputs.

use serde::{Deserialize, Serialize};

/// Distance metric identifier, as written in the first header byte of a graph file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Metric {
    /// Squared Euclidean distance over `f32` components.
    L2 = 1,
    /// `1 - dot(a, b)` over `f32` components.
    InnerProduct = 2,
    /// Squared Euclidean distance over `u8` components.
    L2Uint8 = 0x11,
}

impl Metric {
    /// Numeric id used in files.
    #[inline]
    pub const fn id(self) -> u8 {
        self as u8
    }

    /// Inverse of [`Metric::id`].
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Metric::L2),
            2 => Some(Metric::InnerProduct),
            0x11 => Some(Metric::L2Uint8),
            _ => None,
        }
    }

    /// Compute the distance between two encoded features.
    ///
    /// If sizes mismatch, this returns `f32::INFINITY` (so it is never selected as a
    /// nearest neighbor).
    #[inline]
    #[must_use]
    pub fn distance(self, a: &[u8], b: &[u8]) -> f32 {
        if a.len() != b.len() {
            return f32::INFINITY;
        }
        match self {
            Metric::L2 => l2_squared_f32(a, b),
            Metric::InnerProduct => 1.0 - dot_f32(a, b),
            Metric::L2Uint8 => l2_squared_u8(a, b),
        }
    }
}

/// Squared L2 distance between two little-endian `f32` buffers.
#[inline]
#[must_use]
pub fn l2_squared_f32(a: &[u8], b: &[u8]) -> f32 {
    #[cfg(feature = "innr")]
    if let (Some(x), Some(y)) = (as_f32s(a), as_f32s(b)) {
        return innr::l2_distance_squared(x, y);
    }
    portable::l2_squared_f32(a, b)
}

/// Dot product of two little-endian `f32` buffers.
#[inline]
#[must_use]
pub fn dot_f32(a: &[u8], b: &[u8]) -> f32 {
    #[cfg(feature = "innr")]
    if let (Some(x), Some(y)) = (as_f32s(a), as_f32s(b)) {
        return innr::dot(x, y);
    }
    portable::dot_f32(a, b)
}

/// View feature bytes as `f32`s without copying.
///
/// `None` for buffers that are not 4-byte aligned and on big-endian targets, where the
/// stored little-endian bytes must be decoded.
#[cfg(feature = "innr")]
#[inline]
fn as_f32s(bytes: &[u8]) -> Option<&[f32]> {
    if cfg!(target_endian = "little") {
        bytemuck::try_cast_slice(bytes).ok()
    } else {
        None
    }
}

/// Decoding kernels for builds without `innr` and for unaligned buffers.
mod portable {
    #[inline(always)]
    fn f32_at(chunk: &[u8]) -> f32 {
        f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
    }

    pub(super) fn l2_squared_f32(a: &[u8], b: &[u8]) -> f32 {
        // Four accumulators keep the dependency chain short enough to vectorize.
        let mut acc = [0.0f32; 4];
        let mut ca = a.chunks_exact(16);
        let mut cb = b.chunks_exact(16);
        for (x, y) in (&mut ca).zip(&mut cb) {
            for lane in 0..4 {
                let d = f32_at(&x[lane * 4..]) - f32_at(&y[lane * 4..]);
                acc[lane] += d * d;
            }
        }
        let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
        for (x, y) in ca
            .remainder()
            .chunks_exact(4)
            .zip(cb.remainder().chunks_exact(4))
        {
            let d = f32_at(x) - f32_at(y);
            sum += d * d;
        }
        sum
    }

    pub(super) fn dot_f32(a: &[u8], b: &[u8]) -> f32 {
        let mut acc = [0.0f32; 4];
        let mut ca = a.chunks_exact(16);
        let mut cb = b.chunks_exact(16);
        for (x, y) in (&mut ca).zip(&mut cb) {
            for lane in 0..4 {
                acc[lane] += f32_at(&x[lane * 4..]) * f32_at(&y[lane * 4..]);
            }
        }
        let mut sum = acc[0] + acc[1] + acc[2] + acc[3];
        for (x, y) in ca
            .remainder()
            .chunks_exact(4)
            .zip(cb.remainder().chunks_exact(4))
        {
            sum += f32_at(x) * f32_at(y);
        }
        sum
    }
}

/// Squared L2 distance between two byte buffers.
#[inline]
#[must_use]
pub fn l2_squared_u8(a: &[u8], b: &[u8]) -> f32 {
    let sum: u64 = a
        .iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = i32::from(x) - i32::from(y);
            (d * d) as u64
        })
        .sum();
    sum as f32
}
