//! Label allow-lists for filtered search.
//!
//! A [`VertexFilter`] is a compressed bitmap over vertex labels plus the size of the
//! universe it was drawn from. Search consults it once per visited candidate, so
//! `is_valid` is a single bitmap lookup with no allocation.
//!
//! Set operations mutate the left operand in place and keep the cached count exact.

use roaring::RoaringBitmap;

/// Allow-list of vertex labels.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexFilter {
    valid: RoaringBitmap,
    valid_count: u64,
    universe_size: u64,
}

impl VertexFilter {
    /// Empty filter over a universe of `universe_size` labels.
    pub fn empty(universe_size: usize) -> Self {
        Self {
            valid: RoaringBitmap::new(),
            valid_count: 0,
            universe_size: universe_size as u64,
        }
    }

    /// Filter admitting `labels`.
    pub fn from_labels(labels: impl IntoIterator<Item = u32>, universe_size: usize) -> Self {
        let valid: RoaringBitmap = labels.into_iter().collect();
        Self {
            valid_count: valid.len(),
            valid,
            universe_size: universe_size as u64,
        }
    }

    /// Filter admitting every label in `0..universe_size`.
    pub fn all(universe_size: u32) -> Self {
        Self::from_labels(0..universe_size, universe_size as usize)
    }

    #[inline]
    pub fn is_valid(&self, label: u32) -> bool {
        self.valid.contains(label)
    }

    /// Number of admitted labels.
    #[inline]
    pub fn len(&self) -> usize {
        self.valid_count as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.valid_count == 0
    }

    /// Alias of [`len`](Self::len).
    #[inline]
    pub fn size(&self) -> usize {
        self.len()
    }

    pub fn universe_size(&self) -> usize {
        self.universe_size as usize
    }

    /// Fraction of the universe admitted, clamped to `[0, 1]`.
    pub fn inclusion_rate(&self) -> f32 {
        if self.universe_size == 0 {
            return 0.0;
        }
        (self.valid_count as f64 / self.universe_size as f64).clamp(0.0, 1.0) as f32
    }

    pub fn for_each_valid_id(&self, mut f: impl FnMut(u32)) {
        for label in &self.valid {
            f(label);
        }
    }

    /// Admitted labels in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.valid.iter()
    }

    /// The `n`-th admitted label in ascending order.
    pub fn select(&self, n: usize) -> Option<u32> {
        self.valid.iter().nth(n)
    }

    /// Keep only labels also admitted by `other`.
    pub fn and(&mut self, other: &VertexFilter) {
        self.valid &= &other.valid;
        self.valid_count = self.valid.len();
    }

    /// Drop labels admitted by `other`.
    pub fn and_not(&mut self, other: &VertexFilter) {
        self.valid -= &other.valid;
        self.valid_count = self.valid.len();
    }

    /// Admit `labels`. Labels already admitted are ignored.
    pub fn add(&mut self, labels: &[u32]) {
        for &label in labels {
            if self.valid.insert(label) {
                self.valid_count += 1;
            }
        }
    }

    /// Stop admitting `labels`. Absent labels are ignored.
    pub fn remove(&mut self, labels: &[u32]) {
        for &label in labels {
            if self.valid.remove(label) {
                self.valid_count -= 1;
            }
        }
    }
}

/// Free-function form of the in-place set operations, for callers that combine
/// filters generically.
pub struct VertexFilterFactory;

impl VertexFilterFactory {
    pub fn and(x1: &mut VertexFilter, x2: &VertexFilter) {
        x1.and(x2);
    }

    pub fn and_not(x1: &mut VertexFilter, x2: &VertexFilter) {
        x1.and_not(x2);
    }

    pub fn add(x1: &mut VertexFilter, ids: &[u32]) {
        x1.add(ids);
    }

    pub fn remove(x1: &mut VertexFilter, ids: &[u32]) {
        x1.remove(ids);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_and_rate() {
        let f = VertexFilter::from_labels([1, 3, 5], 10);
        assert_eq!(f.size(), 3);
        assert!((f.inclusion_rate() - 0.3).abs() < 1e-6);
        assert!(f.is_valid(3));
        assert!(!f.is_valid(2));
    }

    #[test]
    fn rate_is_clamped() {
        let f = VertexFilter::from_labels(0..20, 10);
        assert_eq!(f.inclusion_rate(), 1.0);
        assert_eq!(VertexFilter::empty(0).inclusion_rate(), 0.0);
    }

    #[test]
    fn add_remove_keep_count() {
        let mut f = VertexFilter::empty(100);
        f.add(&[4, 4, 9]);
        assert_eq!(f.len(), 2);
        f.remove(&[9, 50]);
        assert_eq!(f.len(), 1);
        let mut seen = Vec::new();
        f.for_each_valid_id(|l| seen.push(l));
        assert_eq!(seen, vec![4]);
    }

    #[test]
    fn and_and_not() {
        let mut a = VertexFilter::from_labels([1, 2, 3, 4], 10);
        let b = VertexFilter::from_labels([3, 4, 5], 10);
        let mut c = a.clone();
        VertexFilterFactory::and(&mut a, &b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![3, 4]);
        VertexFilterFactory::and_not(&mut c, &b);
        assert_eq!(c.iter().collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(c.len(), 2);
    }
}
