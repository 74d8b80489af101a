use std::cmp::Ordering;

use crate::feature::FeatureVector;

/// A vertex scored against a query.
#[derive(Clone, Copy, Debug)]
pub struct QueryDistance<'a> {
    /// Internal id at the time of the search.
    pub id: u32,
    pub label: u32,
    pub feature: &'a FeatureVector,
    pub distance: f32,
    /// Index of the query that produced `distance`.
    pub query_index: usize,
}

impl PartialEq for QueryDistance<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueryDistance<'_> {}

impl PartialOrd for QueryDistance<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueryDistance<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Ascending distance, then label, using total_cmp for a NaN-safe total order
        self.distance
            .total_cmp(&other.distance)
            .then(self.label.cmp(&other.label))
    }
}

/// Result set kept sorted by ascending distance.
///
/// Holds at most one entry more than the caller's `k`; the caller trims it.
pub(crate) struct ResultSet<'a> {
    entries: Vec<QueryDistance<'a>>,
}

impl<'a> ResultSet<'a> {
    pub(crate) fn new(k: usize) -> Self {
        Self {
            entries: Vec::with_capacity(k + 1),
        }
    }

    /// Insert in order and return the new length.
    pub(crate) fn insert(&mut self, qd: QueryDistance<'a>) -> usize {
        let pos = self.entries.partition_point(|e| e < &qd);
        self.entries.insert(pos, qd);
        self.entries.len()
    }

    pub(crate) fn pop_worst(&mut self) -> Option<QueryDistance<'a>> {
        self.entries.pop()
    }

    /// Distance of the worst entry, infinite when empty.
    pub(crate) fn worst_distance(&self) -> f32 {
        self.entries.last().map_or(f32::INFINITY, |e| e.distance)
    }

    pub(crate) fn into_vec(self) -> Vec<QueryDistance<'a>> {
        self.entries
    }
}
