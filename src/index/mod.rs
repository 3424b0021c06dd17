
use std::collections::HashSet;
use tracing::debug;

use crate::{Result, RetrievalError};

/// Sentinel id filling unoccupied result slots when the index holds fewer
/// entries than the requested `k`. Paired with an infinite distance.
pub const MISSING_ID: i64 = -1;

/// Exact nearest-neighbor index over fixed-dimensionality vectors keyed by
/// i64 id.
///
/// Append-only with explicit removal: updating a vector in place is modeled
/// as remove-then-add. Entries are stored in one flat f32 buffer; search is
/// a full scan by Euclidean (L2) distance.
#[derive(Debug, Clone)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<i64>,
    vectors: Vec<f32>,
}

impl FlatIndex {
    #[inline]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[inline]
    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    /// Snapshot of all ids currently present, in insertion order.
    #[inline]
    pub fn ids(&self) -> Vec<i64> {
        self.ids.clone()
    }

    /// Append a batch of vectors under the given ids.
    ///
    /// `ids` and `vectors` must have equal lengths and every vector must
    /// match the index dimension. Ids must not already be present: globally
    /// unique surrogate ids are an invariant the caller maintains.
    #[inline]
    pub fn add(&mut self, ids: &[i64], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(RetrievalError::Dimension {
                expected: ids.len(),
                actual: vectors.len(),
            });
        }

        for vector in vectors {
            if vector.len() != self.dimension {
                return Err(RetrievalError::Dimension {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }

        let existing: HashSet<i64> = self.ids.iter().copied().collect();
        for id in ids {
            if existing.contains(id) {
                return Err(RetrievalError::Consistency(format!(
                    "id {id} is already present in the index"
                )));
            }
        }

        self.ids.extend_from_slice(ids);
        self.vectors.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.vectors.extend_from_slice(vector);
        }

        debug!("Added {} vectors, index now holds {}", ids.len(), self.len());
        Ok(())
    }

    /// Remove entries by id. Removing a nonexistent id is a no-op.
    #[inline]
    pub fn remove(&mut self, ids: &[i64]) {
        if ids.is_empty() || self.is_empty() {
            return;
        }

        let doomed: HashSet<i64> = ids.iter().copied().collect();
        let dimension = self.dimension;

        let mut kept_ids = Vec::with_capacity(self.ids.len());
        let mut kept_vectors = Vec::with_capacity(self.vectors.len());

        for (slot, id) in self.ids.iter().enumerate() {
            if !doomed.contains(id) {
                kept_ids.push(*id);
                kept_vectors.extend_from_slice(&self.vectors[slot * dimension..(slot + 1) * dimension]);
            }
        }

        let removed = self.ids.len() - kept_ids.len();
        self.ids = kept_ids;
        self.vectors = kept_vectors;

        debug!("Removed {} vectors, index now holds {}", removed, self.len());
    }

    /// Find up to `k` nearest neighbors of `query` by Euclidean distance.
    ///
    /// Results come back ascending by distance, ties broken by lower id.
    /// When fewer than `k` entries exist, trailing slots hold
    /// [`MISSING_ID`] and `f32::INFINITY`; callers filter these out.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<(Vec<f32>, Vec<i64>)> {
        if query.len() != self.dimension {
            return Err(RetrievalError::Dimension {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<(f32, i64)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(slot, id)| {
                let vector = &self.vectors[slot * self.dimension..(slot + 1) * self.dimension];
                (l2_distance(query, vector), *id)
            })
            .collect();

        hits.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        hits.truncate(k);

        let mut distances: Vec<f32> = hits.iter().map(|(d, _)| *d).collect();
        let mut ids: Vec<i64> = hits.iter().map(|(_, id)| *id).collect();

        while ids.len() < k {
            distances.push(f32::INFINITY);
            ids.push(MISSING_ID);
        }

        Ok((distances, ids))
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum::<f32>()
        .sqrt()
}
