//! Dense inner-product index over normalized concept embeddings.

use ndarray::{Array1, Array2, ArrayView1};

use crate::error::IndexError;

use super::ConceptStore;

/// Inner-product index over the store's unit-normalized embeddings.
///
/// Because rows are pre-normalized, the inner product against a normalized
/// query equals cosine similarity.
#[derive(Debug, Clone)]
pub struct ConceptIndex {
    embeddings: Array2<f64>,
}

impl ConceptIndex {
    /// Builds an index from a concept store.
    pub fn new(store: &ConceptStore) -> Self {
        Self {
            embeddings: store.embeddings().clone(),
        }
    }

    /// Scores a query against every concept, returning one similarity per
    /// concept in store order.
    ///
    /// The query is not assumed normalized; it is normalized internally. A
    /// zero-norm query has no direction and scores 0 against everything.
    ///
    /// # Errors
    ///
    /// [`IndexError::InvalidQuery`] on non-finite components or a dimension
    /// mismatch.
    pub fn similarities(&self, query: ArrayView1<'_, f64>) -> Result<Array1<f64>, IndexError> {
        if query.len() != self.embeddings.ncols() {
            return Err(IndexError::InvalidQuery(format!(
                "query dimension {} does not match index dimension {}",
                query.len(),
                self.embeddings.ncols()
            )));
        }
        if query.iter().any(|v| !v.is_finite()) {
            return Err(IndexError::InvalidQuery(
                "query contains a non-finite component".to_string(),
            ));
        }

        let norm = query.dot(&query).sqrt();
        if norm == 0.0 {
            return Ok(Array1::zeros(self.embeddings.nrows()));
        }

        let normalized = query.mapv(|v| v / norm);
        Ok(self.embeddings.dot(&normalized))
    }
}
