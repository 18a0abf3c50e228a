//! Immutable concept store built from seed concept lists.

use std::collections::HashMap;

use ndarray::{Array2, ArrayView1};
use tracing::info;

use crate::error::StoreError;

/// In-memory store of concepts with frequencies, co-occurrence counts, and
/// unit-normalized embeddings.
///
/// Built once and read-only thereafter. Concept order is deterministic:
/// deduplicated preserving first-seen order across the seed lists.
#[derive(Debug, Clone)]
pub struct ConceptStore {
    concepts: Vec<String>,
    index: HashMap<String, usize>,
    /// Number of seed lists containing each concept.
    freq: Vec<u64>,
    /// Sparse symmetric co-occurrence rows; the diagonal is zero by convention.
    co: Vec<Vec<(usize, u32)>>,
    /// Row-per-concept embedding matrix, unit L2 length.
    embeddings: Array2<f64>,
}

impl ConceptStore {
    /// Builds a store from seed concept lists and an external embedding map.
    ///
    /// Each list is deduplicated before counting, so `freq(c)` is the number
    /// of lists containing `c` and `co(a, b)` is the number of lists
    /// containing both. Embeddings are L2-normalized at build time.
    ///
    /// # Errors
    ///
    /// - [`StoreError::MissingEmbedding`] if a seed concept has no embedding.
    /// - [`StoreError::InvalidEmbedding`] for zero-norm, non-finite, or
    ///   dimension-mismatched embeddings.
    /// - [`StoreError::EmptySeedLists`] if no concept is observed at all.
    pub fn build(
        seed_lists: &[Vec<String>],
        embedding_map: &HashMap<String, Vec<f64>>,
    ) -> Result<Self, StoreError> {
        let mut concepts: Vec<String> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for list in seed_lists {
            for concept in list {
                if !index.contains_key(concept) {
                    index.insert(concept.clone(), concepts.len());
                    concepts.push(concept.clone());
                }
            }
        }
        if concepts.is_empty() {
            return Err(StoreError::EmptySeedLists);
        }

        let n = concepts.len();
        let mut freq = vec![0u64; n];
        let mut co_dense: Vec<HashMap<usize, u32>> = vec![HashMap::new(); n];

        for list in seed_lists {
            let mut ids: Vec<usize> = list.iter().map(|c| index[c]).collect();
            ids.sort_unstable();
            ids.dedup();

            for &i in &ids {
                freq[i] += 1;
            }
            for (a, &i) in ids.iter().enumerate() {
                for &j in &ids[a + 1..] {
                    *co_dense[i].entry(j).or_insert(0) += 1;
                    *co_dense[j].entry(i).or_insert(0) += 1;
                }
            }
        }

        let co = co_dense
            .into_iter()
            .map(|row| {
                let mut entries: Vec<(usize, u32)> = row.into_iter().collect();
                entries.sort_unstable_by_key(|&(j, _)| j);
                entries
            })
            .collect();

        let embeddings = Self::build_embedding_matrix(&concepts, embedding_map)?;

        info!(
            concepts = n,
            dimension = embeddings.ncols(),
            lists = seed_lists.len(),
            "built concept store"
        );

        Ok(Self {
            concepts,
            index,
            freq,
            co,
            embeddings,
        })
    }

    fn build_embedding_matrix(
        concepts: &[String],
        embedding_map: &HashMap<String, Vec<f64>>,
    ) -> Result<Array2<f64>, StoreError> {
        let first = concepts
            .first()
            .and_then(|c| embedding_map.get(c))
            .ok_or_else(|| StoreError::MissingEmbedding(concepts[0].clone()))?;
        let dim = first.len();

        let mut flat = Vec::with_capacity(concepts.len() * dim);
        for concept in concepts {
            let raw = embedding_map
                .get(concept)
                .ok_or_else(|| StoreError::MissingEmbedding(concept.clone()))?;

            if raw.len() != dim {
                return Err(StoreError::InvalidEmbedding {
                    concept: concept.clone(),
                    reason: format!("dimension {} does not match store dimension {dim}", raw.len()),
                });
            }
            if raw.iter().any(|v| !v.is_finite()) {
                return Err(StoreError::InvalidEmbedding {
                    concept: concept.clone(),
                    reason: "non-finite component".to_string(),
                });
            }

            let norm = raw.iter().map(|v| v * v).sum::<f64>().sqrt();
            if norm == 0.0 {
                return Err(StoreError::InvalidEmbedding {
                    concept: concept.clone(),
                    reason: "zero norm".to_string(),
                });
            }
            flat.extend(raw.iter().map(|v| v / norm));
        }

        let matrix = Array2::from_shape_vec((concepts.len(), dim), flat)
            .expect("flat embedding buffer matches (n, dim)");
        Ok(matrix)
    }

    /// Number of distinct concepts.
    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    /// True when the store holds no concepts. Never the case after `build`.
    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    /// Embedding dimension.
    pub fn dimension(&self) -> usize {
        self.embeddings.ncols()
    }

    /// All concepts in store order.
    pub fn concepts(&self) -> &[String] {
        &self.concepts
    }

    /// Concept string at a store index.
    pub fn concept(&self, idx: usize) -> &str {
        &self.concepts[idx]
    }

    /// Store index of a concept, if present.
    pub fn concept_index(&self, concept: &str) -> Option<usize> {
        self.index.get(concept).copied()
    }

    /// Number of seed lists containing the concept at `idx`.
    pub fn freq(&self, idx: usize) -> u64 {
        self.freq[idx]
    }

    /// Frequency table over all concepts, in store order.
    pub fn frequencies(&self) -> &[u64] {
        &self.freq
    }

    /// Co-occurrence count between two concepts. Zero on the diagonal.
    pub fn co(&self, a: usize, b: usize) -> u32 {
        self.co[a]
            .binary_search_by_key(&b, |&(j, _)| j)
            .map(|pos| self.co[a][pos].1)
            .unwrap_or(0)
    }

    /// Sum of co-occurrence counts with every member of `members`, as a dense
    /// vector over all concepts.
    ///
    /// Runs in time proportional to `|members|` times the average row nnz.
    pub fn co_sum_with(&self, members: &[usize]) -> Vec<f64> {
        let mut sums = vec![0.0; self.concepts.len()];
        for &m in members {
            for &(j, count) in &self.co[m] {
                sums[j] += f64::from(count);
            }
        }
        sums
    }

    /// Unit-normalized embedding of the concept at `idx`.
    pub fn embedding(&self, idx: usize) -> ArrayView1<'_, f64> {
        self.embeddings.row(idx)
    }

    /// The full normalized embedding matrix, one row per concept.
    pub fn embeddings(&self) -> &Array2<f64> {
        &self.embeddings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed_lists() -> Vec<Vec<String>> {
        vec![
            vec!["a".into(), "b".into()],
            vec!["a".into(), "b".into(), "c".into()],
            vec!["c".into()],
        ]
    }

    fn embedding_map(dim: usize) -> HashMap<String, Vec<f64>> {
        let mut map = HashMap::new();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            let mut v = vec![0.0; dim];
            v[i] = 2.0; // non-unit on purpose; build must normalize
            map.insert(name.to_string(), v);
        }
        map
    }

    #[test]
    fn builds_with_first_seen_order() {
        let store = ConceptStore::build(&seed_lists(), &embedding_map(3)).unwrap();
        assert_eq!(store.concepts(), &["a", "b", "c"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn frequencies_count_containing_lists() {
        let store = ConceptStore::build(&seed_lists(), &embedding_map(3)).unwrap();
        assert_eq!(store.freq(store.concept_index("a").unwrap()), 2);
        assert_eq!(store.freq(store.concept_index("c").unwrap()), 2);
    }

    #[test]
    fn co_occurrence_is_symmetric_with_zero_diagonal() {
        let store = ConceptStore::build(&seed_lists(), &embedding_map(3)).unwrap();
        let a = store.concept_index("a").unwrap();
        let b = store.concept_index("b").unwrap();
        let c = store.concept_index("c").unwrap();

        assert_eq!(store.co(a, b), 2);
        assert_eq!(store.co(b, a), 2);
        assert_eq!(store.co(a, c), 1);
        assert_eq!(store.co(a, a), 0);
        assert_eq!(store.co(b, c), 1);
    }

    #[test]
    fn duplicate_entries_within_a_list_count_once() {
        let lists = vec![vec!["a".into(), "a".into(), "b".into()]];
        let store = ConceptStore::build(&lists, &embedding_map(3)).unwrap();
        let a = store.concept_index("a").unwrap();
        let b = store.concept_index("b").unwrap();
        assert_eq!(store.freq(a), 1);
        assert_eq!(store.co(a, b), 1);
    }

    #[test]
    fn co_sum_matches_pairwise_lookups() {
        let store = ConceptStore::build(&seed_lists(), &embedding_map(3)).unwrap();
        let a = store.concept_index("a").unwrap();
        let b = store.concept_index("b").unwrap();

        let sums = store.co_sum_with(&[a, b]);
        for j in 0..store.len() {
            let expected = f64::from(store.co(a, j)) + f64::from(store.co(b, j));
            assert_eq!(sums[j], expected);
        }
    }

    #[test]
    fn embeddings_are_normalized_at_build() {
        let store = ConceptStore::build(&seed_lists(), &embedding_map(3)).unwrap();
        for i in 0..store.len() {
            let norm = store.embedding(i).dot(&store.embedding(i)).sqrt();
            assert!((norm - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn missing_embedding_fails() {
        let mut map = embedding_map(3);
        map.remove("b");
        let err = ConceptStore::build(&seed_lists(), &map).unwrap_err();
        assert!(matches!(err, StoreError::MissingEmbedding(c) if c == "b"));
    }

    #[test]
    fn zero_norm_embedding_fails() {
        let mut map = embedding_map(3);
        map.insert("c".to_string(), vec![0.0, 0.0, 0.0]);
        let err = ConceptStore::build(&seed_lists(), &map).unwrap_err();
        assert!(matches!(err, StoreError::InvalidEmbedding { concept, .. } if concept == "c"));
    }

    #[test]
    fn dimension_mismatch_fails() {
        let mut map = embedding_map(3);
        map.insert("c".to_string(), vec![1.0, 0.0]);
        let err = ConceptStore::build(&seed_lists(), &map).unwrap_err();
        assert!(matches!(err, StoreError::InvalidEmbedding { .. }));
    }

    #[test]
    fn empty_seed_lists_fail() {
        let err = ConceptStore::build(&[], &embedding_map(3)).unwrap_err();
        assert!(matches!(err, StoreError::EmptySeedLists));
    }
}
