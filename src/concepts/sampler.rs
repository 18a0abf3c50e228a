//! Temperature-controlled combinatorial sampler over the concept store.

use ndarray::Array1;
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::error::SamplerError;

use super::{ConceptIndex, ConceptStore};

/// Stochastic sampler that draws k-tuples of distinct concepts.
///
/// Each extension step scores every unused candidate as the sum of its
/// co-occurrence counts with the current tuple and its cosine similarity
/// against the tuple's centroid embedding, then draws from the softmax of
/// those scores at temperature `tau`. Low `tau` concentrates mass on the
/// argmax; high `tau` approaches a uniform draw over unused concepts.
#[derive(Debug, Clone)]
pub struct ConceptSampler<'a> {
    store: &'a ConceptStore,
    index: ConceptIndex,
    /// Random seed for reproducibility (None = non-deterministic).
    seed: Option<u64>,
}

impl<'a> ConceptSampler<'a> {
    /// Creates a sampler over the given store.
    pub fn new(store: &'a ConceptStore) -> Self {
        Self {
            store,
            index: ConceptIndex::new(store),
            seed: None,
        }
    }

    /// Sets a random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Samples one tuple of `k` distinct concepts.
    ///
    /// When `seed_concept` is supplied it becomes position 0; otherwise the
    /// first concept is drawn from the frequency distribution. A fresh RNG is
    /// created from the configured seed, so repeated calls with the same seed
    /// return the same tuple.
    pub fn sample(
        &self,
        k: usize,
        tau: f64,
        seed_concept: Option<&str>,
    ) -> Result<Vec<String>, SamplerError> {
        let mut rng = self.create_rng();
        self.sample_with_rng(k, tau, seed_concept, &mut rng)
    }

    /// Samples `n` tuples from a single RNG stream.
    pub fn sample_batch(
        &self,
        n: usize,
        k: usize,
        tau: f64,
    ) -> Result<Vec<Vec<String>>, SamplerError> {
        let mut rng = self.create_rng();
        (0..n)
            .map(|_| self.sample_with_rng(k, tau, None, &mut rng))
            .collect()
    }

    /// Samples one tuple, drawing randomness from the caller's RNG.
    pub fn sample_with_rng(
        &self,
        k: usize,
        tau: f64,
        seed_concept: Option<&str>,
        rng: &mut impl Rng,
    ) -> Result<Vec<String>, SamplerError> {
        if !(tau > 0.0) || !tau.is_finite() {
            return Err(SamplerError::InvalidTemperature(tau));
        }
        if k > self.store.len() {
            return Err(SamplerError::InsufficientConcepts {
                requested: k,
                available: self.store.len(),
            });
        }

        let mut members: Vec<usize> = Vec::with_capacity(k);
        if k == 0 {
            return Ok(Vec::new());
        }

        let first = match seed_concept {
            Some(name) => self
                .store
                .concept_index(name)
                .ok_or_else(|| SamplerError::UnknownSeedConcept(name.to_string()))?,
            None => self.draw_seed(rng)?,
        };
        members.push(first);

        while members.len() < k {
            let scores = self.candidate_scores(&members)?;
            let next = self.draw_extension(&members, &scores, tau, rng)?;
            members.push(next);
        }

        debug!(k, tau, "sampled concept tuple");
        Ok(members
            .into_iter()
            .map(|i| self.store.concept(i).to_string())
            .collect())
    }

    /// Scores every concept as a candidate extension of `members`.
    ///
    /// The score is the sparse co-occurrence sum with the tuple plus the
    /// cosine of the concept against the tuple's centroid embedding. Scores
    /// for concepts already in the tuple are still computed; masking happens
    /// at draw time.
    pub fn candidate_scores(&self, members: &[usize]) -> Result<Vec<f64>, SamplerError> {
        let mut scores = self.store.co_sum_with(members);

        let mut centroid = Array1::zeros(self.store.dimension());
        for &m in members {
            centroid += &self.store.embedding(m);
        }
        centroid /= members.len() as f64;

        let sims = self.index.similarities(centroid.view())?;
        for (score, sim) in scores.iter_mut().zip(sims.iter()) {
            *score += sim;
        }

        if scores.iter().any(|s| s.is_nan()) {
            return Err(SamplerError::InvalidEmbedding(
                "NaN candidate score".to_string(),
            ));
        }
        Ok(scores)
    }

    fn draw_seed(&self, rng: &mut impl Rng) -> Result<usize, SamplerError> {
        let dist = WeightedIndex::new(self.store.frequencies().iter().copied())
            .map_err(|e| SamplerError::InvalidEmbedding(e.to_string()))?;
        Ok(dist.sample(rng))
    }

    fn draw_extension(
        &self,
        members: &[usize],
        scores: &[f64],
        tau: f64,
        rng: &mut impl Rng,
    ) -> Result<usize, SamplerError> {
        // Max-subtraction keeps exp() in range at low temperatures.
        let max_unused = scores
            .iter()
            .enumerate()
            .filter(|(i, _)| !members.contains(i))
            .map(|(_, &s)| s)
            .fold(f64::NEG_INFINITY, f64::max);
        if max_unused == f64::NEG_INFINITY {
            return Err(SamplerError::InsufficientConcepts {
                requested: members.len() + 1,
                available: members.len(),
            });
        }

        let weights: Vec<f64> = scores
            .iter()
            .enumerate()
            .map(|(i, &s)| {
                if members.contains(&i) {
                    0.0
                } else {
                    ((s - max_unused) / tau).exp()
                }
            })
            .collect();

        let dist = WeightedIndex::new(&weights)
            .map_err(|e| SamplerError::InvalidEmbedding(e.to_string()))?;
        Ok(dist.sample(rng))
    }

    fn create_rng(&self) -> ChaCha8Rng {
        match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Store with freq {A:10, B:9, C:5, D:1}, co(A,B)=5, co(B,C)=4, and
    /// orthonormal embeddings. D is isolated from everything.
    fn scenario_store() -> ConceptStore {
        let mut lists: Vec<Vec<String>> = Vec::new();
        for _ in 0..5 {
            lists.push(vec!["A".into(), "B".into()]);
        }
        for _ in 0..4 {
            lists.push(vec!["B".into(), "C".into()]);
        }
        for _ in 0..5 {
            lists.push(vec!["A".into()]);
        }
        lists.push(vec!["C".into()]);
        lists.push(vec!["D".into()]);

        let mut map = HashMap::new();
        for (i, name) in ["A", "B", "C", "D"].iter().enumerate() {
            let mut v = vec![0.0; 4];
            v[i] = 1.0;
            map.insert(name.to_string(), v);
        }
        ConceptStore::build(&lists, &map).unwrap()
    }

    #[test]
    fn greedy_regime_follows_cooccurrence() {
        let store = scenario_store();
        let sampler = ConceptSampler::new(&store).with_seed(7);

        // B wins step 2 on co(A,B)=5; C wins step 3 on co(B,C)=4 since D is
        // isolated and the embeddings are orthogonal.
        let tuple = sampler.sample(3, 0.01, Some("A")).unwrap();
        assert_eq!(tuple, vec!["A", "B", "C"]);
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let store = scenario_store();
        let sampler = ConceptSampler::new(&store).with_seed(42);

        let t1 = sampler.sample(4, 1.0, None).unwrap();
        let t2 = sampler.sample(4, 1.0, None).unwrap();
        assert_eq!(t1, t2);
    }

    #[test]
    fn tuples_are_distinct_and_seed_leads() {
        let store = scenario_store();
        let sampler = ConceptSampler::new(&store).with_seed(3);

        for k in 1..=4 {
            let tuple = sampler.sample(k, 2.0, Some("C")).unwrap();
            assert_eq!(tuple.len(), k);
            assert_eq!(tuple[0], "C");
            let unique: std::collections::HashSet<_> = tuple.iter().collect();
            assert_eq!(unique.len(), k);
            for c in &tuple {
                assert!(store.concept_index(c).is_some());
            }
        }
    }

    #[test]
    fn high_temperature_approaches_uniform() {
        let store = scenario_store();
        let sampler = ConceptSampler::new(&store).with_seed(11);
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        let trials = 10_000;
        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..trials {
            let tuple = sampler.sample_with_rng(2, 100.0, Some("A"), &mut rng).unwrap();
            *counts.entry(tuple[1].clone()).or_insert(0) += 1;
        }

        for name in ["B", "C", "D"] {
            let p = *counts.get(name).unwrap_or(&0) as f64 / trials as f64;
            assert!(
                (p - 1.0 / 3.0).abs() < 0.05,
                "position 1 = {name} with empirical probability {p}"
            );
        }
    }

    #[test]
    fn oversized_tuple_fails() {
        let store = scenario_store();
        let sampler = ConceptSampler::new(&store).with_seed(1);
        assert!(matches!(
            sampler.sample(5, 1.0, None),
            Err(SamplerError::InsufficientConcepts { requested: 5, available: 4 })
        ));
    }

    #[test]
    fn unknown_seed_concept_fails() {
        let store = scenario_store();
        let sampler = ConceptSampler::new(&store).with_seed(1);
        assert!(matches!(
            sampler.sample(2, 1.0, Some("Z")),
            Err(SamplerError::UnknownSeedConcept(c)) if c == "Z"
        ));
    }

    #[test]
    fn non_positive_temperature_fails() {
        let store = scenario_store();
        let sampler = ConceptSampler::new(&store).with_seed(1);
        assert!(matches!(
            sampler.sample(2, 0.0, None),
            Err(SamplerError::InvalidTemperature(_))
        ));
        assert!(matches!(
            sampler.sample(2, -1.0, None),
            Err(SamplerError::InvalidTemperature(_))
        ));
    }

    /// Slow pairwise-sum scoring, the historical form of the extension step.
    /// For orthonormal member embeddings the centroid cosine equals the
    /// pairwise cosine sum divided by sqrt(|members|), so the two forms agree
    /// up to a constant positive scale on the similarity term.
    fn pairwise_oracle_scores(store: &ConceptStore, members: &[usize]) -> Vec<f64> {
        let mut scores = store.co_sum_with(members);
        for (c, score) in scores.iter_mut().enumerate() {
            for &m in members {
                *score += store.embedding(c).dot(&store.embedding(m));
            }
        }
        scores
    }

    #[test]
    fn centroid_scores_match_pairwise_oracle_on_orthonormal_embeddings() {
        let store = scenario_store();
        let sampler = ConceptSampler::new(&store);
        let members = vec![
            store.concept_index("A").unwrap(),
            store.concept_index("B").unwrap(),
        ];

        let canonical = sampler.candidate_scores(&members).unwrap();
        let oracle = pairwise_oracle_scores(&store, &members);
        let co = store.co_sum_with(&members);

        let scale = (members.len() as f64).sqrt();
        for c in 0..store.len() {
            let canonical_sim = canonical[c] - co[c];
            let oracle_sim = oracle[c] - co[c];
            assert!(
                (canonical_sim * scale - oracle_sim).abs() < 1e-9,
                "similarity terms diverge at concept {c}"
            );
        }
    }
}
