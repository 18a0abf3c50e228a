//! Concept store, nearest-neighbor index, and combinatorial sampler.
//!
//! A concept is a named foundational skill used as a building block for
//! synthesized problems. The store holds per-concept frequencies, pairwise
//! co-occurrence counts, and unit-normalized embeddings built once from seed
//! concept lists; the sampler draws k-tuples of distinct concepts that
//! co-occur in seed data and cluster in embedding space.

mod index;
mod sampler;
mod store;

pub use index::ConceptIndex;
pub use sampler::ConceptSampler;
pub use store::ConceptStore;
