//! Traits for the external model collaborators.
//!
//! The retrieval core never owns a model. The host application constructs
//! whatever embedding and reranking backends it uses, wraps them in these
//! traits, and passes them in at engine construction. Implementations map
//! their own failures to [`Error::Upstream`](crate::Error::Upstream); the
//! core propagates those without retrying or caching, since retry policy for
//! a model call belongs to the caller.

use crate::error::{Error, Result};

/// Produces fixed-dimension, unit-normalized embeddings.
///
/// The dimension is discovered once and fixed for the lifetime of every
/// collection created through the engine. Output vectors must be L2
/// normalized by the provider; the vector index deliberately does not
/// re-normalize.
pub trait EmbeddingProvider: Send + Sync {
    /// Embedding dimension, constant for this provider's lifetime.
    fn dimension(&self) -> usize;

    /// Embed a batch of texts: one vector per input, in input order.
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed(std::slice::from_ref(&text.to_string()))?;
        out.pop()
            .ok_or_else(|| Error::Upstream("provider returned no embedding".into()))
    }
}

/// Pairwise relevance scorer joining a query with each candidate text.
///
/// Used as a refinement stage downstream of hybrid retrieval, never inside
/// it, so implementations can be swapped without touching retrieval logic.
pub trait Reranker: Send + Sync {
    /// Score `(query, text)` pairs; the result has the same length and order
    /// as `texts`.
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>>;
}
