//! Deterministic model stand-ins shared by the integration tests.

use clinote::{EmbeddingProvider, Error, Reranker, Result};

/// Bag-of-words embedder over a fixed vocabulary: one dimension per word,
/// L2-normalized counts, out-of-vocabulary tokens ignored. Texts sharing
/// vocabulary words have positive inner product; disjoint texts score
/// exactly zero, which makes ranking assertions exact.
pub struct VocabEmbedder {
    vocab: Vec<String>,
}

impl VocabEmbedder {
    pub fn new(vocab: &[&str]) -> Self {
        Self {
            vocab: vocab.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// The vocabulary every test in this suite draws from.
    pub fn clinical() -> Self {
        Self::new(&[
            "dor", "lombar", "intensa", "ombro", "recuperado", "nas",
            "costas", "joelho", "estavel", "sem", "edema", "evolucao",
            "tratamento", "fisioterapia", "cervical", "alivio",
        ])
    }
}

impl EmbeddingProvider for VocabEmbedder {
    fn dimension(&self) -> usize {
        self.vocab.len()
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut v = vec![0.0f32; self.vocab.len()];
                for term in clinote::tokenize::tokenize(text) {
                    if let Some(i) =
                        self.vocab.iter().position(|w| *w == term)
                    {
                        v[i] += 1.0;
                    }
                }
                let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    for x in &mut v {
                        *x /= norm;
                    }
                }
                v
            })
            .collect())
    }
}

/// Embedder that always fails, for upstream-error propagation tests.
pub struct FailingEmbedder {
    pub dimension: usize,
}

impl EmbeddingProvider for FailingEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(Error::Upstream("model backend unavailable".into()))
    }
}

/// Reranker scoring each candidate by shared-token count with the query.
pub struct OverlapReranker;

impl Reranker for OverlapReranker {
    fn score_pairs(&self, query: &str, texts: &[String]) -> Result<Vec<f32>> {
        let query_terms = clinote::tokenize::tokenize(query);
        Ok(texts
            .iter()
            .map(|text| {
                let terms = clinote::tokenize::tokenize(text);
                query_terms.iter().filter(|t| terms.contains(t)).count()
                    as f32
            })
            .collect())
    }
}
