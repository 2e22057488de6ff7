use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// BM25 k1: how quickly repeated terms saturate.
const K1: f32 = 1.2;
/// BM25 b: strength of document-length normalization.
const B: f32 = 0.75;

/// Term-statistics index over a fixed corpus.
///
/// A `LexicalIndex` is a snapshot: it is a pure function of the corpus it was
/// built from and offers no incremental updates. Reflecting a corpus change
/// means rebuilding from scratch, an O(corpus size) cost paid on every write.
///
/// Scoring uses the BM25 weighting scheme: rare terms (high inverse document
/// frequency) that occur often in a document score highest, with term
/// frequency saturating via `K1` and long documents discounted via `B`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LexicalIndex {
    /// Term frequency per corpus position.
    term_freqs: Vec<BTreeMap<String, u32>>,
    /// Number of corpus documents containing each term.
    doc_freq: BTreeMap<String, u32>,
    /// Token count per corpus position.
    doc_lens: Vec<u32>,
    avg_doc_len: f32,
}

impl LexicalIndex {
    /// Build an index from the corpus, in order. Entry `i` of every internal
    /// table corresponds to `corpus[i]`.
    pub fn build(corpus: &[&str]) -> Self {
        let mut term_freqs = Vec::with_capacity(corpus.len());
        let mut doc_freq: BTreeMap<String, u32> = BTreeMap::new();
        let mut doc_lens = Vec::with_capacity(corpus.len());

        for text in corpus {
            let terms = crate::tokenize::tokenize(text);
            doc_lens.push(terms.len() as u32);

            let mut freqs: BTreeMap<String, u32> = BTreeMap::new();
            for term in terms {
                *freqs.entry(term).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_insert(0) += 1;
            }
            term_freqs.push(freqs);
        }

        let total: u64 = doc_lens.iter().map(|&l| u64::from(l)).sum();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            total as f32 / doc_lens.len() as f32
        };

        Self {
            term_freqs,
            doc_freq,
            doc_lens,
            avg_doc_len,
        }
    }

    /// Number of documents the index was built over.
    pub fn corpus_size(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Score the query against every corpus position.
    ///
    /// Returns one score per position, in corpus order; documents containing
    /// none of the query terms score 0. An empty corpus yields an empty
    /// vector, never an error.
    pub fn score(&self, query_terms: &[String]) -> Vec<f32> {
        let n = self.corpus_size();
        let mut scores = vec![0.0f32; n];
        if n == 0 {
            return scores;
        }

        for term in query_terms {
            let Some(&df) = self.doc_freq.get(term) else {
                continue;
            };
            let idf =
                ((n as f32 - df as f32 + 0.5) / (df as f32 + 0.5) + 1.0).ln();

            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let Some(&tf) = freqs.get(term) else {
                    continue;
                };
                let tf = tf as f32;
                let len_norm = 1.0 - B
                    + B * self.doc_lens[i] as f32 / self.avg_doc_len;
                scores[i] += idf * tf * (K1 + 1.0) / (tf + K1 * len_norm);
            }
        }

        scores
    }

    /// Top `k` corpus positions by score, descending, matching positions
    /// only (zero-score documents are never candidates). Ties keep corpus
    /// order.
    pub fn top_k(&self, query_terms: &[String], k: usize) -> Vec<(usize, f32)> {
        let mut hits: Vec<(usize, f32)> = self
            .score(query_terms)
            .into_iter()
            .enumerate()
            .filter(|&(_, score)| score > 0.0)
            .collect();
        hits.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);
        hits
    }
}
