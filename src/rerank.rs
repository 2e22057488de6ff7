use crate::{
    document::Document,
    error::{Error, Result},
    provider::Reranker,
};

/// A candidate document with its reranker relevance score.
#[derive(Debug, Clone)]
pub struct RankedDocument {
    pub document: Document,
    pub score: f32,
}

/// Refine fused candidates with a pairwise reranker, keeping the top `n`.
///
/// This stage consumes the retrieval pipeline's output; it never feeds back
/// into fusion. Empty candidate sets short-circuit without calling the
/// reranker.
pub fn rerank_top_n(
    reranker: &dyn Reranker,
    query: &str,
    candidates: Vec<Document>,
    n: usize,
) -> Result<Vec<RankedDocument>> {
    if candidates.is_empty() || n == 0 {
        return Ok(Vec::new());
    }

    let texts: Vec<String> =
        candidates.iter().map(|d| d.text.clone()).collect();
    let scores = reranker.score_pairs(query, &texts)?;
    if scores.len() != candidates.len() {
        return Err(Error::Upstream(format!(
            "reranker returned {} scores for {} candidates",
            scores.len(),
            candidates.len()
        )));
    }

    let mut ranked: Vec<RankedDocument> = candidates
        .into_iter()
        .zip(scores)
        .map(|(document, score)| RankedDocument { document, score })
        .collect();

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(n);
    Ok(ranked)
}
