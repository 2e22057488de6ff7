//! Reciprocal Rank Fusion over ranked candidate lists.
//!
//! RRF merges lists that score on incomparable scales (cosine similarity vs
//! term-weight scores) by rewarding rank position instead of raw score: a
//! document at zero-based rank `r` in a list contributes
//! `weight / (K + r + 1)` to its cumulative score. A document that ranks
//! highly in only one list can therefore outrank one that appears low in
//! both, which is the intended behavior.

use std::collections::HashMap;

use tracing::warn;

use crate::document::Document;

/// Smoothing constant from the RRF literature; dampens the dominance of the
/// very top ranks.
pub const RRF_K: f32 = 60.0;

/// One ranked candidate list entering fusion, best first.
#[derive(Debug, Clone, Copy)]
pub struct RankedList<'a> {
    pub documents: &'a [Document],
    pub weight: f32,
}

impl<'a> RankedList<'a> {
    /// A list with the default weight of 1.0, so vector and lexical signals
    /// count equally.
    pub fn new(documents: &'a [Document]) -> Self {
        Self {
            documents,
            weight: 1.0,
        }
    }

    pub fn weighted(documents: &'a [Document], weight: f32) -> Self {
        Self { documents, weight }
    }
}

/// Fuse ranked lists into a single list of at most `k` documents.
///
/// Documents are identified by id; one appearing in several lists
/// accumulates a contribution from each. Ties on the fused score preserve
/// first-encounter order across the input lists. Documents with an empty id
/// cannot be deduplicated and are skipped rather than failing the fusion.
///
/// A single input list is the degenerate case and simply passes through in
/// rank order (truncated to `k`).
pub fn reciprocal_rank_fusion(
    lists: &[RankedList<'_>],
    k: usize,
) -> Vec<Document> {
    // Entries keep first-encounter order; the stable sort below preserves
    // it for equal scores.
    let mut entries: Vec<(Document, f32)> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();

    for list in lists {
        for (rank, document) in list.documents.iter().enumerate() {
            if document.id.is_empty() {
                warn!(rank, "skipping candidate with empty document id");
                continue;
            }

            let contribution = list.weight / (RRF_K + rank as f32 + 1.0);
            match index_of.get(&document.id) {
                Some(&i) => entries[i].1 += contribution,
                None => {
                    index_of.insert(document.id.clone(), entries.len());
                    entries.push((document.clone(), contribution));
                }
            }
        }
    }

    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal)
    });
    entries.truncate(k);
    entries.into_iter().map(|(document, _)| document).collect()
}
