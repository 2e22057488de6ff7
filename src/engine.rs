//! The hybrid retrieval pipeline.
//!
//! `RetrievalEngine` ties the collection store to an injected embedding
//! provider and exposes the public operations: `upsert`, `search_hybrid`,
//! `reset`, `stats`, and the rerank-composed `retrieve`.
//!
//! Writes are serialized per collection: an upsert is a full
//! load -> mutate -> save transaction under a per-collection mutex, because
//! two interleaved cycles would silently discard one writer's documents.
//! Searches take no lock; they are snapshot reads of whatever state is
//! durable and may observe either side of a racing upsert, never a torn
//! mixture.

use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
};

use tracing::debug;

use crate::{
    document::Document,
    error::{Error, Result},
    fusion::{RankedList, reciprocal_rank_fusion},
    lexical::LexicalIndex,
    provider::{EmbeddingProvider, Reranker},
    rerank::{RankedDocument, rerank_top_n},
    store::{CollectionStats, CollectionStore},
    tokenize::{clean_text, tokenize},
};

pub struct RetrievalEngine {
    store: CollectionStore,
    embedder: Arc<dyn EmbeddingProvider>,
    upsert_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RetrievalEngine {
    /// Open an engine rooted at `root`. The store is sized to the provider's
    /// embedding dimension, which stays fixed for every collection.
    pub fn open(root: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let store = CollectionStore::open(root, embedder.dimension())?;
        Ok(Self::with_store(store, embedder))
    }

    pub fn with_store(
        store: CollectionStore,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        Self {
            store,
            embedder,
            upsert_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &CollectionStore {
        &self.store
    }

    /// Append documents to a collection, creating it on first use.
    ///
    /// Note text is whitespace-normalized, then embedded and appended to the
    /// vector index and document list; the lexical index is rebuilt over the
    /// entire updated corpus (term statistics are a pure function of the
    /// corpus, so a full rebuild is the only way to reflect the change) and
    /// the collection saved atomically. Returns the number of documents
    /// added; an empty batch is a no-op returning 0.
    pub fn upsert(
        &self,
        collection_id: &str,
        mut documents: Vec<Document>,
    ) -> Result<usize> {
        if documents.is_empty() {
            return Ok(0);
        }
        for document in &mut documents {
            if document.id.is_empty() {
                return Err(Error::InvalidInput(
                    "document id must not be empty".into(),
                ));
            }
            document.text = clean_text(&document.text);
        }

        let lock = self.collection_lock(collection_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut collection = self.store.load(collection_id)?;

        let texts: Vec<String> =
            documents.iter().map(|d| d.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts)?;
        if embeddings.len() != documents.len() {
            return Err(Error::Upstream(format!(
                "provider returned {} embeddings for {} texts",
                embeddings.len(),
                documents.len()
            )));
        }

        // Dimension mismatches are rejected here, before any save.
        collection.vectors.add(&embeddings)?;
        let added = documents.len();
        collection.documents.extend(documents);

        let corpus: Vec<&str> = collection
            .documents
            .iter()
            .map(|d| d.text.as_str())
            .collect();
        collection.lexical = LexicalIndex::build(&corpus);

        self.store.save(collection_id, &collection)?;
        debug!(
            collection = collection_id,
            added,
            total = collection.documents.len(),
            "upsert complete"
        );
        Ok(added)
    }

    /// Hybrid search: dual index query, RRF fusion, top `k` documents.
    ///
    /// An absent collection returns an empty result immediately; it means
    /// "no context available", not an error. Both indexes are queried with
    /// an oversampled candidate count (`2k`, capped at the corpus size) so
    /// fusion has enough overlap to be meaningful.
    pub fn search_hybrid(
        &self,
        collection_id: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<Document>> {
        if k == 0 || !self.store.exists(collection_id)? {
            return Ok(Vec::new());
        }

        let collection = self.store.load(collection_id)?;
        if collection.documents.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed_one(query)?;
        let query_terms = tokenize(query);

        let oversample = (2 * k).min(collection.documents.len());
        let vector_hits =
            collection.vectors.search(&query_vector, oversample)?;
        let lexical_hits = collection.lexical.top_k(&query_terms, oversample);

        let vector_ranked =
            resolve_positions(&collection.documents, &vector_hits);
        let lexical_ranked =
            resolve_positions(&collection.documents, &lexical_hits);

        let fused = reciprocal_rank_fusion(
            &[
                RankedList::new(&vector_ranked),
                RankedList::new(&lexical_ranked),
            ],
            k,
        );
        debug!(
            collection = collection_id,
            vector_candidates = vector_ranked.len(),
            lexical_candidates = lexical_ranked.len(),
            fused = fused.len(),
            "hybrid search complete"
        );
        Ok(fused)
    }

    /// Hybrid search followed by the pairwise rerank stage: the `k` fused
    /// candidates are scored against the query and the top `top_n` kept.
    pub fn retrieve(
        &self,
        collection_id: &str,
        query: &str,
        k: usize,
        top_n: usize,
        reranker: &dyn Reranker,
    ) -> Result<Vec<RankedDocument>> {
        let candidates = self.search_hybrid(collection_id, query, k)?;
        rerank_top_n(reranker, query, candidates, top_n)
    }

    /// Remove every persisted artifact for the collection. Idempotent.
    pub fn reset(&self, collection_id: &str) -> Result<Vec<std::path::PathBuf>> {
        let lock = self.collection_lock(collection_id);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.store.reset(collection_id)
    }

    /// Size counters for a collection; zeros when absent.
    pub fn stats(&self, collection_id: &str) -> Result<CollectionStats> {
        self.store.stats(collection_id)
    }

    fn collection_lock(&self, collection_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .upsert_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks
            .entry(collection_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

impl std::fmt::Debug for RetrievalEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalEngine")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Map index positions back to their same-ordinal documents. Positions
/// outside the list (which would indicate a broken invariant) are dropped
/// rather than panicking.
fn resolve_positions(
    documents: &[Document],
    hits: &[(usize, f32)],
) -> Vec<Document> {
    hits.iter()
        .filter_map(|&(position, _)| documents.get(position).cloned())
        .collect()
}
