//! clinote - hybrid retrieval over per-patient clinical note collections.
//!
//! Each patient id maps to a collection: an ordered list of notes, a dense
//! vector index over their embeddings, and a BM25-style lexical index over
//! their texts. A search queries both indexes, merges the ranked candidates
//! with Reciprocal Rank Fusion, and hands the fused top-k to an optional
//! pairwise reranking stage.
//!
//! The embedding model and the reranker are injected through the
//! [`EmbeddingProvider`] and [`Reranker`] traits; the crate never owns a
//! model.
//!
//! # Quick start
//!
//! ```
//! use std::sync::Arc;
//!
//! use clinote::{Document, EmbeddingProvider, Result, RetrievalEngine};
//!
//! // A stand-in provider; real applications wrap an embedding model.
//! struct ConstantEmbedder;
//!
//! impl EmbeddingProvider for ConstantEmbedder {
//!     fn dimension(&self) -> usize {
//!         1
//!     }
//!     fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
//!         Ok(texts.iter().map(|_| vec![1.0]).collect())
//!     }
//! }
//!
//! let dir = tempfile::tempdir().unwrap();
//! let engine = RetrievalEngine::open(dir.path(), Arc::new(ConstantEmbedder)).unwrap();
//!
//! let added = engine
//!     .upsert(
//!         "p1",
//!         vec![
//!             Document::new("s1", "dor lombar intensa"),
//!             Document::new("s2", "ombro recuperado"),
//!         ],
//!     )
//!     .unwrap();
//! assert_eq!(added, 2);
//!
//! let hits = engine.search_hybrid("p1", "dor nas costas", 1).unwrap();
//! assert_eq!(hits[0].id, "s1");
//! ```

pub mod document;
pub mod engine;
pub mod error;
pub mod fusion;
pub mod lexical;
pub mod provider;
pub mod rerank;
pub mod store;
pub mod tokenize;
pub mod vector;

pub use document::Document;
pub use engine::RetrievalEngine;
pub use error::{Error, Result};
pub use lexical::LexicalIndex;
pub use provider::{EmbeddingProvider, Reranker};
pub use rerank::{RankedDocument, rerank_top_n};
pub use store::{Collection, CollectionStats, CollectionStore};
pub use vector::VectorIndex;
