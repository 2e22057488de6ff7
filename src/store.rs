//! Durable persistence for collections.
//!
//! A collection persists as one artifact under the store root,
//! `{id}.collection.bin`, holding its three logical sections:
//!
//! - the ordered document list (JSON)
//! - the lexical index statistics (JSON)
//! - the vector index blob (binary)
//!
//! The sections must always change together, so a save stages the whole
//! artifact to a temp file in the same directory and renames it into place
//! in one atomic step. A reader concurrent with a save sees either the
//! previous save's triple or the new one, never a mixture, and a crash
//! mid-save leaves the previous artifact intact. `load` verifies that the
//! sections agree on the document count and refuses to proceed on mismatch.

use std::{
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{
    document::Document,
    error::{Error, Result},
    lexical::LexicalIndex,
    vector::VectorIndex,
};

pub const DATA_DIR_ENV_VAR: &str = "CLINOTE_DATA_DIR";
const DEFAULT_DATA_DIR: &str = "data";

/// Section header: 4 bytes document-list length + 4 bytes lexical length.
/// The vector blob runs to the end of the artifact and carries its own
/// header.
const SECTION_HEADER_SIZE: usize = 8;

/// The in-memory triple backing one collection.
///
/// Invariant after every completed write:
/// `documents.len() == vectors.count() == lexical.corpus_size()`, with
/// ordinal `i` referring to the same logical document in all three.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection {
    pub documents: Vec<Document>,
    pub vectors: VectorIndex,
    pub lexical: LexicalIndex,
}

impl Collection {
    /// An empty collection sized to the embedding dimension. This is the
    /// expected state for a never-ingested patient, not an error.
    pub fn empty(dimension: usize) -> Self {
        Self {
            documents: Vec::new(),
            vectors: VectorIndex::new(dimension),
            lexical: LexicalIndex::default(),
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.documents.len() == self.vectors.count()
            && self.documents.len() == self.lexical.corpus_size()
    }
}

/// Persisted size counters for one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub documents: usize,
    pub vectors: usize,
}

/// Owns the on-disk layout of all collections.
///
/// The store itself is stateless between calls; every operation is a full
/// load or save of one collection's artifact. Writer serialization is the
/// engine's job, not the store's.
#[derive(Debug)]
pub struct CollectionStore {
    root: PathBuf,
    dimension: usize,
}

impl CollectionStore {
    /// Open a store rooted at `root`, creating the directory if needed.
    /// `dimension` is the embedding dimension new collections are sized to.
    pub fn open(root: &Path, dimension: usize) -> Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            dimension,
        })
    }

    /// Resolve the store root from, in order of priority:
    /// 1. An explicit path
    /// 2. The `CLINOTE_DATA_DIR` environment variable
    /// 3. `./data`
    pub fn resolve(explicit: Option<&Path>, dimension: usize) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var(DATA_DIR_ENV_VAR) {
            PathBuf::from(val)
        } else {
            PathBuf::from(DEFAULT_DATA_DIR)
        };
        Self::open(&root, dimension)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether a persisted artifact exists for the collection.
    pub fn exists(&self, collection_id: &str) -> Result<bool> {
        Ok(self.collection_path(collection_id)?.exists())
    }

    /// Load a collection's triple.
    ///
    /// A collection with no persisted artifact loads as empty. If the
    /// artifact exists but any section fails to parse or the sections
    /// disagree on the document count, the whole load fails with
    /// [`Error::InconsistentState`](crate::Error::InconsistentState) rather
    /// than proceeding with a partial fix.
    pub fn load(&self, collection_id: &str) -> Result<Collection> {
        let path = self.collection_path(collection_id)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Collection::empty(self.dimension));
            }
            Err(e) => return Err(e.into()),
        };

        let collection = decode_collection(&bytes)
            .map_err(|detail| self.inconsistent(collection_id, detail))?;

        if !collection.is_consistent() {
            return Err(self.inconsistent(
                collection_id,
                format!(
                    "artifact sections diverge: {} documents, {} vectors, {} lexical entries",
                    collection.documents.len(),
                    collection.vectors.count(),
                    collection.lexical.corpus_size()
                ),
            ));
        }
        if collection.vectors.dimension() != self.dimension {
            return Err(self.inconsistent(
                collection_id,
                format!(
                    "vector dimension {} does not match store dimension {}",
                    collection.vectors.dimension(),
                    self.dimension
                ),
            ));
        }

        Ok(collection)
    }

    /// Persist a collection's triple.
    ///
    /// The whole artifact is written to a temp file in the store root and
    /// renamed over the target in one step, so the three sections swap as a
    /// unit and a crash mid-save never leaves a half-written artifact
    /// behind.
    pub fn save(&self, collection_id: &str, collection: &Collection) -> Result<()> {
        if !collection.is_consistent() {
            return Err(Error::InvalidInput(format!(
                "refusing to persist inconsistent collection '{collection_id}': \
                 {} documents, {} vectors, {} lexical entries",
                collection.documents.len(),
                collection.vectors.count(),
                collection.lexical.corpus_size()
            )));
        }

        let path = self.collection_path(collection_id)?;
        self.write_atomic(&path, &encode_collection(collection)?)?;

        debug!(
            collection = collection_id,
            documents = collection.documents.len(),
            "collection saved"
        );
        Ok(())
    }

    /// Remove the persisted artifact for the collection.
    ///
    /// Idempotent: resetting an absent collection removes nothing and is not
    /// an error. Returns the paths actually removed.
    pub fn reset(&self, collection_id: &str) -> Result<Vec<PathBuf>> {
        let path = self.collection_path(collection_id)?;
        let removed = match std::fs::remove_file(&path) {
            Ok(()) => vec![path],
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            collection = collection_id,
            removed = removed.len(),
            "collection reset"
        );
        Ok(removed)
    }

    /// Size counters for one collection; zeros when absent.
    pub fn stats(&self, collection_id: &str) -> Result<CollectionStats> {
        let collection = self.load(collection_id)?;
        Ok(CollectionStats {
            documents: collection.documents.len(),
            vectors: collection.vectors.count(),
        })
    }

    fn collection_path(&self, collection_id: &str) -> Result<PathBuf> {
        validate_collection_id(collection_id)?;
        Ok(self.root.join(format!("{collection_id}.collection.bin")))
    }

    fn inconsistent(&self, collection_id: &str, detail: String) -> Error {
        Error::InconsistentState {
            collection: collection_id.to_string(),
            detail,
        }
    }

    fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<()> {
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(bytes)?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// Encode the triple into one artifact: section header, document list,
/// lexical statistics, then the vector blob to the end.
fn encode_collection(collection: &Collection) -> Result<Vec<u8>> {
    let documents = serde_json::to_vec(&collection.documents)?;
    let lexical = serde_json::to_vec(&collection.lexical)?;
    let vectors = collection.vectors.to_bytes();

    let mut out = Vec::with_capacity(
        SECTION_HEADER_SIZE + documents.len() + lexical.len() + vectors.len(),
    );
    out.extend_from_slice(&(documents.len() as u32).to_le_bytes());
    out.extend_from_slice(&(lexical.len() as u32).to_le_bytes());
    out.extend_from_slice(&documents);
    out.extend_from_slice(&lexical);
    out.extend_from_slice(&vectors);
    Ok(out)
}

/// Decode an artifact produced by [`encode_collection`]. The error carries
/// which section was unreadable.
fn decode_collection(bytes: &[u8]) -> std::result::Result<Collection, String> {
    if bytes.len() < SECTION_HEADER_SIZE {
        return Err("artifact is shorter than its section header".to_string());
    }
    let header = |range: std::ops::Range<usize>| -> Option<usize> {
        let raw: [u8; 4] = bytes.get(range)?.try_into().ok()?;
        Some(u32::from_le_bytes(raw) as usize)
    };
    let docs_len = header(0..4)
        .ok_or_else(|| "unreadable section header".to_string())?;
    let lexical_len = header(4..8)
        .ok_or_else(|| "unreadable section header".to_string())?;

    let docs_end = SECTION_HEADER_SIZE + docs_len;
    let lexical_end = docs_end + lexical_len;
    if bytes.len() < lexical_end {
        return Err(format!(
            "artifact is truncated: header claims {lexical_end} bytes of \
             sections, found {}",
            bytes.len()
        ));
    }

    let documents: Vec<Document> =
        serde_json::from_slice(&bytes[SECTION_HEADER_SIZE..docs_end])
            .map_err(|e| format!("document section failed to parse: {e}"))?;
    let lexical: LexicalIndex =
        serde_json::from_slice(&bytes[docs_end..lexical_end])
            .map_err(|e| format!("lexical section failed to parse: {e}"))?;
    let vectors = VectorIndex::from_bytes(&bytes[lexical_end..])
        .ok_or_else(|| "vector section is malformed".to_string())?;

    Ok(Collection {
        documents,
        vectors,
        lexical,
    })
}

/// Collection identifiers become file-name components, so only a
/// conservative character set is accepted.
pub fn validate_collection_id(collection_id: &str) -> Result<()> {
    let valid = !collection_id.is_empty()
        && collection_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_'));
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "collection id '{collection_id}' must be non-empty and contain \
             only ASCII alphanumerics, '-' or '_'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store(dimension: usize) -> (tempfile::TempDir, CollectionStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store = CollectionStore::open(tmp.path(), dimension).unwrap();
        (tmp, store)
    }

    fn sample_collection(dimension: usize) -> Collection {
        let documents = vec![
            Document::new("a", "dor lombar intensa"),
            Document::new("b", "ombro recuperado"),
        ];
        let mut vectors = VectorIndex::new(dimension);
        vectors
            .add(&[vec![1.0, 0.0], vec![0.0, 1.0]])
            .unwrap();
        let corpus: Vec<&str> =
            documents.iter().map(|d| d.text.as_str()).collect();
        let lexical = LexicalIndex::build(&corpus);
        Collection {
            documents,
            vectors,
            lexical,
        }
    }

    fn artifact_path(tmp: &tempfile::TempDir) -> PathBuf {
        tmp.path().join("p1.collection.bin")
    }

    #[test]
    fn absent_collection_loads_empty() {
        let (_tmp, store) = test_store(2);
        let collection = store.load("p1").unwrap();
        assert!(collection.documents.is_empty());
        assert_eq!(collection.vectors.count(), 0);
        assert_eq!(collection.vectors.dimension(), 2);
        assert_eq!(collection.lexical.corpus_size(), 0);
        assert!(!store.exists("p1").unwrap());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let (_tmp, store) = test_store(2);
        let collection = sample_collection(2);
        store.save("p1", &collection).unwrap();

        let loaded = store.load("p1").unwrap();
        assert_eq!(loaded, collection);
        assert!(store.exists("p1").unwrap());
    }

    #[test]
    fn load_is_idempotent() {
        let (_tmp, store) = test_store(2);
        store.save("p1", &sample_collection(2)).unwrap();

        let first = store.load("p1").unwrap();
        let second = store.load("p1").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn save_replaces_the_whole_artifact() {
        let (tmp, store) = test_store(2);
        store.save("p1", &sample_collection(2)).unwrap();

        // One artifact on disk, replaced in place by the next save.
        let mut collection = sample_collection(2);
        collection.documents.push(Document::new("c", "joelho estavel"));
        collection.vectors.add(&[vec![0.6, 0.8]]).unwrap();
        let corpus: Vec<&str> =
            collection.documents.iter().map(|d| d.text.as_str()).collect();
        collection.lexical = LexicalIndex::build(&corpus);
        store.save("p1", &collection).unwrap();

        assert!(artifact_path(&tmp).exists());
        assert_eq!(store.load("p1").unwrap().documents.len(), 3);
    }

    #[test]
    fn reset_removes_the_artifact_and_is_idempotent() {
        let (_tmp, store) = test_store(2);
        store.save("p1", &sample_collection(2)).unwrap();

        let removed = store.reset("p1").unwrap();
        assert_eq!(removed.len(), 1);
        assert!(!store.exists("p1").unwrap());
        assert!(store.load("p1").unwrap().documents.is_empty());

        // Second reset removes nothing, errors nothing.
        assert!(store.reset("p1").unwrap().is_empty());
    }

    #[test]
    fn collections_are_independent() {
        let (_tmp, store) = test_store(2);
        store.save("p1", &sample_collection(2)).unwrap();

        assert!(store.load("p2").unwrap().documents.is_empty());
        store.reset("p2").unwrap();
        assert!(store.exists("p1").unwrap());
    }

    #[test]
    fn garbage_artifact_is_inconsistent_state() {
        let (tmp, store) = test_store(2);
        store.save("p1", &sample_collection(2)).unwrap();

        std::fs::write(artifact_path(&tmp), b"torn").unwrap();
        let err = store.load("p1").unwrap_err();
        assert!(matches!(err, Error::InconsistentState { .. }));
    }

    #[test]
    fn truncated_artifact_is_inconsistent_state() {
        let (tmp, store) = test_store(2);
        store.save("p1", &sample_collection(2)).unwrap();

        let bytes = std::fs::read(artifact_path(&tmp)).unwrap();
        std::fs::write(artifact_path(&tmp), &bytes[..bytes.len() / 2])
            .unwrap();
        let err = store.load("p1").unwrap_err();
        assert!(matches!(err, Error::InconsistentState { .. }));
    }

    #[test]
    fn corrupt_document_section_is_inconsistent_state() {
        let (tmp, store) = test_store(2);
        store.save("p1", &sample_collection(2)).unwrap();

        // Valid header, unparseable document section.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(b"nope");
        std::fs::write(artifact_path(&tmp), bytes).unwrap();

        let err = store.load("p1").unwrap_err();
        assert!(matches!(err, Error::InconsistentState { .. }));
    }

    #[test]
    fn section_count_mismatch_is_inconsistent_state() {
        let (tmp, store) = test_store(2);

        // Bypass save's consistency gate with a hand-encoded artifact whose
        // sections disagree on the document count.
        let mut collection = sample_collection(2);
        collection.documents.pop();
        let bytes = encode_collection(&collection).unwrap();
        std::fs::write(artifact_path(&tmp), bytes).unwrap();

        let err = store.load("p1").unwrap_err();
        assert!(matches!(err, Error::InconsistentState { .. }));
    }

    #[test]
    fn dimension_mismatch_is_inconsistent_state() {
        let (tmp, _store) = test_store(2);
        let bytes = encode_collection(&sample_collection(2)).unwrap();
        std::fs::write(artifact_path(&tmp), bytes).unwrap();

        let narrow = CollectionStore::open(tmp.path(), 3).unwrap();
        let err = narrow.load("p1").unwrap_err();
        assert!(matches!(err, Error::InconsistentState { .. }));
    }

    #[test]
    fn save_rejects_inconsistent_triple() {
        let (_tmp, store) = test_store(2);
        let mut collection = sample_collection(2);
        collection.documents.pop();

        let err = store.save("p1", &collection).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert!(!store.exists("p1").unwrap());
    }

    #[test]
    fn invalid_collection_ids_are_rejected() {
        let (_tmp, store) = test_store(2);
        for id in ["", "../escape", "a/b", "a b", "p\u{e3}o"] {
            let err = store.load(id).unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "id: {id:?}");
        }
    }

    #[test]
    fn stats_reports_counts() {
        let (_tmp, store) = test_store(2);
        assert_eq!(
            store.stats("p1").unwrap(),
            CollectionStats {
                documents: 0,
                vectors: 0
            }
        );

        store.save("p1", &sample_collection(2)).unwrap();
        assert_eq!(
            store.stats("p1").unwrap(),
            CollectionStats {
                documents: 2,
                vectors: 2
            }
        );
    }
}
