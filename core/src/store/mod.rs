//! The keyed store behind the inverted index and the document catalog.
//!
//! Postings are keyed by `(word, document, page)`; every upsert is atomic for its
//! key and nothing locks across words or documents. Readers only ever surface
//! postings of documents whose catalog entry is active, so flipping the status
//! (or dropping the entry) before a purge makes the purge atomic for them.

mod memory;
mod sled_store;

pub use memory::MemoryStore;
pub use sled_store::SledStore;

use crate::error::StoreError;
use crate::index::{DocId, Document, PageNumber, Posting};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub words: usize,
    pub postings: usize,
}

pub trait IndexStore: Send + Sync {
    /// Create the posting with `delta_frequency` and `offset_if_new`, or add
    /// `delta_frequency` to an existing one. The position is never overwritten.
    fn upsert(
        &self,
        word: &str,
        doc_id: DocId,
        page: PageNumber,
        delta_frequency: u32,
        offset_if_new: u32,
    ) -> Result<(), StoreError>;

    fn postings_for(&self, word: &str) -> Result<Vec<Posting>, StoreError>;

    fn postings_for_document(&self, doc_id: DocId) -> Result<Vec<Posting>, StoreError>;

    /// Remove every posting of a document. Returns how many were removed.
    fn purge(&self, doc_id: DocId) -> Result<usize, StoreError>;

    fn stats(&self) -> Result<IndexStats, StoreError>;
}

pub trait DocumentCatalog: Send + Sync {
    fn next_document_id(&self) -> Result<DocId, StoreError>;

    fn put_document(&self, doc: &Document) -> Result<(), StoreError>;

    /// Overwrite an existing entry in one atomic step. Returns false, writing
    /// nothing, when the document is no longer catalogued.
    fn update_document(&self, doc: &Document) -> Result<bool, StoreError>;

    fn document(&self, id: DocId) -> Result<Option<Document>, StoreError>;

    fn documents(&self) -> Result<Vec<Document>, StoreError>;

    fn remove_document(&self, id: DocId) -> Result<Option<Document>, StoreError>;
}

pub trait Store: IndexStore + DocumentCatalog {}

impl<T: IndexStore + DocumentCatalog> Store for T {}

pub type SharedStore = Arc<dyn Store>;
