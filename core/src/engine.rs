use crate::builder::{IndexBuilder, IndexSummary};
use crate::cache::IndexEpoch;
use crate::config::FolioConfig;
use crate::error::{FolioError, Result};
use crate::index::{DocId, Document, DocumentDraft, DocumentStatus};
use crate::orphans::{OrphanLedger, SweepReport};
use crate::query::QueryProcessor;
use crate::ranker::SearchResults;
use crate::retry::{retry, RetryPolicy};
use crate::source::PageSource;
use crate::store::SharedStore;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LibraryStats {
    pub documents: usize,
    pub active: usize,
    pub indexing: usize,
    pub failed: usize,
    pub words: usize,
    pub postings: usize,
    pub pending_orphans: usize,
}

/// Wires the builder and the query processor to one shared store.
pub struct Engine {
    store: SharedStore,
    builder: IndexBuilder,
    processor: QueryProcessor,
    orphans: Arc<OrphanLedger>,
    reads: RetryPolicy,
    writes: RetryPolicy,
}

impl Engine {
    pub fn new(store: SharedStore, source: Arc<dyn PageSource>, config: &FolioConfig) -> Result<Self> {
        config.validate()?;
        let epoch = Arc::new(IndexEpoch::default());
        let orphans = Arc::new(OrphanLedger::new());
        let builder = IndexBuilder::new(store.clone(), source, config, epoch.clone(), orphans.clone())?;
        let processor = QueryProcessor::new(store.clone(), config, epoch, orphans.clone());
        Ok(Self {
            store,
            builder,
            processor,
            orphans,
            reads: RetryPolicy::reads(&config.store),
            writes: RetryPolicy::writes(&config.store),
        })
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn search_timeout(&self) -> Duration {
        self.processor.timeout()
    }

    pub fn allocate_id(&self) -> Result<DocId> {
        self.builder.allocate_id()
    }

    pub fn ingest(&self, id: DocId, draft: DocumentDraft, storage_ref: String) -> Result<IndexSummary> {
        self.builder.ingest(id, draft, storage_ref)
    }

    pub fn reindex(&self, id: DocId) -> Result<IndexSummary> {
        self.builder.reindex(id)
    }

    pub fn remove(&self, id: DocId) -> Result<Document> {
        self.builder.remove(id)
    }

    pub fn search(&self, query: &str, limit: Option<usize>) -> Result<SearchResults> {
        self.processor.search(query, limit)
    }

    pub fn document(&self, id: DocId) -> Result<Document> {
        retry(&self.reads, "document", None, || self.store.document(id))?.ok_or(FolioError::NotFound(id))
    }

    /// Catalog listing ordered by id, optionally filtered by status.
    pub fn documents(&self, status: Option<DocumentStatus>) -> Result<Vec<Document>> {
        let mut docs = retry(&self.reads, "documents", None, || self.store.documents())?;
        if let Some(status) = status {
            docs.retain(|d| d.status == status);
        }
        docs.sort_by_key(|d| d.id);
        Ok(docs)
    }

    pub fn stats(&self) -> Result<LibraryStats> {
        let docs = self.documents(None)?;
        let index = retry(&self.reads, "stats", None, || self.store.stats())?;
        let count = |status| docs.iter().filter(|d| d.status == status).count();
        Ok(LibraryStats {
            documents: docs.len(),
            active: count(DocumentStatus::Active),
            indexing: count(DocumentStatus::Indexing),
            failed: count(DocumentStatus::Failed),
            words: index.words,
            postings: index.postings,
            pending_orphans: self.orphans.len(),
        })
    }

    pub fn sweep_orphans(&self) -> SweepReport {
        self.orphans.sweep(self.store.as_ref(), &self.writes)
    }
}
