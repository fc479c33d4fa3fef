//! Ingestion: turns one document's pages into committed postings.
//!
//! A document moves `indexing → active` only after every page was extracted
//! and upserted. Any failure purges what was written so far and leaves the
//! document `failed`, so a search never sees half an index.

use crate::cache::IndexEpoch;
use crate::config::FolioConfig;
use crate::error::{FolioError, Result, StoreError};
use crate::index::{DocId, Document, DocumentDraft, DocumentStatus, PageNumber};
use crate::orphans::OrphanLedger;
use crate::retry::{retry, RetryPolicy};
use crate::source::PageSource;
use crate::store::SharedStore;
use crate::tokenizer::Tokenizer;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub document_id: DocId,
    pub words_indexed: usize,
}

struct PageSummary {
    words: HashSet<String>,
    tokens: u64,
}

pub struct IndexBuilder {
    store: SharedStore,
    source: Arc<dyn PageSource>,
    tokenizer: Tokenizer,
    pool: rayon::ThreadPool,
    writes: RetryPolicy,
    epoch: Arc<IndexEpoch>,
    orphans: Arc<OrphanLedger>,
}

impl IndexBuilder {
    pub fn new(
        store: SharedStore,
        source: Arc<dyn PageSource>,
        config: &FolioConfig,
        epoch: Arc<IndexEpoch>,
        orphans: Arc<OrphanLedger>,
    ) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.indexing.page_workers)
            .thread_name(|i| format!("folio-page-{i}"))
            .build()
            .map_err(|e| FolioError::Config(format!("page worker pool: {e}")))?;
        Ok(Self {
            store,
            source,
            tokenizer: Tokenizer::from_config(&config.tokenizer),
            pool,
            writes: RetryPolicy::writes(&config.store),
            epoch,
            orphans,
        })
    }

    pub fn tokenizer(&self) -> Tokenizer {
        self.tokenizer
    }

    pub fn allocate_id(&self) -> Result<DocId> {
        self.write("next_document_id", || self.store.next_document_id())
    }

    /// Register a new document in `indexing` state and index it.
    pub fn ingest(&self, id: DocId, draft: DocumentDraft, storage_ref: String) -> Result<IndexSummary> {
        if draft.title.trim().is_empty() {
            return Err(FolioError::Validation("title is required".into()));
        }
        let mut doc = Document::new(id, draft, 0, storage_ref);
        self.write("put_document", || self.store.put_document(&doc))?;

        doc.total_pages = match self.source.page_count(&doc.storage_ref) {
            Ok(pages) => pages,
            Err(err) => {
                let err = FolioError::from(err);
                self.abort(&mut doc, &err);
                return Err(err);
            }
        };
        if doc.total_pages == 0 {
            // Nothing was indexed; withdraw the registration.
            self.write("remove_document", || self.store.remove_document(id))?;
            return Err(FolioError::Validation("document has no pages".into()));
        }
        self.index_document(doc)
    }

    /// Rebuild an existing document from its stored source.
    pub fn reindex(&self, id: DocId) -> Result<IndexSummary> {
        let mut doc = self
            .write("document", || self.store.document(id))?
            .ok_or(FolioError::NotFound(id))?;
        self.source.release(&doc.storage_ref);
        doc.total_pages = match self.source.page_count(&doc.storage_ref) {
            Ok(pages) => pages,
            Err(err) => {
                let err = FolioError::from(err);
                self.abort(&mut doc, &err);
                return Err(err);
            }
        };
        self.index_document(doc)
    }

    /// Drop a document and cascade to its postings. The catalog entry goes first,
    /// which hides the postings from readers before they are deleted. Postings
    /// that could not be purged are left to the orphan sweeper.
    pub fn remove(&self, id: DocId) -> Result<Document> {
        let doc = self
            .write("remove_document", || self.store.remove_document(id))?
            .ok_or(FolioError::NotFound(id))?;
        self.epoch.bump();
        if self.discard(id) {
            tracing::info!(doc_id = id, "document removed");
        }
        Ok(doc)
    }

    /// Index every page of a catalogued document and commit it as `active`.
    ///
    /// Catalog writes only replace an existing entry: a document removed while
    /// it was being built is not brought back, its fresh postings are purged and
    /// the build fails with [`FolioError::NotFound`].
    pub fn index_document(&self, mut doc: Document) -> Result<IndexSummary> {
        let span = tracing::info_span!("index_document", doc_id = doc.id, title = %doc.title);
        let _enter = span.enter();

        doc.status = DocumentStatus::Indexing;
        match self.write("put_document", || self.store.update_document(&doc)) {
            Ok(true) => {}
            Ok(false) => return Err(FolioError::NotFound(doc.id)),
            Err(err) => {
                self.abort(&mut doc, &err);
                return Err(err);
            }
        }
        self.epoch.bump();
        match self.write("purge", || self.store.purge(doc.id)) {
            Ok(0) => {}
            Ok(stale) => tracing::debug!(stale, "purged postings of previous build"),
            Err(err) => {
                self.abort(&mut doc, &err);
                return Err(err);
            }
        }

        let outcome = self.pool.install(|| {
            (1..=doc.total_pages)
                .into_par_iter()
                .map(|page| self.index_page(&doc, page))
                .collect::<Result<Vec<PageSummary>>>()
        });
        self.source.release(&doc.storage_ref);

        let pages = match outcome {
            Ok(pages) => pages,
            Err(err) => {
                self.abort(&mut doc, &err);
                return Err(err);
            }
        };

        let mut words: HashSet<String> = HashSet::new();
        let mut tokens = 0u64;
        for page in pages {
            tokens += page.tokens;
            words.extend(page.words);
        }
        doc.unique_words = words.len() as u64;
        doc.word_count = tokens;
        doc.status = DocumentStatus::Active;

        match self.write("commit", || self.store.update_document(&doc)) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(doc_id = doc.id, "document removed during indexing, dropping its postings");
                self.discard(doc.id);
                self.epoch.bump();
                return Err(FolioError::NotFound(doc.id));
            }
            Err(err) => {
                self.abort(&mut doc, &err);
                return Err(err);
            }
        }
        self.epoch.bump();
        tracing::info!(words_indexed = words.len(), pages = doc.total_pages, tokens, "document committed");
        Ok(IndexSummary { document_id: doc.id, words_indexed: words.len() })
    }

    fn index_page(&self, doc: &Document, page: PageNumber) -> Result<PageSummary> {
        let text = self.source.fetch_page_text(&doc.storage_ref, page)?;
        let tokens = self.tokenizer.tokenize(&text);
        let token_count = tokens.len() as u64;

        // word -> (frequency, first offset)
        let mut per_word: HashMap<String, (u32, u32)> = HashMap::new();
        for (word, offset) in tokens {
            per_word.entry(word).or_insert((0, offset)).0 += 1;
        }
        for (word, (frequency, first)) in &per_word {
            self.write("upsert", || self.store.upsert(word, doc.id, page, *frequency, *first))?;
        }
        tracing::trace!(page, words = per_word.len(), "page indexed");
        Ok(PageSummary { words: per_word.into_keys().collect(), tokens: token_count })
    }

    fn abort(&self, doc: &mut Document, cause: &FolioError) {
        tracing::warn!(doc_id = doc.id, error = %cause, "indexing failed, purging partial postings");
        self.discard(doc.id);
        doc.status = DocumentStatus::Failed;
        doc.unique_words = 0;
        doc.word_count = 0;
        match self.write("put_document", || self.store.update_document(doc)) {
            Ok(true) => {}
            Ok(false) => tracing::debug!(doc_id = doc.id, "document already removed"),
            Err(err) => tracing::error!(doc_id = doc.id, error = %err, "could not mark document failed"),
        }
        self.epoch.bump();
    }

    /// Purge a document's postings; on failure hand the id to the orphan ledger.
    fn discard(&self, doc_id: DocId) -> bool {
        match self.write("purge", || self.store.purge(doc_id)) {
            Ok(_) => true,
            Err(err) => {
                tracing::warn!(doc_id, error = %err, "postings left behind, queued for the orphan sweep");
                self.orphans.flag(doc_id);
                false
            }
        }
    }

    fn write<T>(&self, what: &str, op: impl FnMut() -> std::result::Result<T, StoreError>) -> Result<T> {
        retry(&self.writes, what, None, op).map_err(FolioError::from)
    }
}
