use crate::cache::{CacheKey, IndexEpoch, ResultCache};
use crate::config::{FolioConfig, SearchConfig};
use crate::error::{FolioError, Result};
use crate::index::{Candidate, DocId, Document, PageNumber, Posting};
use crate::orphans::OrphanLedger;
use crate::ranker::{Ranker, SearchResults};
use crate::retry::{retry, RetryPolicy};
use crate::store::SharedStore;
use crate::tokenizer::Tokenizer;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Default)]
struct Accumulator {
    total_matches: u64,
    pages: BTreeSet<PageNumber>,
    /// Indices into the keyword list, so `keywords_found` keeps query order.
    keywords: BTreeSet<usize>,
}

/// Turns a raw query into ranked results: tokenize, fan out one postings lookup
/// per keyword, aggregate per document, rank.
pub struct QueryProcessor {
    store: SharedStore,
    tokenizer: Tokenizer,
    ranker: Ranker,
    search: SearchConfig,
    reads: RetryPolicy,
    cache: ResultCache,
    epoch: Arc<IndexEpoch>,
    orphans: Arc<OrphanLedger>,
}

impl QueryProcessor {
    pub fn new(store: SharedStore, config: &FolioConfig, epoch: Arc<IndexEpoch>, orphans: Arc<OrphanLedger>) -> Self {
        Self {
            store,
            tokenizer: Tokenizer::from_config(&config.tokenizer),
            ranker: Ranker::new(config.ranking),
            search: config.search.clone(),
            reads: RetryPolicy::reads(&config.store),
            cache: ResultCache::new(Duration::from_secs(config.search.cache_ttl_secs), config.search.cache_capacity),
            epoch,
            orphans,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.search.timeout()
    }

    /// `None` selects the configured default; anything above the maximum is clamped.
    pub fn resolve_limit(&self, limit: Option<usize>) -> Result<usize> {
        match limit {
            None => Ok(self.search.default_limit),
            Some(0) => Err(FolioError::Validation("limit must be at least 1".into())),
            Some(n) => Ok(n.min(self.search.max_limit)),
        }
    }

    pub fn search(&self, query: &str, limit: Option<usize>) -> Result<SearchResults> {
        let limit = self.resolve_limit(limit)?;
        let keywords = self.tokenizer.keywords(query);
        if keywords.is_empty() {
            return Err(FolioError::Validation("query contains no searchable terms".into()));
        }

        let key = CacheKey { keywords, limit };
        let epoch = self.epoch.current();
        if let Some(cached) = self.cache.get(&key, epoch) {
            tracing::debug!(keywords = ?key.keywords, "search served from cache");
            return Ok(cached);
        }

        let started = Instant::now();
        let deadline = started + self.search.timeout();
        let candidates = self.candidates(&key.keywords, deadline);
        if Instant::now() >= deadline {
            tracing::warn!(keywords = ?key.keywords, elapsed = ?started.elapsed(), "search deadline exceeded");
            return Err(FolioError::Timeout(self.search.timeout()));
        }

        let results = self.ranker.rank(candidates, key.keywords.len(), limit);
        tracing::debug!(
            keywords = ?key.keywords,
            total_results = results.total_results,
            returned = results.results.len(),
            elapsed = ?started.elapsed(),
            "search completed"
        );
        self.cache.insert(key, epoch, results.clone());
        Ok(results)
    }

    /// Committed documents matching at least one keyword, unranked.
    pub fn candidates(&self, keywords: &[String], deadline: Instant) -> Vec<Candidate> {
        let lookups: Vec<Vec<Posting>> = keywords.par_iter().map(|kw| self.lookup(kw, deadline)).collect();

        let mut by_doc: HashMap<DocId, Accumulator> = HashMap::new();
        for (idx, postings) in lookups.into_iter().enumerate() {
            for posting in postings {
                let acc = by_doc.entry(posting.doc_id).or_default();
                acc.total_matches += u64::from(posting.frequency);
                acc.pages.insert(posting.page);
                acc.keywords.insert(idx);
            }
        }

        let mut candidates = Vec::with_capacity(by_doc.len());
        for (doc_id, acc) in by_doc {
            let Some(document) = self.resolve(doc_id, deadline) else {
                continue;
            };
            candidates.push(Candidate {
                document,
                total_matches: acc.total_matches,
                pages: acc.pages.into_iter().collect(),
                keywords_found: acc.keywords.into_iter().map(|i| keywords[i].clone()).collect(),
            });
        }
        candidates
    }

    fn lookup(&self, keyword: &str, deadline: Instant) -> Vec<Posting> {
        match retry(&self.reads, "postings_for", Some(deadline), || self.store.postings_for(keyword)) {
            Ok(postings) => postings,
            Err(err) => {
                tracing::warn!(keyword, error = %err, "postings lookup failed, treating keyword as unmatched");
                Vec::new()
            }
        }
    }

    /// The catalog entry of a matched document, if it is committed. Orphans are
    /// recorded for the sweeper; uncommitted documents are skipped silently.
    fn resolve(&self, doc_id: DocId, deadline: Instant) -> Option<Document> {
        match retry(&self.reads, "document", Some(deadline), || self.store.document(doc_id)) {
            Ok(Some(doc)) if doc.is_searchable() => Some(doc),
            Ok(Some(_)) => None,
            Ok(None) => {
                if self.orphans.flag(doc_id) {
                    tracing::debug!(doc_id, "postings reference a missing document, flagged for cleanup");
                }
                None
            }
            Err(err) => {
                tracing::warn!(doc_id, error = %err, "document lookup failed, dropping candidate");
                None
            }
        }
    }
}
