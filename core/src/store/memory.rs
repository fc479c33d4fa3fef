use super::{DocumentCatalog, IndexStats, IndexStore};
use crate::error::StoreError;
use crate::index::{DocId, Document, PageNumber, Posting, PostingStats};
use dashmap::DashMap;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// Sharded in-process store. Each word's postings live behind one dashmap
/// shard, and a reverse map remembers which words a document touched so a
/// purge does not scan the whole index.
#[derive(Default)]
pub struct MemoryStore {
    postings: DashMap<String, HashMap<(DocId, PageNumber), PostingStats>>,
    words_by_doc: DashMap<DocId, HashSet<String>>,
    documents: DashMap<DocId, Document>,
    last_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryStore {
    fn upsert(
        &self,
        word: &str,
        doc_id: DocId,
        page: PageNumber,
        delta_frequency: u32,
        offset_if_new: u32,
    ) -> Result<(), StoreError> {
        // Reverse entry first so a purge never misses a posting.
        self.words_by_doc.entry(doc_id).or_default().insert(word.to_string());
        let mut pages = self.postings.entry(word.to_string()).or_default();
        pages
            .entry((doc_id, page))
            .and_modify(|stats| stats.frequency = stats.frequency.saturating_add(delta_frequency))
            .or_insert(PostingStats { frequency: delta_frequency, position: offset_if_new });
        Ok(())
    }

    fn postings_for(&self, word: &str) -> Result<Vec<Posting>, StoreError> {
        let Some(pages) = self.postings.get(word) else {
            return Ok(Vec::new());
        };
        let mut out: Vec<Posting> = pages
            .iter()
            .map(|(&(doc_id, page), stats)| Posting {
                word: word.to_string(),
                doc_id,
                page,
                frequency: stats.frequency,
                position: stats.position,
            })
            .collect();
        out.sort_by_key(|p| (p.doc_id, p.page));
        Ok(out)
    }

    fn postings_for_document(&self, doc_id: DocId) -> Result<Vec<Posting>, StoreError> {
        let words: Vec<String> = match self.words_by_doc.get(&doc_id) {
            Some(words) => words.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };
        let mut out = Vec::new();
        for word in words {
            if let Some(pages) = self.postings.get(&word) {
                for (&(d, page), stats) in pages.iter().filter(|((d, _), _)| *d == doc_id) {
                    out.push(Posting { word: word.clone(), doc_id: d, page, frequency: stats.frequency, position: stats.position });
                }
            }
        }
        out.sort_by(|a, b| (a.page, &a.word).cmp(&(b.page, &b.word)));
        Ok(out)
    }

    fn purge(&self, doc_id: DocId) -> Result<usize, StoreError> {
        let Some((_, words)) = self.words_by_doc.remove(&doc_id) else {
            return Ok(0);
        };
        let mut removed = 0;
        for word in words {
            if let Some(mut pages) = self.postings.get_mut(&word) {
                let before = pages.len();
                pages.retain(|(d, _), _| *d != doc_id);
                removed += before - pages.len();
            }
            self.postings.remove_if(&word, |_, pages| pages.is_empty());
        }
        Ok(removed)
    }

    fn stats(&self) -> Result<IndexStats, StoreError> {
        let mut stats = IndexStats::default();
        for entry in self.postings.iter() {
            stats.words += 1;
            stats.postings += entry.value().len();
        }
        Ok(stats)
    }
}

impl DocumentCatalog for MemoryStore {
    fn next_document_id(&self) -> Result<DocId, StoreError> {
        Ok(self.last_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn put_document(&self, doc: &Document) -> Result<(), StoreError> {
        self.documents.insert(doc.id, doc.clone());
        Ok(())
    }

    fn update_document(&self, doc: &Document) -> Result<bool, StoreError> {
        match self.documents.get_mut(&doc.id) {
            Some(mut entry) => {
                *entry = doc.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn document(&self, id: DocId) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.get(&id).map(|d| d.clone()))
    }

    fn documents(&self) -> Result<Vec<Document>, StoreError> {
        let mut docs: Vec<Document> = self.documents.iter().map(|d| d.value().clone()).collect();
        docs.sort_by_key(|d| d.id);
        Ok(docs)
    }

    fn remove_document(&self, id: DocId) -> Result<Option<Document>, StoreError> {
        Ok(self.documents.remove(&id).map(|(_, d)| d))
    }
}
