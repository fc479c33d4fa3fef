//! On-disk store backed by sled.
//!
//! Trees:
//! - `postings`: `word 0x00 doc_id(be) page(be)` → bincode [`PostingStats`]
//! - `doc_pages`: `doc_id(be) page(be) word` → empty, the secondary index used by purges
//! - `documents`: `doc_id(be)` → bincode [`Document`]

use super::{DocumentCatalog, IndexStats, IndexStore};
use crate::error::StoreError;
use crate::index::{DocId, Document, PageNumber, Posting, PostingStats};
use sled::transaction::{TransactionError, TransactionResult};
use sled::Transactional;
use std::path::Path;

const SEP: u8 = 0;

#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    postings: sled::Tree,
    doc_pages: sled::Tree,
    documents: sled::Tree,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        Self::from_db(sled::open(path)?)
    }

    /// Data is lost when the store is dropped.
    pub fn open_temporary() -> Result<Self, StoreError> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self, StoreError> {
        Ok(Self {
            postings: db.open_tree("postings")?,
            doc_pages: db.open_tree("doc_pages")?,
            documents: db.open_tree("documents")?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }
}

fn word_prefix(word: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(word.len() + 1);
    key.extend_from_slice(word.as_bytes());
    key.push(SEP);
    key
}

fn posting_key(word: &str, doc_id: DocId, page: PageNumber) -> Vec<u8> {
    let mut key = word_prefix(word);
    key.extend_from_slice(&doc_id.to_be_bytes());
    key.extend_from_slice(&page.to_be_bytes());
    key
}

fn doc_page_key(doc_id: DocId, page: PageNumber, word: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(12 + word.len());
    key.extend_from_slice(&doc_id.to_be_bytes());
    key.extend_from_slice(&page.to_be_bytes());
    key.extend_from_slice(word.as_bytes());
    key
}

/// Splits the `doc_id page` tail off a posting key.
fn split_posting_key(key: &[u8]) -> Result<(DocId, PageNumber), StoreError> {
    if key.len() < 13 {
        return Err(StoreError::Corrupt(format!("posting key too short ({} bytes)", key.len())));
    }
    let tail = &key[key.len() - 12..];
    let doc_id = DocId::from_be_bytes(tail[..8].try_into().map_err(|_| StoreError::Corrupt("doc id".into()))?);
    let page = PageNumber::from_be_bytes(tail[8..].try_into().map_err(|_| StoreError::Corrupt("page".into()))?);
    Ok((doc_id, page))
}

fn split_doc_page_key(key: &[u8]) -> Result<(PageNumber, String), StoreError> {
    if key.len() < 13 {
        return Err(StoreError::Corrupt(format!("doc_pages key too short ({} bytes)", key.len())));
    }
    let page = PageNumber::from_be_bytes(key[8..12].try_into().map_err(|_| StoreError::Corrupt("page".into()))?);
    let word = String::from_utf8(key[12..].to_vec()).map_err(|e| StoreError::Corrupt(e.to_string()))?;
    Ok((page, word))
}

impl IndexStore for SledStore {
    fn upsert(
        &self,
        word: &str,
        doc_id: DocId,
        page: PageNumber,
        delta_frequency: u32,
        offset_if_new: u32,
    ) -> Result<(), StoreError> {
        // Secondary entry first so a purge never misses a posting.
        self.doc_pages.insert(doc_page_key(doc_id, page, word), Vec::new())?;

        let mut corrupt: Option<String> = None;
        self.postings.update_and_fetch(posting_key(word, doc_id, page), |old| {
            corrupt = None;
            let stats = match old {
                Some(bytes) => match bincode::deserialize::<PostingStats>(bytes) {
                    Ok(mut stats) => {
                        stats.frequency = stats.frequency.saturating_add(delta_frequency);
                        stats
                    }
                    Err(e) => {
                        corrupt = Some(e.to_string());
                        return Some(bytes.to_vec());
                    }
                },
                None => PostingStats { frequency: delta_frequency, position: offset_if_new },
            };
            match bincode::serialize(&stats) {
                Ok(encoded) => Some(encoded),
                Err(e) => {
                    corrupt = Some(e.to_string());
                    old.map(|b| b.to_vec())
                }
            }
        })?;
        match corrupt {
            Some(reason) => Err(StoreError::Corrupt(format!("posting {word}/{doc_id}/{page}: {reason}"))),
            None => Ok(()),
        }
    }

    fn postings_for(&self, word: &str) -> Result<Vec<Posting>, StoreError> {
        let mut out = Vec::new();
        for item in self.postings.scan_prefix(word_prefix(word)) {
            let (key, value) = item?;
            let (doc_id, page) = split_posting_key(&key)?;
            let stats: PostingStats = bincode::deserialize(&value)?;
            out.push(Posting { word: word.to_string(), doc_id, page, frequency: stats.frequency, position: stats.position });
        }
        Ok(out)
    }

    fn postings_for_document(&self, doc_id: DocId) -> Result<Vec<Posting>, StoreError> {
        let mut out = Vec::new();
        for item in self.doc_pages.scan_prefix(doc_id.to_be_bytes()) {
            let (key, _) = item?;
            let (page, word) = split_doc_page_key(&key)?;
            if let Some(value) = self.postings.get(posting_key(&word, doc_id, page))? {
                let stats: PostingStats = bincode::deserialize(&value)?;
                out.push(Posting { word, doc_id, page, frequency: stats.frequency, position: stats.position });
            }
        }
        Ok(out)
    }

    fn purge(&self, doc_id: DocId) -> Result<usize, StoreError> {
        let mut keys = Vec::new();
        for item in self.doc_pages.scan_prefix(doc_id.to_be_bytes()) {
            let (key, _) = item?;
            let (page, word) = split_doc_page_key(&key)?;
            keys.push((posting_key(&word, doc_id, page), key.to_vec()));
        }
        if keys.is_empty() {
            return Ok(0);
        }

        let result: TransactionResult<usize, ()> = (&self.postings, &self.doc_pages).transaction(|(postings, doc_pages)| {
            let mut removed = 0;
            for (posting, secondary) in &keys {
                if postings.remove(posting.as_slice())?.is_some() {
                    removed += 1;
                }
                doc_pages.remove(secondary.as_slice())?;
            }
            Ok(removed)
        });
        match result {
            Ok(removed) => Ok(removed),
            Err(TransactionError::Storage(e)) => Err(e.into()),
            Err(TransactionError::Abort(())) => Err(StoreError::Unavailable("purge transaction aborted".into())),
        }
    }

    fn stats(&self) -> Result<IndexStats, StoreError> {
        let mut stats = IndexStats::default();
        let mut last_word: Option<Vec<u8>> = None;
        for item in self.postings.iter() {
            let (key, _) = item?;
            stats.postings += 1;
            let word = &key[..key.len().saturating_sub(13)];
            if last_word.as_deref() != Some(word) {
                stats.words += 1;
                last_word = Some(word.to_vec());
            }
        }
        Ok(stats)
    }
}

impl DocumentCatalog for SledStore {
    fn next_document_id(&self) -> Result<DocId, StoreError> {
        Ok(self.db.generate_id()? + 1)
    }

    fn put_document(&self, doc: &Document) -> Result<(), StoreError> {
        self.documents.insert(doc.id.to_be_bytes(), bincode::serialize(doc)?)?;
        Ok(())
    }

    fn update_document(&self, doc: &Document) -> Result<bool, StoreError> {
        let value = bincode::serialize(doc)?;
        let previous = self.documents.fetch_and_update(doc.id.to_be_bytes(), |old| old.map(|_| value.clone()))?;
        Ok(previous.is_some())
    }

    fn document(&self, id: DocId) -> Result<Option<Document>, StoreError> {
        match self.documents.get(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn documents(&self) -> Result<Vec<Document>, StoreError> {
        let mut out = Vec::new();
        for item in self.documents.iter() {
            let (_, value) = item?;
            out.push(bincode::deserialize(&value)?);
        }
        Ok(out)
    }

    fn remove_document(&self, id: DocId) -> Result<Option<Document>, StoreError> {
        match self.documents.remove(id.to_be_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
}
