use crate::index::{DocId, DocumentStatus};
use crate::retry::{retry, RetryPolicy};
use crate::store::Store;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Documents whose postings must not stay in the index: postings seen without
/// a catalog entry, and purges that failed on removal or on a failed build.
/// [`OrphanLedger::sweep`] purges the leftovers.
#[derive(Debug, Default)]
pub struct OrphanLedger {
    pending: Mutex<HashSet<DocId>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub documents: usize,
    pub postings: usize,
    pub deferred: usize,
}

impl OrphanLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true the first time a document is flagged.
    pub fn flag(&self, doc_id: DocId) -> bool {
        self.pending.lock().insert(doc_id)
    }

    pub fn pending(&self) -> Vec<DocId> {
        let mut ids: Vec<DocId> = self.pending.lock().iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn sweep(&self, store: &dyn Store, policy: &RetryPolicy) -> SweepReport {
        let ids: Vec<DocId> = std::mem::take(&mut *self.pending.lock()).into_iter().collect();
        let mut report = SweepReport::default();
        for doc_id in ids {
            match store.document(doc_id) {
                Ok(Some(doc)) if doc.status == DocumentStatus::Failed => {}
                // Resolves again, its postings are live or being rebuilt.
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(doc_id, error = %err, "orphan sweep: catalog lookup failed, deferring");
                    self.flag(doc_id);
                    report.deferred += 1;
                    continue;
                }
            }
            match retry(policy, "purge_orphan", None, || store.purge(doc_id)) {
                Ok(removed) => {
                    tracing::info!(doc_id, removed, "purged orphaned postings");
                    report.documents += 1;
                    report.postings += removed;
                }
                Err(err) => {
                    tracing::warn!(doc_id, error = %err, "orphan sweep: purge failed, deferring");
                    self.flag(doc_id);
                    report.deferred += 1;
                }
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, DocumentDraft};
    use crate::store::{DocumentCatalog, IndexStore, MemoryStore};

    #[test]
    fn sweep_purges_only_unresolved_documents() {
        let store = MemoryStore::new();
        store.upsert("radar", 1, 1, 2, 0).unwrap();
        store.upsert("radar", 2, 1, 1, 0).unwrap();
        store.put_document(&Document::new(2, DocumentDraft::default(), 1, "2.txt".into())).unwrap();

        let ledger = OrphanLedger::new();
        assert!(ledger.flag(1));
        assert!(!ledger.flag(1));
        ledger.flag(2);

        let report = ledger.sweep(&store, &RetryPolicy::none());
        assert_eq!(report, SweepReport { documents: 1, postings: 1, deferred: 0 });
        assert!(ledger.is_empty());
        let left = store.postings_for("radar").unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].doc_id, 2);
    }

    #[test]
    fn sweep_clears_failed_documents_but_keeps_their_entry() {
        let store = MemoryStore::new();
        let mut failed = Document::new(3, DocumentDraft::default(), 2, "3.txt".into());
        failed.status = DocumentStatus::Failed;
        store.put_document(&failed).unwrap();
        store.upsert("radar", 3, 2, 1, 0).unwrap();

        let ledger = OrphanLedger::new();
        ledger.flag(3);
        let report = ledger.sweep(&store, &RetryPolicy::none());
        assert_eq!(report, SweepReport { documents: 1, postings: 1, deferred: 0 });
        assert!(store.postings_for_document(3).unwrap().is_empty());
        assert_eq!(store.document(3).unwrap().unwrap().status, DocumentStatus::Failed);
    }
}
