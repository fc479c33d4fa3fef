//! Page-level keyword indexing and search over a document library.
//!
//! Documents are split into pages, every page is tokenized and its words are
//! upserted as postings keyed by `(word, document, page)`. A document only
//! becomes searchable once all of its pages were indexed and the commit step
//! flipped it to [`DocumentStatus::Active`].

pub mod builder;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod orphans;
pub mod persist;
pub mod query;
pub mod ranker;
pub mod retry;
pub mod source;
pub mod store;
pub mod tokenizer;

pub use config::FolioConfig;
pub use engine::{Engine, LibraryStats};
pub use error::{ExtractionError, FolioError, Result, StoreError};
pub use index::{Candidate, DocId, Document, DocumentDraft, DocumentStatus, PageNumber, Posting, PostingStats};
pub use ranker::{SearchHit, SearchResults};
