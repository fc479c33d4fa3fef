use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub type DocId = u64;
pub type PageNumber = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Indexing,
    Active,
    Failed,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Indexing => "indexing",
            DocumentStatus::Active => "active",
            DocumentStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "indexing" => Ok(DocumentStatus::Indexing),
            "active" => Ok(DocumentStatus::Active),
            "failed" => Ok(DocumentStatus::Failed),
            other => Err(format!("unknown document status '{other}'")),
        }
    }
}

/// Metadata supplied by the uploader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub isbn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocId,
    pub title: String,
    pub author: String,
    pub subject: String,
    pub isbn: String,
    pub total_pages: u32,
    /// Opaque reference handed back to the page source, e.g. `uploads/{id}.txt`.
    pub storage_ref: String,
    pub status: DocumentStatus,
    /// RFC 3339 upload timestamp.
    pub uploaded_at: String,
    /// Distinct words, filled in at commit.
    pub unique_words: u64,
    /// Total tokens across all pages, filled in at commit.
    pub word_count: u64,
}

impl Document {
    pub fn new(id: DocId, draft: DocumentDraft, total_pages: u32, storage_ref: String) -> Self {
        let uploaded_at = OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default();
        Self {
            id,
            title: draft.title.trim().to_string(),
            author: draft.author.trim().to_string(),
            subject: draft.subject.trim().to_string(),
            isbn: draft.isbn.trim().to_string(),
            total_pages,
            storage_ref,
            status: DocumentStatus::Indexing,
            uploaded_at,
            unique_words: 0,
            word_count: 0,
        }
    }

    pub fn is_searchable(&self) -> bool {
        self.status == DocumentStatus::Active
    }
}

/// Value half of a posting: occurrence count and first offset on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingStats {
    pub frequency: u32,
    pub position: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Posting {
    pub word: String,
    pub doc_id: DocId,
    pub page: PageNumber,
    pub frequency: u32,
    pub position: u32,
}

/// A committed document that matched at least one query keyword, before ranking.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub document: Document,
    pub total_matches: u64,
    /// Sorted, distinct.
    pub pages: Vec<PageNumber>,
    /// Subset of the query keywords, in query order.
    pub keywords_found: Vec<String>,
}
