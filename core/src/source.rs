//! Page text extraction. The engine never reads files itself; it asks a
//! [`PageSource`] for the text of one page at a time.

use crate::error::ExtractionError;
use crate::index::PageNumber;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub trait PageSource: Send + Sync {
    fn page_count(&self, storage_ref: &str) -> Result<u32, ExtractionError>;

    fn fetch_page_text(&self, storage_ref: &str, page: PageNumber) -> Result<String, ExtractionError>;

    /// Called once a document is done so cached pages can be dropped.
    fn release(&self, _storage_ref: &str) {}
}

const FORM_FEED: char = '\u{c}';

/// Split a text upload into pages.
///
/// Form feeds are treated as hard page breaks (the convention of `pdftotext`);
/// a trailing break does not open an empty last page. Text without form feeds
/// is cut at line boundaries once a page grows past `page_chars` characters.
pub fn paginate(text: &str, page_chars: usize) -> Vec<String> {
    if text.contains(FORM_FEED) {
        let mut pages: Vec<String> = text.split(FORM_FEED).map(str::to_string).collect();
        while pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        return pages;
    }

    let mut pages = Vec::new();
    let mut current = String::new();
    let mut current_chars = 0;
    for line in text.lines() {
        current.push_str(line);
        current.push('\n');
        current_chars += line.chars().count() + 1;
        if current_chars > page_chars {
            pages.push(std::mem::take(&mut current));
            current_chars = 0;
        }
    }
    if !current.trim().is_empty() {
        pages.push(current);
    }
    pages
}

/// Reads UTF-8 text files below a root directory; the storage reference is the
/// file name relative to that root.
pub struct TextFileSource {
    root: PathBuf,
    page_chars: usize,
    cache: RwLock<HashMap<String, Arc<Vec<String>>>>,
}

impl TextFileSource {
    pub fn new<P: AsRef<Path>>(root: P, page_chars: usize) -> Self {
        Self { root: root.as_ref().to_path_buf(), page_chars: page_chars.max(1), cache: RwLock::new(HashMap::new()) }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, storage_ref: &str) -> PathBuf {
        self.root.join(storage_ref)
    }

    pub fn save(&self, storage_ref: &str, bytes: &[u8]) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::write(self.path_of(storage_ref), bytes)?;
        self.cache.write().remove(storage_ref);
        Ok(())
    }

    pub fn delete(&self, storage_ref: &str) -> std::io::Result<()> {
        self.cache.write().remove(storage_ref);
        match std::fs::remove_file(self.path_of(storage_ref)) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    fn pages(&self, storage_ref: &str) -> Result<Arc<Vec<String>>, ExtractionError> {
        if let Some(pages) = self.cache.read().get(storage_ref) {
            return Ok(pages.clone());
        }
        let text = std::fs::read_to_string(self.path_of(storage_ref)).map_err(|e| ExtractionError::Source {
            storage_ref: storage_ref.to_string(),
            reason: e.to_string(),
        })?;
        let pages = Arc::new(paginate(&text, self.page_chars));
        self.cache.write().insert(storage_ref.to_string(), pages.clone());
        Ok(pages)
    }
}

impl PageSource for TextFileSource {
    fn page_count(&self, storage_ref: &str) -> Result<u32, ExtractionError> {
        Ok(self.pages(storage_ref)?.len() as u32)
    }

    fn fetch_page_text(&self, storage_ref: &str, page: PageNumber) -> Result<String, ExtractionError> {
        let pages = self.pages(storage_ref)?;
        page.checked_sub(1)
            .and_then(|idx| pages.get(idx as usize))
            .cloned()
            .ok_or_else(|| ExtractionError::Page { page, reason: format!("document has {} pages", pages.len()) })
    }

    fn release(&self, storage_ref: &str) {
        self.cache.write().remove(storage_ref);
    }
}

/// Pages held in memory. A `None` page fails extraction, which is how tests
/// simulate a corrupt page.
#[derive(Default)]
pub struct MemorySource {
    docs: RwLock<HashMap<String, Vec<Option<String>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert<S: Into<String>>(&self, storage_ref: &str, pages: impl IntoIterator<Item = S>) {
        let pages = pages.into_iter().map(|p| Some(p.into())).collect();
        self.docs.write().insert(storage_ref.to_string(), pages);
    }

    pub fn corrupt_page(&self, storage_ref: &str, page: PageNumber) {
        if let Some(pages) = self.docs.write().get_mut(storage_ref) {
            if let Some(slot) = page.checked_sub(1).and_then(|idx| pages.get_mut(idx as usize)) {
                *slot = None;
            }
        }
    }
}

impl PageSource for MemorySource {
    fn page_count(&self, storage_ref: &str) -> Result<u32, ExtractionError> {
        self.docs
            .read()
            .get(storage_ref)
            .map(|pages| pages.len() as u32)
            .ok_or_else(|| ExtractionError::Source { storage_ref: storage_ref.to_string(), reason: "unknown document".into() })
    }

    fn fetch_page_text(&self, storage_ref: &str, page: PageNumber) -> Result<String, ExtractionError> {
        let docs = self.docs.read();
        let pages = docs
            .get(storage_ref)
            .ok_or_else(|| ExtractionError::Source { storage_ref: storage_ref.to_string(), reason: "unknown document".into() })?;
        match page.checked_sub(1).and_then(|idx| pages.get(idx as usize)) {
            Some(Some(text)) => Ok(text.clone()),
            Some(None) => Err(ExtractionError::Page { page, reason: "corrupt page".into() }),
            None => Err(ExtractionError::Page { page, reason: "page out of range".into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn form_feeds_are_page_breaks() {
        let pages = paginate("one\u{c}two\u{c}\u{c}four\u{c}", 10);
        assert_eq!(pages, vec!["one", "two", "", "four"]);
    }

    #[test]
    fn long_text_is_cut_at_lines() {
        let text = "aaaa\nbbbb\ncccc\n";
        let pages = paginate(text, 6);
        assert_eq!(pages, vec!["aaaa\nbbbb\n".to_string(), "cccc\n".to_string()]);
    }

    #[test]
    fn empty_text_has_no_pages() {
        assert!(paginate("", 100).is_empty());
        assert!(paginate("  \n\n", 100).is_empty());
    }

    #[test]
    fn text_file_source_reads_pages() {
        let dir = tempfile::tempdir().unwrap();
        let source = TextFileSource::new(dir.path(), 2000);
        source.save("1.txt", "radar page\u{c}missile page".as_bytes()).unwrap();
        assert_eq!(source.page_count("1.txt").unwrap(), 2);
        assert_eq!(source.fetch_page_text("1.txt", 2).unwrap(), "missile page");
        assert!(matches!(source.fetch_page_text("1.txt", 3), Err(ExtractionError::Page { page: 3, .. })));
        assert!(matches!(source.fetch_page_text("1.txt", 0), Err(ExtractionError::Page { page: 0, .. })));
        assert!(matches!(source.page_count("missing.txt"), Err(ExtractionError::Source { .. })));
    }

    #[test]
    fn memory_source_reports_corrupt_pages() {
        let source = MemorySource::new();
        source.insert("b1", ["first", "second"]);
        source.corrupt_page("b1", 2);
        assert_eq!(source.fetch_page_text("b1", 1).unwrap(), "first");
        assert_eq!(
            source.fetch_page_text("b1", 2),
            Err(ExtractionError::Page { page: 2, reason: "corrupt page".into() })
        );
    }
}
