//! Relevance scoring and ordering of search candidates.
//!
//! The score is a weighted sum of three factors, each in `[0, 1]`:
//!
//! - keyword coverage: `|keywords_found| / |K|`
//! - match volume: `total_matches / max(total_matches over all candidates)`
//! - page coverage: `|pages| / total_pages`
//!
//! Results are ordered by score, then total matches (descending), then title
//! and document id (ascending), which is a total order.

use crate::config::RankingWeights;
use crate::index::{Candidate, DocId, PageNumber};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub book_id: DocId,
    pub title: String,
    pub author: String,
    pub pages: Vec<PageNumber>,
    pub total_matches: u64,
    pub keywords_found: Vec<String>,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    /// Candidates before truncation to the limit.
    pub total_results: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Ranker {
    weights: RankingWeights,
}

impl Ranker {
    pub fn new(weights: RankingWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> RankingWeights {
        self.weights
    }

    pub fn score(
        &self,
        keywords_found: usize,
        keyword_count: usize,
        total_matches: u64,
        max_matches: u64,
        pages_matched: usize,
        total_pages: u32,
    ) -> f64 {
        let keyword_factor = ratio(keywords_found as f64, keyword_count as f64);
        let matches_factor = ratio(total_matches as f64, max_matches.max(total_matches) as f64);
        let coverage_factor = ratio(pages_matched as f64, total_pages as f64);
        self.weights.keyword_weight * keyword_factor
            + self.weights.matches_weight * matches_factor
            + self.weights.coverage_weight * coverage_factor
    }

    /// Score, order and truncate. `keyword_count` is the size of the query's keyword set.
    pub fn rank(&self, candidates: Vec<Candidate>, keyword_count: usize, limit: usize) -> SearchResults {
        let total_results = candidates.len();
        let max_matches = candidates.iter().map(|c| c.total_matches).max().unwrap_or(0);

        let mut scored: Vec<(f64, Candidate)> = candidates
            .into_iter()
            .map(|c| {
                let score = self.score(
                    c.keywords_found.len(),
                    keyword_count,
                    c.total_matches,
                    max_matches,
                    c.pages.len(),
                    c.document.total_pages,
                );
                (score, c)
            })
            .collect();
        scored.sort_by(|(sa, a), (sb, b)| compare(*sa, a, *sb, b));

        let results = scored
            .into_iter()
            .take(limit)
            .map(|(score, c)| SearchHit {
                book_id: c.document.id,
                title: c.document.title,
                author: c.document.author,
                pages: c.pages,
                total_matches: c.total_matches,
                keywords_found: c.keywords_found,
                relevance_score: score,
            })
            .collect();
        SearchResults { total_results, results }
    }
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        (part / whole).min(1.0)
    }
}

fn compare(score_a: f64, a: &Candidate, score_b: f64, b: &Candidate) -> Ordering {
    score_b
        .total_cmp(&score_a)
        .then_with(|| b.total_matches.cmp(&a.total_matches))
        .then_with(|| a.document.title.cmp(&b.document.title))
        .then_with(|| a.document.id.cmp(&b.document.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{Document, DocumentDraft, DocumentStatus};

    fn candidate(id: DocId, title: &str, total_pages: u32, matches: u64, pages: Vec<u32>, kws: &[&str]) -> Candidate {
        let mut document = Document::new(
            id,
            DocumentDraft { title: title.into(), author: "anon".into(), ..Default::default() },
            total_pages,
            format!("{id}.txt"),
        );
        document.status = DocumentStatus::Active;
        Candidate { document, total_matches: matches, pages, keywords_found: kws.iter().map(|s| s.to_string()).collect() }
    }

    #[test]
    fn more_keywords_rank_first() {
        let ranker = Ranker::default();
        let both = candidate(1, "Both", 10, 2, vec![1], &["radar", "missile"]);
        let one = candidate(2, "One", 10, 2, vec![1], &["radar"]);
        let out = ranker.rank(vec![one, both], 2, 20);
        assert_eq!(out.results[0].book_id, 1);
        assert!(out.results[0].relevance_score > out.results[1].relevance_score);
    }

    #[test]
    fn ties_break_on_matches_then_title() {
        let ranker = Ranker::new(RankingWeights { keyword_weight: 1.0, matches_weight: 0.0, coverage_weight: 0.0 });
        let a = candidate(1, "Zulu", 5, 9, vec![1], &["radar"]);
        let b = candidate(2, "Alpha", 5, 3, vec![1], &["radar"]);
        let c = candidate(3, "Bravo", 5, 3, vec![1], &["radar"]);
        let out = ranker.rank(vec![c, b, a], 1, 20);
        let ids: Vec<DocId> = out.results.iter().map(|h| h.book_id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn truncates_but_reports_total() {
        let ranker = Ranker::default();
        let cands = (1..=5).map(|i| candidate(i, "T", 3, i, vec![1], &["radar"])).collect();
        let out = ranker.rank(cands, 1, 2);
        assert_eq!(out.total_results, 5);
        assert_eq!(out.results.len(), 2);
        assert_eq!(out.results[0].book_id, 5);
    }

    #[test]
    fn zero_page_documents_get_no_coverage() {
        let ranker = Ranker::new(RankingWeights { keyword_weight: 0.0, matches_weight: 0.0, coverage_weight: 1.0 });
        assert_eq!(ranker.score(1, 1, 1, 1, 1, 0), 0.0);
        assert_eq!(ranker.score(1, 1, 1, 1, 3, 2), 1.0);
    }
}
