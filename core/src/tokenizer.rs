use crate::config::TokenizerConfig;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    // Letters, combining marks and digits. Everything else (hyphens and apostrophes included) separates tokens.
    static ref RE: Regex = Regex::new(r"[\p{L}\p{M}\p{N}]+").expect("valid regex");
}

/// Splits text into normalized tokens. The same instance must be used for
/// ingestion and for queries, otherwise exact matching breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tokenizer {
    min_token_len: usize,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new(1)
    }
}

impl Tokenizer {
    pub fn new(min_token_len: usize) -> Self {
        Self { min_token_len: min_token_len.max(1) }
    }

    pub fn from_config(config: &TokenizerConfig) -> Self {
        Self::new(config.min_token_len)
    }

    pub fn min_token_len(&self) -> usize {
        self.min_token_len
    }

    /// Tokenize text into (token, offset) using NFKC normalization and lowercasing.
    ///
    /// The offset is the ordinal of the token in the page's token stream, counted
    /// before short tokens are dropped.
    pub fn tokenize(&self, text: &str) -> Vec<(String, u32)> {
        let normalized = text.nfkc().collect::<String>().to_lowercase();
        let mut tokens = Vec::new();
        for (pos, mat) in RE.find_iter(&normalized).enumerate() {
            let token = mat.as_str();
            if token.chars().count() < self.min_token_len {
                continue;
            }
            tokens.push((token.to_string(), offset(pos)));
        }
        tokens
    }

    /// Distinct query keywords in first-seen order.
    pub fn keywords(&self, query: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.tokenize(query)
            .into_iter()
            .map(|(token, _)| token)
            .filter(|token| seen.insert(token.clone()))
            .collect()
    }
}

/// Saturates past `u32::MAX` tokens instead of wrapping.
fn offset(pos: usize) -> u32 {
    u32::try_from(pos).unwrap_or(u32::MAX)
}
