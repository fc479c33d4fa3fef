//! Engine configuration. Every field has a default so a partial JSON file is
//! enough to override a single knob.

use crate::error::{FolioError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FolioConfig {
    pub tokenizer: TokenizerConfig,
    pub indexing: IndexingConfig,
    pub search: SearchConfig,
    pub ranking: RankingWeights,
    pub store: StoreConfig,
}

impl FolioConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FolioError::Config(format!("reading {}: {e}", path.display())))?;
        let config: FolioConfig = serde_json::from_str(&raw)
            .map_err(|e| FolioError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| FolioError::Config(e.to_string()))?;
        std::fs::write(path, json).map_err(|e| FolioError::Config(format!("writing {}: {e}", path.display())))
    }

    pub fn validate(&self) -> Result<()> {
        self.tokenizer.validate()?;
        self.indexing.validate()?;
        self.search.validate()?;
        self.ranking.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    /// Tokens with fewer characters are dropped.
    pub min_token_len: usize,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self { min_token_len: 1 }
    }
}

impl TokenizerConfig {
    fn validate(&self) -> Result<()> {
        if self.min_token_len == 0 {
            return Err(FolioError::Config("tokenizer.min_token_len must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexingConfig {
    /// Size of the worker pool that extracts and indexes pages.
    pub page_workers: usize,
    /// Target page length when a text upload has no form-feed page breaks.
    pub page_chars: usize,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self { page_workers: 4, page_chars: 2000 }
    }
}

impl IndexingConfig {
    fn validate(&self) -> Result<()> {
        if self.page_workers == 0 {
            return Err(FolioError::Config("indexing.page_workers must be at least 1".into()));
        }
        if self.page_chars == 0 {
            return Err(FolioError::Config("indexing.page_chars must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub default_limit: usize,
    /// Requested limits above this are clamped.
    pub max_limit: usize,
    pub timeout_ms: u64,
    /// Zero disables the result cache.
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 20, max_limit: 100, timeout_ms: 5_000, cache_ttl_secs: 300, cache_capacity: 1024 }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.max_limit == 0 {
            return Err(FolioError::Config("search.max_limit must be at least 1".into()));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(FolioError::Config(format!(
                "search.default_limit must be between 1 and {}",
                self.max_limit
            )));
        }
        if self.timeout_ms == 0 {
            return Err(FolioError::Config("search.timeout_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Weights of the three ranking factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingWeights {
    /// Fraction of query keywords found in the document.
    pub keyword_weight: f64,
    /// Total matches relative to the best candidate.
    pub matches_weight: f64,
    /// Matched pages relative to the document's page count.
    pub coverage_weight: f64,
}

impl Default for RankingWeights {
    fn default() -> Self {
        Self { keyword_weight: 0.5, matches_weight: 0.3, coverage_weight: 0.2 }
    }
}

impl RankingWeights {
    fn validate(&self) -> Result<()> {
        let weights = [
            ("keyword_weight", self.keyword_weight),
            ("matches_weight", self.matches_weight),
            ("coverage_weight", self.coverage_weight),
        ];
        for (name, w) in weights {
            if !w.is_finite() || w < 0.0 {
                return Err(FolioError::Config(format!("ranking.{name} must be a finite non-negative number")));
            }
        }
        if weights.iter().all(|(_, w)| *w == 0.0) {
            return Err(FolioError::Config("at least one ranking weight must be positive".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub read_retries: u32,
    pub write_retries: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { read_retries: 3, write_retries: 3, backoff_base_ms: 10, backoff_max_ms: 250 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        FolioConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let cfg: FolioConfig = serde_json::from_str(r#"{"ranking": {"keyword_weight": 2.0}}"#).unwrap();
        assert_eq!(cfg.ranking.keyword_weight, 2.0);
        assert_eq!(cfg.ranking.matches_weight, 0.3);
        assert_eq!(cfg.search.default_limit, 20);
    }

    #[test]
    fn rejects_default_limit_above_max() {
        let mut cfg = FolioConfig::default();
        cfg.search.default_limit = 500;
        assert!(matches!(cfg.validate(), Err(FolioError::Config(_))));
    }

    #[test]
    fn rejects_negative_or_all_zero_weights() {
        let mut cfg = FolioConfig::default();
        cfg.ranking.coverage_weight = -1.0;
        assert!(cfg.validate().is_err());

        cfg.ranking = RankingWeights { keyword_weight: 0.0, matches_weight: 0.0, coverage_weight: 0.0 };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.json");
        let mut cfg = FolioConfig::default();
        cfg.indexing.page_workers = 8;
        cfg.save(&path).unwrap();
        assert_eq!(FolioConfig::load(&path).unwrap(), cfg);
    }
}
