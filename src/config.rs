//! Engine configuration (spec §4.7). Loadable from a TOML file; every
//! field defaults to the value spec.md lists as normative.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub idle_ms: u64,
    pub min_session_duration_ms: u64,
    pub max_session_duration_ms: u64,
    pub flush_batch_size: usize,
    pub flush_interval_ms: u64,
    pub dedup_window_ms: u64,
    pub min_files_for_dedup: usize,
    pub dedup_cache_size: usize,
    pub blob_grace_ms: u64,
    pub journal_retention_ms: u64,
    pub ignore_patterns: Vec<String>,
    pub writer_lock_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idle_ms: 105_000,
            min_session_duration_ms: 5_000,
            max_session_duration_ms: 3_600_000,
            flush_batch_size: 50,
            flush_interval_ms: 5_000,
            dedup_window_ms: 300_000,
            min_files_for_dedup: 5,
            dedup_cache_size: 100,
            blob_grace_ms: 86_400_000,
            journal_retention_ms: 604_800_000,
            ignore_patterns: vec![
                "**/node_modules/**".into(),
                "**/target/**".into(),
                "**/.git/**".into(),
                "**/dist/**".into(),
                "**/build/**".into(),
            ],
            writer_lock_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| crate::core::EngineError::ManifestCorrupt(e.to_string()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.idle_ms, 105_000);
        assert_eq!(cfg.max_session_duration_ms, 3_600_000);
        assert_eq!(cfg.min_files_for_dedup, 5);
        assert_eq!(cfg.dedup_cache_size, 100);
    }

    #[test]
    fn round_trips_through_toml() {
        let cfg = EngineConfig::default();
        let text = toml::to_string(&cfg).unwrap();
        let parsed: EngineConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.idle_ms, cfg.idle_ms);
    }
}
