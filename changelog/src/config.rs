//! Configuration for the changelog pipeline.

use clog_store::{Backend, StoreConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::sources::{LogOptions, CHROMESTATUS_URL, GITILES_URL};
use crate::version::Milestone;

/// Earliest milestone tracked by default (V8 7.0)
pub const DEFAULT_FLOOR: Milestone = 70;

/// Full configuration, loadable from JSON and overridden by the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClogConfig {
    /// Path prefix of every collection
    pub data_prefix: String,
    pub backend: Backend,
    pub chromestatus_url: String,
    pub gitiles_url: String,
    /// Minimum spacing between gitiles requests
    pub gitiles_interval_ms: u64,
    /// Read commits from this local clone instead of gitiles
    pub git_dir: Option<PathBuf>,
    /// Only count commits touching this path (e.g. `include/`)
    pub path_filter: Option<String>,
    /// Commit log requests per wave
    pub fan_out: usize,
    /// Upper bound on commits per release
    pub log_limit: usize,
    pub floor: Milestone,
    /// Feature categories tracked
    pub categories: Vec<String>,
    /// How long the current channel lookup is trusted
    pub latest_ttl_secs: u64,
    pub cache_capacity: usize,
}

impl Default for ClogConfig {
    fn default() -> Self {
        Self {
            data_prefix: "data/".to_string(),
            backend: Backend::Json,
            chromestatus_url: CHROMESTATUS_URL.to_string(),
            gitiles_url: GITILES_URL.to_string(),
            gitiles_interval_ms: 333,
            git_dir: None,
            path_filter: None,
            fan_out: 20,
            log_limit: 10_000,
            floor: DEFAULT_FLOOR,
            categories: vec!["JavaScript".to_string(), "WebAssembly".to_string()],
            latest_ttl_secs: 3600,
            cache_capacity: 256,
        }
    }
}

impl ClogConfig {
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(self.backend, self.data_prefix.clone())
    }

    pub fn settings(&self) -> Settings {
        Settings {
            floor: self.floor,
            fan_out: self.fan_out.max(1),
            categories: self.categories.clone(),
            log_options: LogOptions {
                path_filter: self.path_filter.clone(),
                no_merges: true,
                limit: self.log_limit,
            },
        }
    }

    pub fn gitiles_interval(&self) -> Duration {
        Duration::from_millis(self.gitiles_interval_ms)
    }

    pub fn latest_ttl(&self) -> Duration {
        Duration::from_secs(self.latest_ttl_secs)
    }
}

/// The part of the configuration the aggregation pipeline reads
#[derive(Debug, Clone)]
pub struct Settings {
    pub floor: Milestone,
    pub fan_out: usize,
    pub categories: Vec<String>,
    pub log_options: LogOptions,
}

impl Default for Settings {
    fn default() -> Self {
        ClogConfig::default().settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClogConfig::default();
        assert_eq!(config.floor, 70);
        assert_eq!(config.backend, Backend::Json);
        assert_eq!(config.categories, vec!["JavaScript", "WebAssembly"]);

        let settings = config.settings();
        assert!(settings.log_options.no_merges);
        assert_eq!(settings.log_options.limit, 10_000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ClogConfig =
            serde_json::from_str(r#"{"backend": "kv", "fan_out": 0, "path_filter": "include/"}"#)
                .unwrap();
        assert_eq!(config.backend, Backend::Kv);
        assert_eq!(config.data_prefix, "data/");
        assert_eq!(config.settings().fan_out, 1);
        assert_eq!(
            config.settings().log_options.path_filter.as_deref(),
            Some("include/")
        );
    }
}
