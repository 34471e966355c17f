use crate::{CharRatioEstimator, Error, Result, StrategyKind, token::DEFAULT_CHARS_PER_TOKEN};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Upper bound for the default worker count.
const MAX_DEFAULT_PARALLEL: usize = 16;

pub const ENV_MAX_PARALLEL: &str = "CODEPAGER_MAX_PARALLEL";
pub const ENV_TOKEN_BUDGET: &str = "CODEPAGER_TOKEN_BUDGET";
pub const ENV_CONTEXT_SECRET: &str = "CODEPAGER_CONTEXT_SECRET";

/// Configuration for analysis and pagination.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```
/// use codepager::{PagerConfig, StrategyKind};
///
/// let config = PagerConfig::from_toml_str(r#"
///     max_parallel = 4
///     token_budget = 2000
///     strategy = "chunk_by_chunk"
/// "#).unwrap();
///
/// assert_eq!(config.max_parallel, 4);
/// assert_eq!(config.strategy, StrategyKind::ChunkByChunk);
/// assert!(!config.drop_failed);
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PagerConfig {
    /// Maximum number of units analyzed at the same time
    pub max_parallel: usize,

    /// Maximum estimated tokens per chunk
    pub token_budget: usize,

    /// Chunking policy used when a page request does not name one
    pub strategy: StrategyKind,

    /// Per-unit analysis timeout in milliseconds
    pub per_unit_timeout_ms: Option<u64>,

    /// Ratio of the default token cost model
    pub chars_per_token: f64,

    /// Exclude failed units from chunks instead of paging them
    pub drop_failed: bool,

    /// Files larger than this are skipped by the file analyzer
    pub max_file_size: u64,

    /// How long a finished run stays available for paging
    pub run_ttl_secs: u64,

    /// Shared secret mixed into continuation token checksums
    pub context_secret: Option<String>,

    /// Directory names never walked by the filesystem source
    pub ignore_dirs: Vec<String>,

    /// Also analyze files in languages without a dedicated analyzer
    pub include_unknown: bool,
}

impl Default for PagerConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            max_parallel: parallelism.min(MAX_DEFAULT_PARALLEL),
            token_budget: 4000,
            strategy: StrategyKind::default(),
            per_unit_timeout_ms: None,
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
            drop_failed: false,
            max_file_size: 10 * 1024 * 1024,
            run_ttl_secs: 30 * 60,
            context_secret: None,
            ignore_dirs: vec![
                "target".to_string(),
                "node_modules".to_string(),
                ".git".to_string(),
            ],
            include_unknown: false,
        }
    }
}

impl PagerConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Configuration(e.to_string()))
    }

    /// Load a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_MAX_PARALLEL) {
            self.max_parallel = parse_usize(ENV_MAX_PARALLEL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_TOKEN_BUDGET) {
            self.token_budget = parse_usize(ENV_TOKEN_BUDGET, &raw)?;
        }
        if let Some(secret) = lookup(ENV_CONTEXT_SECRET).filter(|s| !s.is_empty()) {
            self.context_secret = Some(secret);
        }
        Ok(self)
    }

    /// Check every tunable. Runs fail fast on the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.max_parallel == 0 {
            return Err(Error::Configuration(
                "max_parallel must be a positive integer".to_string(),
            ));
        }
        if self.token_budget == 0 {
            return Err(Error::Configuration(
                "token_budget must be a positive integer".to_string(),
            ));
        }
        if self.per_unit_timeout_ms == Some(0) {
            return Err(Error::Configuration(
                "per_unit_timeout_ms must be positive when set".to_string(),
            ));
        }
        if self.run_ttl_secs == 0 {
            return Err(Error::Configuration(
                "run_ttl_secs must be positive".to_string(),
            ));
        }
        CharRatioEstimator::try_new(self.chars_per_token)?;
        Ok(())
    }

    pub fn per_unit_timeout(&self) -> Option<Duration> {
        self.per_unit_timeout_ms.map(Duration::from_millis)
    }

    pub fn run_ttl(&self) -> Duration {
        Duration::from_secs(self.run_ttl_secs)
    }
}

fn parse_usize(key: &str, raw: &str) -> Result<usize> {
    raw.trim()
        .parse::<usize>()
        .map_err(|_| Error::Configuration(format!("{} must be an integer, got {:?}", key, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = PagerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.max_parallel >= 1 && config.max_parallel <= MAX_DEFAULT_PARALLEL);
        assert_eq!(config.strategy, StrategyKind::Smart);
    }

    #[test]
    fn test_rejects_zero_tunables() {
        let config = PagerConfig {
            max_parallel: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = PagerConfig {
            token_budget: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));

        let config = PagerConfig {
            chars_per_token: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_toml_errors_are_configuration_errors() {
        assert!(matches!(
            PagerConfig::from_toml_str("max_parallel = -1"),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            PagerConfig::from_toml_str("strategy = \"random\""),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            PagerConfig::from_toml_str("no_such_key = 1"),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = PagerConfig::default()
            .with_overrides_from(|key| match key {
                ENV_MAX_PARALLEL => Some("3".to_string()),
                ENV_CONTEXT_SECRET => Some("s3cret".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.max_parallel, 3);
        assert_eq!(config.token_budget, 4000);
        assert_eq!(config.context_secret.as_deref(), Some("s3cret"));

        let err = PagerConfig::default()
            .with_overrides_from(|key| (key == ENV_TOKEN_BUDGET).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("codepager.toml");
        std::fs::write(&path, "token_budget = 123\nper_unit_timeout_ms = 500\n").unwrap();
        let config = PagerConfig::load(&path).unwrap();
        assert_eq!(config.token_budget, 123);
        assert_eq!(config.per_unit_timeout(), Some(Duration::from_millis(500)));
    }
}
