//! Configuration resolution for jk-consolidate
//!
//! Runtime parameters come from three places:
//! - the database `settings` table (seeded with defaults at startup)
//! - the TOML config file
//! - command-line overrides applied by the binary
//!
//! For tunables the TOML value, when present, overrides the database value.
//! The comparator API key resolves Database → ENV → TOML, like other
//! credentials.

use jk_common::config::TomlConfig;
use jk_common::{Error, Result};
use sqlx::{Pool, Sqlite};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::services::semantic_comparator::{
    HeuristicComparator, HttpSemanticComparator, ResilientComparator, SemanticComparator,
};

/// Environment variable holding the comparator API key
pub const API_KEY_ENV: &str = "JK_COMPARATOR_API_KEY";

/// Resolve the comparator API key from 3-tier configuration
///
/// **Priority:** Database → ENV → TOML
///
/// A missing key is not an error: the endpoint may not require one.
pub async fn resolve_comparator_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    resolve_comparator_api_key_from(db, toml_config, std::env::var(API_KEY_ENV).ok()).await
}

async fn resolve_comparator_api_key_from(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
    env_key: Option<String>,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_comparator_api_key(db).await?;
    let env_key = env_key.filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .comparator
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        db_key.as_ref().map(|_| "database"),
        env_key.as_ref().map(|_| "environment"),
        toml_key.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "Comparator API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    if let Some(key) = db_key {
        info!("Comparator API key loaded from database");
        return Ok(Some(key));
    }
    if let Some(key) = env_key {
        info!("Comparator API key loaded from environment variable");
        return Ok(Some(key));
    }
    if let Some(key) = toml_key {
        info!("Comparator API key loaded from TOML config");
        return Ok(Some(key));
    }

    Ok(None)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Effective parameters for one invocation
#[derive(Debug, Clone)]
pub struct ConsolidationSettings {
    pub threshold: f64,
    pub min_semantic_confidence: f64,
    pub comparator_endpoint: Option<String>,
    pub comparator_api_key: Option<String>,
    pub comparator_timeout_ms: u64,
    pub comparator_max_attempts: u32,
    pub max_lock_wait_ms: u64,
    /// Where JSON run reports are written
    pub report_dir: PathBuf,
}

impl ConsolidationSettings {
    /// Merge database settings with TOML overrides
    pub async fn load(db: &Pool<Sqlite>, toml_config: &TomlConfig, root_folder: &Path) -> Result<Self> {
        use crate::db::settings;

        let toml = &toml_config.consolidation;
        let comparator = &toml_config.comparator;

        let threshold = match toml.threshold {
            Some(value) => value,
            None => settings::get_similarity_threshold(db).await?,
        };
        let min_semantic_confidence = match toml.min_semantic_confidence {
            Some(value) => value,
            None => settings::get_semantic_min_confidence(db).await?,
        };
        let comparator_timeout_ms = match comparator.timeout_ms {
            Some(value) => value,
            None => settings::get_comparator_timeout_ms(db).await?,
        };
        let comparator_max_attempts = match comparator.max_attempts {
            Some(value) => value,
            None => settings::get_comparator_max_attempts(db).await?,
        };

        let loaded = Self {
            threshold,
            min_semantic_confidence,
            comparator_endpoint: comparator.endpoint.clone().filter(|e| !e.trim().is_empty()),
            comparator_api_key: resolve_comparator_api_key(db, toml_config).await?,
            comparator_timeout_ms,
            comparator_max_attempts,
            max_lock_wait_ms: settings::get_max_lock_wait_ms(db).await?,
            report_dir: toml
                .report_dir
                .clone()
                .unwrap_or_else(|| root_folder.join("consolidation_reports")),
        };
        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values outside their meaningful ranges
    pub fn validate(&self) -> Result<()> {
        validate_threshold(self.threshold)?;
        if !(0.0..=1.0).contains(&self.min_semantic_confidence) {
            return Err(Error::Config(format!(
                "semantic_min_confidence must be within 0.0-1.0, got {}",
                self.min_semantic_confidence
            )));
        }
        if self.comparator_max_attempts == 0 {
            return Err(Error::Config("comparator_max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    /// HTTP comparator when an endpoint is configured, otherwise the offline one
    pub fn build_comparator(&self) -> Result<ResilientComparator> {
        let inner: Arc<dyn SemanticComparator> = match &self.comparator_endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "Using HTTP semantic comparator");
                Arc::new(
                    HttpSemanticComparator::new(endpoint.clone(), self.comparator_api_key.clone())
                        .map_err(|e| Error::Config(format!("Comparator setup failed: {}", e)))?,
                )
            }
            None => {
                info!("No comparator endpoint configured, using offline heuristic comparator");
                Arc::new(HeuristicComparator::new())
            }
        };

        Ok(ResilientComparator::new(
            inner,
            self.comparator_timeout_ms,
            self.comparator_max_attempts,
        ))
    }
}

/// Similarity threshold must lie in (0, 1]
pub fn validate_threshold(threshold: f64) -> Result<()> {
    if !(threshold > 0.0 && threshold <= 1.0) {
        return Err(Error::InvalidInput(format!(
            "similarity threshold must be within (0.0, 1.0], got {}",
            threshold
        )));
    }
    Ok(())
}
