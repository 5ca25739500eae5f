//! Harvest configuration loading.
//!
//! The config file is a single JSON document with two optional sections:
//! a `global` block of engine settings and a `jobs` array. Document-level
//! problems fail the load; individual job records are parsed leniently
//! and dropped with a warning when malformed, so one bad record never
//! takes down the rest of the file.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::engine::{BackoffPolicy, EngineConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_RETRY_LIMIT};
use crate::job::Job;

/// Errors that can occur while loading a config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// IO error while reading the file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The document is not valid JSON or has the wrong top-level shape.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine settings from the config file's `global` section.
///
/// Every field is optional; unset fields fall back to CLI overrides and
/// then to built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalSettings {
    /// Maximum number of concurrent handler invocations.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
    /// Retries after the first failed attempt.
    #[serde(default)]
    pub retry_limit: Option<u32>,
    /// Two-element `[min, max]` backoff range in seconds.
    #[serde(default)]
    pub retry_backoff_seconds: Option<Vec<f64>>,
}

impl GlobalSettings {
    /// Folds CLI overrides and file settings into an engine config.
    ///
    /// Precedence per knob: explicit override, then the config file,
    /// then the built-in default.
    pub fn engine_config(
        &self,
        concurrency_override: Option<usize>,
        retry_override: Option<u32>,
    ) -> EngineConfig {
        let max_concurrency = concurrency_override
            .or(self.max_concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY);
        let retry_limit = retry_override
            .or(self.retry_limit)
            .unwrap_or(DEFAULT_RETRY_LIMIT);

        EngineConfig {
            max_concurrency,
            retry_limit,
            backoff: self.backoff_policy(),
        }
    }

    /// Backoff policy from the configured range.
    ///
    /// A list that is not exactly two elements long is replaced by the
    /// default range with a warning. Reversed bounds are normalized by
    /// the policy itself.
    fn backoff_policy(&self) -> BackoffPolicy {
        match self.retry_backoff_seconds.as_deref() {
            Some([min, max]) => BackoffPolicy::new(*min, *max),
            Some(other) => {
                warn!(
                    len = other.len(),
                    "retry_backoff_seconds must have exactly two elements, using default range"
                );
                BackoffPolicy::default()
            }
            None => BackoffPolicy::default(),
        }
    }
}

/// Top-level parsed configuration: global engine settings plus the jobs
/// that survived record validation.
#[derive(Debug, Clone, Default)]
pub struct HarvestConfig {
    /// Engine settings from the `global` section.
    pub global: GlobalSettings,
    /// Parsed job records, in file order.
    pub jobs: Vec<Job>,
}

/// Wire shape of the document; job records stay raw so each one can be
/// validated independently.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    global: GlobalSettings,
    #[serde(default)]
    jobs: Vec<serde_json::Value>,
}

impl HarvestConfig {
    /// Loads and parses a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json(&contents)
    }

    /// Parses a config document from a JSON string.
    pub fn from_json(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(contents)?;

        let mut jobs = Vec::with_capacity(raw.jobs.len());
        for (index, record) in raw.jobs.into_iter().enumerate() {
            match serde_json::from_value::<Job>(record) {
                Ok(job) => jobs.push(job),
                Err(err) => {
                    warn!(index, error = %err, "dropping malformed job record");
                }
            }
        }

        Ok(Self {
            global: raw.global,
            jobs,
        })
    }
}
