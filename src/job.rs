//! Job definitions and task expansion.
//!
//! This module defines the declarative side of a harvest run:
//!
//! - `Job`: a configured unit of work naming a source and its keywords
//! - `Task`: one job/keyword pair, the atomic unit the engine executes
//! - `collect_tasks`: deterministic expansion of jobs into tasks

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque parameter bag forwarded to the source handler untouched.
pub type ParamMap = serde_json::Map<String, serde_json::Value>;

/// A declarative unit of configuration: one source, a keyword list, and
/// handler parameters.
///
/// Jobs are normally deserialized from the config file, but can also be
/// built programmatically for tests and embedders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    /// Unique identifier for this job.
    pub id: String,
    /// Registry key selecting the handler that executes this job's tasks.
    pub source: String,
    /// Keywords to expand into tasks. A job with no keywords expands to
    /// no tasks.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Handler-specific parameters, passed through uninterpreted.
    #[serde(default, alias = "params")]
    pub parameters: ParamMap,
    /// Disabled jobs are dropped during expansion.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Job {
    /// Creates an enabled job with no keywords and no parameters.
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            keywords: Vec::new(),
            parameters: ParamMap::new(),
            enabled: true,
        }
    }

    /// Sets the keyword list.
    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the handler parameter bag.
    pub fn with_parameters(mut self, parameters: ParamMap) -> Self {
        self.parameters = parameters;
        self
    }

    /// Marks the job as disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Atomic unit of execution: one keyword of one job.
///
/// Tasks of the same job share a single `Arc<Job>` allocation; cloning a
/// task is cheap.
#[derive(Debug, Clone)]
pub struct Task {
    /// The owning job.
    pub job: Arc<Job>,
    /// The expanded keyword, already trimmed and non-empty.
    pub keyword: String,
}

impl Task {
    /// Creates a task for the given job and keyword.
    pub fn new(job: Arc<Job>, keyword: impl Into<String>) -> Self {
        Self {
            job,
            keyword: keyword.into(),
        }
    }

    /// Id of the owning job.
    pub fn job_id(&self) -> &str {
        &self.job.id
    }

    /// Source key of the owning job.
    pub fn source(&self) -> &str {
        &self.job.source
    }
}

/// Expands jobs into tasks, applying optional id and source filters.
///
/// An empty filter slice means no filtering on that axis; a non-empty
/// slice admits only exact matches. Keywords are trimmed and empty
/// keywords are dropped. The expansion is pure: same inputs always
/// produce the same tasks in the same order (jobs in input order,
/// keywords in declaration order).
pub fn collect_tasks(jobs: &[Job], job_ids: &[String], sources: &[String]) -> Vec<Task> {
    let mut tasks = Vec::new();

    for job in jobs {
        if !job.enabled {
            continue;
        }
        if !job_ids.is_empty() && !job_ids.iter().any(|id| id == &job.id) {
            continue;
        }
        if !sources.is_empty() && !sources.iter().any(|s| s == &job.source) {
            continue;
        }

        let shared = Arc::new(job.clone());
        for raw in &shared.keywords {
            let keyword = raw.trim();
            if keyword.is_empty() {
                continue;
            }
            tasks.push(Task::new(Arc::clone(&shared), keyword));
        }
    }

    tasks
}
