//! Execution engine: bounded-concurrency task running with retry/backoff.
//!
//! This module provides the runtime half of a harvest run:
//!
//! - `EngineConfig`: tuning knobs (concurrency limit, retry limit, backoff)
//! - `BackoffPolicy`: randomized, attempt-scaled delays between retries
//! - `Engine`: executes tasks against registered handlers
//! - `Outcome` / `RunSummary`: per-task results and run-level counts
//!
//! Concurrency is bounded by a single semaphore shared by all tasks of a
//! run. A permit is held only while a handler invocation is in flight;
//! tasks waiting out a backoff delay do not occupy a slot.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use crate::job::Task;
use crate::registry::HandlerRegistry;

/// Default number of concurrently executing handler invocations.
pub const DEFAULT_MAX_CONCURRENCY: usize = 2;

/// Default number of retries after the first failed attempt.
pub const DEFAULT_RETRY_LIMIT: u32 = 2;

/// Default backoff sampling bounds in seconds.
pub const DEFAULT_BACKOFF_SECS: (f64, f64) = (5.0, 20.0);

/// Errors that can occur when constructing an engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The concurrency limit must admit at least one task.
    #[error("max_concurrency must be at least 1, got {0}")]
    InvalidConcurrency(usize),
}

/// Randomized, attempt-scaled retry delay policy.
///
/// The delay before retry number `attempt` (counting from 1) is
/// `base * (1 + (attempt - 1) * 0.3) + jitter`, where `base` is drawn
/// uniformly from the configured bounds and `jitter` uniformly from
/// `[0, 1)` seconds. The linear scaling keeps expected delays growing
/// with the attempt number; the jitter de-synchronizes tasks that drew
/// identical bases.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffPolicy {
    min_secs: f64,
    max_secs: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_SECS.0, DEFAULT_BACKOFF_SECS.1)
    }
}

impl BackoffPolicy {
    /// Creates a policy from the given bounds in seconds.
    ///
    /// Reversed bounds are accepted and swapped, so `min <= max` always
    /// holds once the policy exists.
    pub fn new(min_secs: f64, max_secs: f64) -> Self {
        if min_secs <= max_secs {
            Self { min_secs, max_secs }
        } else {
            Self {
                min_secs: max_secs,
                max_secs: min_secs,
            }
        }
    }

    /// Lower sampling bound in seconds.
    pub fn min_secs(&self) -> f64 {
        self.min_secs
    }

    /// Upper sampling bound in seconds.
    pub fn max_secs(&self) -> f64 {
        self.max_secs
    }

    /// Samples the delay to wait before the given retry attempt.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delay_with(&mut rand::rng(), attempt)
    }

    /// Samples with a caller-provided RNG, for reproducible tests.
    pub fn delay_with<R: RngExt>(&self, rng: &mut R, attempt: u32) -> Duration {
        let base = rng.random_range(self.min_secs..=self.max_secs);
        let jitter = rng.random_range(0.0..1.0);
        let scale = 1.0 + f64::from(attempt.saturating_sub(1)) * 0.3;
        // Bounds can be configured at or below zero; a Duration cannot.
        Duration::from_secs_f64((base * scale + jitter).max(0.0))
    }
}

/// Tuning knobs for a run.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Maximum number of handler invocations in flight at once.
    pub max_concurrency: usize,
    /// Retries after the first failed attempt; a task makes at most
    /// `retry_limit + 1` attempts.
    pub retry_limit: u32,
    /// Delay policy between attempts.
    pub backoff: BackoffPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry_limit: DEFAULT_RETRY_LIMIT,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Sets the concurrency limit.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Sets the retry limit.
    pub fn with_retry_limit(mut self, retry_limit: u32) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Sets the backoff policy.
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Final status of an executed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// The handler returned a payload within the attempt budget.
    Success,
    /// Every attempt errored.
    Failed,
    /// No handler is registered for the task's source.
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Success => write!(f, "success"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

/// Result of executing a single task. Immutable once produced.
#[derive(Debug, Clone)]
pub struct Outcome {
    /// The task that was executed.
    pub task: Task,
    /// Final status.
    pub status: TaskStatus,
    /// Number of handler invocations performed (0 when skipped).
    pub attempts: u32,
    /// Record count when the handler payload was countable.
    pub item_count: Option<usize>,
    /// Final error message for failed and skipped tasks.
    pub error: Option<String>,
    /// Wall time of the final attempt's invocation.
    pub duration: Duration,
}

impl Outcome {
    fn success(task: Task, attempts: u32, item_count: Option<usize>, duration: Duration) -> Self {
        Self {
            task,
            status: TaskStatus::Success,
            attempts,
            item_count,
            error: None,
            duration,
        }
    }

    fn failed(task: Task, attempts: u32, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            task,
            status: TaskStatus::Failed,
            attempts,
            item_count: None,
            error: Some(error.into()),
            duration,
        }
    }

    fn skipped(task: Task, error: impl Into<String>) -> Self {
        Self {
            task,
            status: TaskStatus::Skipped,
            attempts: 0,
            item_count: None,
            error: Some(error.into()),
            duration: Duration::ZERO,
        }
    }

    /// Returns whether the task succeeded.
    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }
}

/// Partition counts for a completed run.
///
/// Every input task lands in exactly one bucket, so
/// `total == success + failed + skipped` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Number of tasks executed.
    pub total: usize,
    /// Tasks whose handler returned a payload.
    pub success: usize,
    /// Tasks that exhausted their attempt budget.
    pub failed: usize,
    /// Tasks with no registered handler.
    pub skipped: usize,
}

impl RunSummary {
    /// Reduces a slice of outcomes into partition counts.
    pub fn from_outcomes(outcomes: &[Outcome]) -> Self {
        let mut summary = Self::default();
        for outcome in outcomes {
            summary.total += 1;
            match outcome.status {
                TaskStatus::Success => summary.success += 1,
                TaskStatus::Failed => summary.failed += 1,
                TaskStatus::Skipped => summary.skipped += 1,
            }
        }
        summary
    }
}

/// Executes tasks against registered handlers under a global admission
/// gate.
///
/// The engine is cheap to share behind a reference; `run_task` and
/// `run_tasks` take `&self` and may be called concurrently.
pub struct Engine {
    config: EngineConfig,
    registry: HandlerRegistry,
    gate: Arc<Semaphore>,
}

impl Engine {
    /// Creates an engine, failing fast on an invalid concurrency limit.
    ///
    /// This is the only configuration problem the engine refuses to run
    /// with; everything else (unknown sources, bad handler parameters)
    /// surfaces per task at execution time.
    pub fn new(config: EngineConfig, registry: HandlerRegistry) -> Result<Self, EngineError> {
        if config.max_concurrency < 1 {
            return Err(EngineError::InvalidConcurrency(config.max_concurrency));
        }
        let gate = Arc::new(Semaphore::new(config.max_concurrency));
        Ok(Self {
            config,
            registry,
            gate,
        })
    }

    /// The configuration this engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Executes one task to completion, applying the retry policy.
    ///
    /// An unregistered source skips the task without invoking anything.
    /// Handler errors are retried up to `retry_limit` times with
    /// randomized backoff; the admission permit is released before the
    /// backoff sleep and re-acquired for the next attempt.
    pub async fn run_task(&self, task: Task) -> Outcome {
        let Some(handler) = self.registry.resolve(task.source()) else {
            error!(
                job = %task.job_id(),
                source = %task.source(),
                keyword = %task.keyword,
                "no handler registered for source, skipping task"
            );
            let reason = format!("unknown source: {}", task.source());
            return Outcome::skipped(task, reason);
        };

        let max_attempts = self.config.retry_limit + 1;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let started = Instant::now();
            let result = {
                let _permit = self
                    .gate
                    .acquire()
                    .await
                    .expect("admission gate is never closed");
                handler.invoke(&task.keyword, &task.job.parameters).await
            };
            let duration = started.elapsed();

            match result {
                Ok(payload) => {
                    let item_count = payload.item_count();
                    info!(
                        job = %task.job_id(),
                        source = %task.source(),
                        keyword = %task.keyword,
                        items = item_count,
                        attempt,
                        duration_ms = duration.as_millis() as u64,
                        "task succeeded"
                    );
                    return Outcome::success(task, attempt, item_count, duration);
                }
                Err(err) => {
                    if attempt >= max_attempts {
                        error!(
                            job = %task.job_id(),
                            source = %task.source(),
                            keyword = %task.keyword,
                            attempt,
                            max_attempts,
                            duration_ms = duration.as_millis() as u64,
                            error = %err,
                            "task failed, retries exhausted"
                        );
                        return Outcome::failed(task, attempt, err.to_string(), duration);
                    }

                    let delay = self.config.backoff.delay_for(attempt);
                    warn!(
                        job = %task.job_id(),
                        source = %task.source(),
                        keyword = %task.keyword,
                        attempt,
                        max_attempts,
                        duration_ms = duration.as_millis() as u64,
                        error = %err,
                        delay_secs = delay.as_secs_f64(),
                        "task attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Runs every task to completion and reports the partition counts.
    ///
    /// All tasks are fanned out at once; the admission gate alone bounds
    /// how many handler invocations run in parallel. One task's failure
    /// never affects another's execution, and the run always completes
    /// with a full summary.
    pub async fn run_tasks(&self, tasks: Vec<Task>) -> RunSummary {
        if tasks.is_empty() {
            return RunSummary::default();
        }

        let futures: Vec<_> = tasks
            .into_iter()
            .map(|task| self.run_task(task))
            .collect();
        let outcomes = futures::future::join_all(futures).await;

        let summary = RunSummary::from_outcomes(&outcomes);
        info!(
            total = summary.total,
            success = summary.success,
            failed = summary.failed,
            skipped = summary.skipped,
            "run finished"
        );
        summary
    }
}
