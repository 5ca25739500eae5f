//! keyharvest: multi-source keyword harvesting orchestrator.
//!
//! Declarative jobs (source + keywords + parameters) are expanded into
//! individual tasks, dispatched to pluggable per-source handlers, and
//! executed concurrently under a global admission limit with per-task
//! retry and randomized backoff.

pub mod cli;
pub mod config;
pub mod engine;
pub mod handlers;
pub mod job;
pub mod planner;
pub mod registry;

// Re-export the types most embedders need
pub use config::{ConfigError, GlobalSettings, HarvestConfig};
pub use engine::{BackoffPolicy, Engine, EngineConfig, EngineError, Outcome, RunSummary, TaskStatus};
pub use job::{collect_tasks, Job, ParamMap, Task};
pub use registry::{HandlerError, HandlerPayload, HandlerRegistry, HandlerResult, SourceHandler};
