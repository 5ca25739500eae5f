//! Source handler seam and registry.
//!
//! Every job names a source key; the registry maps that key to a pluggable
//! `SourceHandler` implementation. The engine resolves handlers through
//! the registry and treats a resolution miss as data (the task is skipped),
//! never as an error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::job::ParamMap;

/// Errors a source handler can produce.
///
/// The engine does not distinguish between variants: every handler error
/// is retried up to the configured limit.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Job parameters are missing or malformed for this handler.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Failed to interpret response or file data.
    #[error("failed to parse payload: {0}")]
    Parse(String),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for handler operations.
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Successful handler output.
///
/// Handlers declare whether their output is countable; the engine reports
/// the count as `item_count` on the task outcome.
#[derive(Debug, Clone)]
pub enum HandlerPayload {
    /// A batch of collected records.
    Records(Vec<serde_json::Value>),
    /// Output without a countable shape (acknowledgements, side effects).
    Opaque,
}

impl HandlerPayload {
    /// Number of records when the payload is countable.
    pub fn item_count(&self) -> Option<usize> {
        match self {
            HandlerPayload::Records(records) => Some(records.len()),
            HandlerPayload::Opaque => None,
        }
    }
}

/// Trait for pluggable source handlers.
///
/// One handler instance serves all tasks of its source, concurrently;
/// implementations must be shareable across tasks (`Send + Sync`) and
/// should keep per-invocation state on the stack.
#[async_trait]
pub trait SourceHandler: Send + Sync {
    /// Executes one task: fetch or process whatever the source holds for
    /// `keyword`, steered by the job's parameter bag.
    async fn invoke(&self, keyword: &str, params: &ParamMap) -> HandlerResult<HandlerPayload>;
}

/// Maps source keys to handler implementations.
///
/// The registry is populated before a run and not mutated while tasks are
/// executing.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn SourceHandler>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registers a handler under the given source key.
    ///
    /// Registering the same key twice replaces the previous handler.
    pub fn register(&mut self, source: impl Into<String>, handler: Arc<dyn SourceHandler>) {
        self.handlers.insert(source.into(), handler);
    }

    /// Looks up the handler for a source key.
    ///
    /// Absence is not an error; the caller decides what a miss means.
    pub fn resolve(&self, source: &str) -> Option<Arc<dyn SourceHandler>> {
        self.handlers.get(source).cloned()
    }

    /// Returns whether a handler is registered for the source key.
    pub fn contains(&self, source: &str) -> bool {
        self.handlers.contains_key(source)
    }

    /// Registered source keys, sorted for stable output.
    pub fn sources(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.handlers.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
