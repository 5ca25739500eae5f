//! Echo handler: deterministic local records.
//!
//! Echo performs no I/O, which makes it the handler of choice for smoke
//! runs, config validation, and wiring tests.

use async_trait::async_trait;

use crate::job::ParamMap;
use crate::registry::{HandlerError, HandlerPayload, HandlerResult, SourceHandler};

/// Records emitted when the job does not set `count`.
const DEFAULT_COUNT: usize = 1;

/// Emits synthetic records echoing the keyword back.
///
/// Parameters:
/// - `count` (optional non-negative integer, default 1): how many
///   records to emit per keyword
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoHandler;

impl EchoHandler {
    /// Creates the handler.
    pub fn new() -> Self {
        Self
    }

    fn record_count(params: &ParamMap) -> HandlerResult<usize> {
        match params.get("count") {
            None => Ok(DEFAULT_COUNT),
            Some(value) => value.as_u64().map(|n| n as usize).ok_or_else(|| {
                HandlerError::InvalidParams(format!(
                    "'count' must be a non-negative integer, got {value}"
                ))
            }),
        }
    }
}

#[async_trait]
impl SourceHandler for EchoHandler {
    async fn invoke(&self, keyword: &str, params: &ParamMap) -> HandlerResult<HandlerPayload> {
        let count = Self::record_count(params)?;
        let records = (0..count)
            .map(|index| serde_json::json!({"keyword": keyword, "index": index}))
            .collect();
        Ok(HandlerPayload::Records(records))
    }
}
