//! Built-in source handlers.
//!
//! Three handlers ship with the crate:
//!
//! - `echo`: deterministic local records, for smoke runs and config checks
//! - `http_json`: fetches a JSON document over HTTP and extracts records
//! - `file_scan`: scans a directory tree for files containing the keyword
//!
//! Embedders can start from `builtin_registry()` and register their own
//! handlers on top.

pub mod echo;
pub mod file_scan;
pub mod http_json;

pub use echo::EchoHandler;
pub use file_scan::FileScanHandler;
pub use http_json::HttpJsonHandler;

use std::sync::Arc;

use crate::registry::HandlerRegistry;

/// Source key for the echo handler.
pub const ECHO_SOURCE: &str = "echo";

/// Source key for the HTTP JSON handler.
pub const HTTP_JSON_SOURCE: &str = "http_json";

/// Source key for the file scan handler.
pub const FILE_SCAN_SOURCE: &str = "file_scan";

/// Creates a registry pre-populated with every built-in handler.
pub fn builtin_registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry.register(ECHO_SOURCE, Arc::new(EchoHandler::new()));
    registry.register(HTTP_JSON_SOURCE, Arc::new(HttpJsonHandler::new()));
    registry.register(FILE_SCAN_SOURCE, Arc::new(FileScanHandler::new()));
    registry
}
