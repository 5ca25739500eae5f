//! HTTP JSON handler: fetch a document and extract a record array.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::job::ParamMap;
use crate::registry::{HandlerError, HandlerPayload, HandlerResult, SourceHandler};

/// Request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Placeholder in the URL template substituted with the keyword.
const KEYWORD_PLACEHOLDER: &str = "{keyword}";

/// Query parameter carrying the keyword when the URL has no placeholder.
const DEFAULT_QUERY_PARAM: &str = "q";

/// Fetches a JSON document over HTTP and extracts records from it.
///
/// Parameters:
/// - `url` (required string): target URL; a literal `{keyword}` is
///   replaced with the percent-encoded keyword
/// - `query` (optional string): query parameter name for the keyword
///   when the URL has no placeholder (default `q`)
/// - `items_pointer` (optional string): JSON pointer to the record array
///   inside the response
/// - `max_items` (optional integer): cap on the number of returned records
///
/// Without `items_pointer`, an array document becomes the record batch
/// and any other document is reported as opaque output.
pub struct HttpJsonHandler {
    /// HTTP client shared by all invocations.
    client: Client,
}

impl HttpJsonHandler {
    /// Creates the handler with a default client.
    pub fn new() -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .user_agent(concat!("keyharvest/", env!("CARGO_PKG_VERSION")))
                .build()
                .expect("Failed to build HTTP client"),
        }
    }
}

impl Default for HttpJsonHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceHandler for HttpJsonHandler {
    async fn invoke(&self, keyword: &str, params: &ParamMap) -> HandlerResult<HandlerPayload> {
        let url_template = params.get("url").and_then(|v| v.as_str()).ok_or_else(|| {
            HandlerError::InvalidParams("missing required string parameter 'url'".to_string())
        })?;

        let request = if url_template.contains(KEYWORD_PLACEHOLDER) {
            self.client.get(substitute_keyword(url_template, keyword))
        } else {
            let query_param = params
                .get("query")
                .and_then(|v| v.as_str())
                .unwrap_or(DEFAULT_QUERY_PARAM);
            self.client
                .get(url_template)
                .query(&[(query_param, keyword)])
        };

        let response = request
            .send()
            .await
            .map_err(|e| HandlerError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable body".to_string());
            return Err(HandlerError::Http(format!("status {status}: {body}")));
        }

        let document: serde_json::Value = response
            .json()
            .await
            .map_err(|e| HandlerError::Parse(format!("response is not valid JSON: {e}")))?;

        extract_records(&document, params)
    }
}

/// Substitutes the keyword placeholder, percent-encoding the keyword.
fn substitute_keyword(template: &str, keyword: &str) -> String {
    template.replace(KEYWORD_PLACEHOLDER, &urlencoding::encode(keyword))
}

/// Locates the record array inside a fetched document.
fn extract_records(
    document: &serde_json::Value,
    params: &ParamMap,
) -> HandlerResult<HandlerPayload> {
    let items = match params.get("items_pointer").and_then(|v| v.as_str()) {
        Some(pointer) => {
            let located = document.pointer(pointer).ok_or_else(|| {
                HandlerError::Parse(format!("items_pointer '{pointer}' not found in response"))
            })?;
            located.as_array().ok_or_else(|| {
                HandlerError::Parse(format!(
                    "items_pointer '{pointer}' does not point at an array"
                ))
            })?
        }
        None => match document.as_array() {
            Some(items) => items,
            None => return Ok(HandlerPayload::Opaque),
        },
    };

    let mut records = items.clone();
    if let Some(max) = params.get("max_items").and_then(|v| v.as_u64()) {
        records.truncate(max as usize);
    }
    Ok(HandlerPayload::Records(records))
}
