//! File scan handler: keyword search across a directory tree.

use std::fs;
use std::path::Path;

use async_trait::async_trait;
use walkdir::WalkDir;

use crate::job::ParamMap;
use crate::registry::{HandlerError, HandlerPayload, HandlerResult, SourceHandler};

/// Scans a directory tree for files containing the keyword.
///
/// Parameters:
/// - `root` (required string): directory to scan
/// - `extensions` (optional array of strings): only files with one of
///   these extensions are read
/// - `max_files` (optional integer): cap on the number of files read
///
/// Matching is case-insensitive. Unreadable and non-UTF-8 files are
/// skipped rather than reported as errors. One record is emitted per
/// matching file, in walk order (sorted by file name per directory).
#[derive(Debug, Default, Clone, Copy)]
pub struct FileScanHandler;

impl FileScanHandler {
    /// Creates the handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SourceHandler for FileScanHandler {
    async fn invoke(&self, keyword: &str, params: &ParamMap) -> HandlerResult<HandlerPayload> {
        let root = params.get("root").and_then(|v| v.as_str()).ok_or_else(|| {
            HandlerError::InvalidParams("missing required string parameter 'root'".to_string())
        })?;
        if !Path::new(root).is_dir() {
            return Err(HandlerError::InvalidParams(format!(
                "'root' is not a directory: {root}"
            )));
        }

        let extensions = extensions_filter(params);
        let max_files = params
            .get("max_files")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize);

        let needle = keyword.to_lowercase();
        let mut records = Vec::new();
        let mut files_read = 0usize;

        for entry in WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(allowed) = &extensions {
                let accepted = entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
                    .unwrap_or(false);
                if !accepted {
                    continue;
                }
            }
            if let Some(limit) = max_files {
                if files_read >= limit {
                    break;
                }
            }
            files_read += 1;

            let contents = match fs::read_to_string(entry.path()) {
                Ok(contents) => contents,
                // Binary and unreadable files are skipped, not errors.
                Err(_) => continue,
            };

            let occurrences = contents.to_lowercase().matches(&needle).count();
            if occurrences > 0 {
                records.push(serde_json::json!({
                    "path": entry.path().display().to_string(),
                    "occurrences": occurrences,
                }));
            }
        }

        Ok(HandlerPayload::Records(records))
    }
}

/// Normalized extension allow-list from the parameter bag, if present.
fn extensions_filter(params: &ParamMap) -> Option<Vec<String>> {
    params
        .get("extensions")
        .and_then(|v| v.as_array())
        .map(|values| {
            values
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim_start_matches('.').to_string())
                .collect()
        })
}
