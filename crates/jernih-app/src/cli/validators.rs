use std::path::PathBuf;

use jernih_server::is_csv_file_name;

pub const MAX_HISTORY_LIMIT: usize = 1000;

/// Validate CSV input: must exist, be a regular file, and carry a .csv extension.
pub fn validate_csv_file(s: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(s);

    if !path.exists() {
        return Err(format!("file does not exist: {s}"));
    }

    if !path.is_file() {
        return Err(format!("path is not a file: {s}"));
    }

    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();
    if !is_csv_file_name(name) {
        return Err(format!("file must have .csv extension: {s}"));
    }

    Ok(path)
}

/// Validate history limit: integer in 1..=1000.
pub fn validate_history_limit(s: &str) -> Result<usize, String> {
    let limit: usize = s
        .parse()
        .map_err(|_| format!("limit must be a positive integer: {s}"))?;
    if limit == 0 || limit > MAX_HISTORY_LIMIT {
        return Err(format!("limit must be between 1 and {MAX_HISTORY_LIMIT}"));
    }
    Ok(limit)
}
