//! Reference tables loaded once at startup: the slang dictionary and the
//! abusive pattern list.
//!
//! A [`Lexicon`] is immutable after construction. Changing either source
//! table requires a restart; there is no reload path and no partially loaded
//! mode.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::config::LexiconConfig;
use crate::text::{AbusiveFilter, MalformedPatternError, decode_latin1};

#[derive(Debug, Error)]
pub enum LexiconLoadError {
    #[error("failed to read lexicon source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse lexicon source {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("malformed row {line} in {path}: {reason}")]
    Malformed {
        path: PathBuf,
        line: u64,
        reason: String,
    },
    #[error("column `{column}` not found in {path}")]
    MissingColumn { path: PathBuf, column: String },
    #[error("invalid pattern in {path}: {source}")]
    Pattern {
        path: PathBuf,
        #[source]
        source: MalformedPatternError,
    },
}

#[derive(Debug, Clone)]
pub struct Lexicon {
    slang: HashMap<String, String>,
    filter: AbusiveFilter,
}

impl Lexicon {
    pub fn load(config: &LexiconConfig) -> Result<Self, LexiconLoadError> {
        let slang = read_slang_table(&config.slang_path)?;
        let patterns = read_pattern_table(&config.abusive_path, &config.abusive_column)?;
        let filter =
            AbusiveFilter::new(&patterns).map_err(|source| LexiconLoadError::Pattern {
                path: config.abusive_path.clone(),
                source,
            })?;

        tracing::info!(
            slang_entries = slang.len(),
            abusive_patterns = filter.len(),
            slang_path = %config.slang_path.display(),
            abusive_path = %config.abusive_path.display(),
            "lexicon loaded"
        );
        Ok(Self { slang, filter })
    }

    /// Builds a lexicon from in-memory tables. Later duplicate keys win.
    pub fn from_parts<E, K, V, P, S>(entries: E, patterns: P) -> Result<Self, MalformedPatternError>
    where
        E: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
        P: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let slang = entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let filter = AbusiveFilter::new(patterns)?;
        Ok(Self { slang, filter })
    }

    pub fn slang(&self) -> &HashMap<String, String> {
        &self.slang
    }

    pub fn filter(&self) -> &AbusiveFilter {
        &self.filter
    }
}

fn read_slang_table(path: &Path) -> Result<HashMap<String, String>, LexiconLoadError> {
    let bytes = fs::read(path).map_err(|source| LexiconLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let decoded = decode_latin1(&bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(decoded.as_bytes());

    let mut slang = HashMap::new();
    for record in reader.records() {
        let record = record.map_err(|source| LexiconLoadError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let line = record.position().map(|p| p.line()).unwrap_or_default();
        let (Some(incorrect), Some(correct)) = (record.get(0), record.get(1)) else {
            return Err(LexiconLoadError::Malformed {
                path: path.to_path_buf(),
                line,
                reason: format!("expected 2 fields, found {}", record.len()),
            });
        };
        if incorrect.is_empty() {
            continue;
        }
        slang.insert(incorrect.to_string(), correct.to_string());
    }
    Ok(slang)
}

fn read_pattern_table(path: &Path, column: &str) -> Result<Vec<String>, LexiconLoadError> {
    let bytes = fs::read(path).map_err(|source| LexiconLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let csv_error = |source: csv::Error| LexiconLoadError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes.as_slice());

    let index = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .position(|header| header.trim() == column)
        .ok_or_else(|| LexiconLoadError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })?;

    let mut patterns = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        match record.get(index) {
            Some(pattern) if !pattern.is_empty() => patterns.push(pattern.to_string()),
            _ => continue,
        }
    }
    Ok(patterns)
}
