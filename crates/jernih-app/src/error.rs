//! Application-level error type shared across the binary and services.

use std::path::PathBuf;

use thiserror::Error;

use crate::config;
use crate::lexicon::LexiconLoadError;
use crate::paths::PathError;
use crate::pipeline::PipelineError;
use crate::server::ServerError;
use crate::services::SinkError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] config::AppConfigError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Lexicon(#[from] LexiconLoadError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    History(#[from] SinkError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write output {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to read standard input: {0}")]
    Stdin(#[source] std::io::Error),
    #[error("failed to write standard output: {0}")]
    Stdout(#[source] std::io::Error),
}
