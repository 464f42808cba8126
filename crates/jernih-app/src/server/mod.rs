//! Wires the loaded lexicon and history store into the HTTP server.

use std::sync::Arc;

use jernih_server::DynCleanseProvider;

use crate::config::{AppConfig, StorageConfig};
use crate::error::AppError;
use crate::lexicon::Lexicon;
use crate::paths::AppPaths;
use crate::pipeline::CleansePipeline;
use crate::services::{DefaultCleanseProvider, HistoryStore, MemorySink, RecordSink};

pub use jernih_server::{ServerError, build_api_router, build_app_router};

/// Records retained in memory when persistent history is disabled.
pub const MEMORY_HISTORY_CAPACITY: usize = 32;

fn memory_history() -> MemorySink {
    MemorySink::bounded(MEMORY_HISTORY_CAPACITY)
}

/// Opens the configured record sink. With history disabled only the latest
/// [`MEMORY_HISTORY_CAPACITY`] records are kept, in memory.
pub fn open_sink(storage: &StorageConfig) -> Result<Arc<dyn RecordSink>, AppError> {
    if !storage.history {
        tracing::info!(
            capacity = MEMORY_HISTORY_CAPACITY,
            "processing history disabled; keeping recent records in memory"
        );
        return Ok(Arc::new(memory_history()));
    }
    let paths = AppPaths::new(&storage.path)?;
    let store = HistoryStore::open(&paths)?;
    tracing::info!(path = %storage.path.display(), "processing history enabled");
    Ok(Arc::new(store))
}

/// Loads the lexicon and builds the provider served over HTTP. Any lexicon
/// error is fatal.
pub fn build_provider(config: &AppConfig) -> Result<DynCleanseProvider, AppError> {
    let lexicon = Lexicon::load(&config.lexicon)?;
    let pipeline = Arc::new(CleansePipeline::new(lexicon));
    let sink = open_sink(&config.storage)?;
    Ok(Arc::new(DefaultCleanseProvider::new(
        pipeline,
        sink,
        config.pipeline.target_field.clone(),
    )))
}

pub async fn serve(config: AppConfig) -> Result<(), AppError> {
    debug_assert!(!config.pipeline.target_field.is_empty());

    let provider = build_provider(&config)?;
    jernih_server::serve(config.server, provider).await?;
    Ok(())
}
