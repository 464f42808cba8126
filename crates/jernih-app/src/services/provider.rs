use std::sync::Arc;

use async_trait::async_trait;
use jernih_server::{
    CleanseError, CleanseProvider, FileCleansed, FileUpload, TextCleansed,
};
use tokio::task;

use crate::pipeline::{CleansePipeline, PipelineError, Table};
use crate::services::history::{ProcessingRecord, RecordSink};

/// Binds the pipeline to a record sink for the HTTP layer.
///
/// Cleansing and the sink append both run on the blocking pool; the sink is
/// consulted only after the output exists, so a sink failure downgrades
/// `persisted` and nothing else.
#[derive(Clone)]
pub struct DefaultCleanseProvider {
    pipeline: Arc<CleansePipeline>,
    sink: Arc<dyn RecordSink>,
    target_field: String,
}

impl DefaultCleanseProvider {
    pub fn new(
        pipeline: Arc<CleansePipeline>,
        sink: Arc<dyn RecordSink>,
        target_field: impl Into<String>,
    ) -> Self {
        let target_field = target_field.into();
        debug_assert!(!target_field.is_empty());
        Self {
            pipeline,
            sink,
            target_field,
        }
    }
}

impl std::fmt::Debug for DefaultCleanseProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultCleanseProvider")
            .field("target_field", &self.target_field)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CleanseProvider for DefaultCleanseProvider {
    async fn cleanse_text(&self, text: String) -> Result<TextCleansed, CleanseError> {
        let pipeline = Arc::clone(&self.pipeline);
        let sink = Arc::clone(&self.sink);
        task::spawn_blocking(move || {
            let output = pipeline.cleanse(&text);
            let record = ProcessingRecord::text(&text, output.as_str());
            let persisted = append_record(sink.as_ref(), &record);
            tracing::debug!(
                input_len = text.len(),
                output_len = output.len(),
                persisted,
                "text cleansed"
            );
            TextCleansed { output, persisted }
        })
        .await
        .map_err(|err| join_error("cleanse_text", err))
    }

    async fn cleanse_file(&self, upload: FileUpload) -> Result<FileCleansed, CleanseError> {
        let pipeline = Arc::clone(&self.pipeline);
        let sink = Arc::clone(&self.sink);
        let column = upload
            .column
            .clone()
            .unwrap_or_else(|| self.target_field.clone());
        task::spawn_blocking(move || {
            let table = Table::from_csv(&upload.bytes).map_err(pipeline_error)?;
            let cleansed = pipeline
                .cleanse_table(&table, &column)
                .map_err(pipeline_error)?;
            let csv = cleansed.to_csv().map_err(pipeline_error)?;
            let rows = cleansed.len();

            let record = ProcessingRecord::file(upload.bytes, csv.as_str());
            let persisted = append_record(sink.as_ref(), &record);
            tracing::debug!(
                file_name = %upload.file_name,
                %column,
                rows,
                persisted,
                "file cleansed"
            );
            Ok(FileCleansed {
                csv,
                rows,
                persisted,
            })
        })
        .await
        .map_err(|err| join_error("cleanse_file", err))?
    }
}

fn append_record(sink: &dyn RecordSink, record: &ProcessingRecord) -> bool {
    match sink.append(record) {
        Ok(()) => true,
        Err(error) => {
            tracing::warn!(
                record_id = %record.id,
                kind = ?record.kind,
                %error,
                "failed to persist processing record"
            );
            false
        }
    }
}

fn pipeline_error(err: PipelineError) -> CleanseError {
    match err {
        PipelineError::MissingColumn { .. } => CleanseError::invalid_param("column", err.to_string()),
        PipelineError::Csv(_) | PipelineError::MissingHeader => {
            CleanseError::invalid_param("file", err.to_string())
        }
        PipelineError::Flush(_) => CleanseError::internal(err.to_string()),
    }
}

fn join_error(stage: &'static str, err: task::JoinError) -> CleanseError {
    tracing::error!(stage, error = %err, "blocking cleanse task failed");
    CleanseError::internal(format!("{stage} task failed: {err}"))
}
