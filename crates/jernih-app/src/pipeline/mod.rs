//! The cleansing pipeline: normalize, correct, filter.
//!
//! Everything here is pure. Persistence of results belongs to
//! `crate::services`, which calls into the pipeline and records the outcome
//! afterwards.

pub mod table;

use thiserror::Error;

use crate::lexicon::Lexicon;
use crate::text::{correct, normalize, strip_encoding_artifacts};

pub use table::Table;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("malformed csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("csv input has no header row")]
    MissingHeader,
    #[error("column `{column}` not found in csv header")]
    MissingColumn { column: String },
    #[error("failed to write csv output: {0}")]
    Flush(String),
}

/// Immutable, shareable cleansing pipeline built around a loaded [`Lexicon`].
#[derive(Debug, Clone)]
pub struct CleansePipeline {
    lexicon: Lexicon,
}

impl CleansePipeline {
    pub fn new(lexicon: Lexicon) -> Self {
        Self { lexicon }
    }

    /// `filter(correct(normalize(text)))`. Total over all inputs.
    pub fn cleanse(&self, text: &str) -> String {
        let normalized = normalize(text);
        let corrected = correct(&normalized, self.lexicon.slang());
        self.lexicon.filter().apply(&corrected)
    }

    /// Table cells additionally go through the encoding-artifact pre-pass.
    /// Free text submitted directly does not; see [`CleansePipeline::cleanse`].
    pub fn cleanse_cell(&self, text: &str) -> String {
        self.cleanse(&strip_encoding_artifacts(text))
    }

    /// Cleanses `target_field` in every row. Other columns and row order are
    /// left untouched.
    pub fn cleanse_table(&self, table: &Table, target_field: &str) -> Result<Table, PipelineError> {
        let index = table
            .column_index(target_field)
            .ok_or_else(|| PipelineError::MissingColumn {
                column: target_field.to_string(),
            })?;

        let mut cleansed = table.clone();
        cleansed.map_column(index, |cell| self.cleanse_cell(cell));
        Ok(cleansed)
    }
}
