use csv::{ReaderBuilder, Terminator, WriterBuilder};

use super::PipelineError;
use crate::text::decode_latin1;

/// A header row plus string cells, as read from an uploaded CSV.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        debug_assert!(rows.iter().all(|row| row.len() == headers.len()));
        Self { headers, rows }
    }

    /// Parses CSV bytes decoded as Latin-1. The first record is the header and
    /// every following record must have the same width.
    pub fn from_csv(bytes: &[u8]) -> Result<Self, PipelineError> {
        let decoded = decode_latin1(bytes);
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .from_reader(decoded.as_bytes());

        let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
        if headers.is_empty() {
            return Err(PipelineError::MissingHeader);
        }

        let rows = reader
            .records()
            .map(|record| record.map(|r| r.iter().map(str::to_string).collect()))
            .collect::<Result<Vec<Vec<String>>, _>>()?;

        Ok(Self { headers, rows })
    }

    /// Serializes with minimal quoting and `\n` record terminators.
    pub fn to_csv(&self) -> Result<String, PipelineError> {
        let mut writer = WriterBuilder::new()
            .terminator(Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| PipelineError::Flush(err.to_string()))?;
        String::from_utf8(bytes).map_err(|err| PipelineError::Flush(err.to_string()))
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub(crate) fn map_column<F>(&mut self, index: usize, mut f: F)
    where
        F: FnMut(&str) -> String,
    {
        debug_assert!(index < self.headers.len());
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(index) {
                *cell = f(cell);
            }
        }
    }
}
