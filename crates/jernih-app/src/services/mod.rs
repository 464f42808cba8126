//! Orchestration layer between the HTTP surface and the pure pipeline.
//!
//! Modules exposed here own IO: the processing history store and the
//! provider that runs cleansing on the blocking pool. Keep stateless
//! transforms in `crate::text` and `crate::pipeline`.

pub mod history;
pub mod provider;

pub use history::{HistoryStore, MemorySink, ProcessingRecord, RecordKind, RecordSink, SinkError};
pub use provider::DefaultCleanseProvider;
