use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use bincode::config;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::paths::{AppPaths, PathError};

const HISTORY_ENV_MAP_SIZE_BYTES: usize = 1 << 30; // 1 GiB, uploads are stored verbatim
const RECORDS_DB: &str = "records";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Text,
    File,
}

/// One processed input and its cleansed output. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingRecord {
    /// Time-ordered UUIDv7; lexical order of ids is insertion order.
    pub id: String,
    pub kind: RecordKind,
    /// Raw input: UTF-8 text for [`RecordKind::Text`], the uploaded bytes for
    /// [`RecordKind::File`].
    pub input: Vec<u8>,
    pub output: String,
    pub created_at_ms: i64,
}

impl ProcessingRecord {
    #[must_use]
    pub fn text(input: &str, output: impl Into<String>) -> Self {
        Self::new(RecordKind::Text, input.as_bytes().to_vec(), output.into())
    }

    #[must_use]
    pub fn file(input: Vec<u8>, output: impl Into<String>) -> Self {
        Self::new(RecordKind::File, input, output.into())
    }

    fn new(kind: RecordKind, input: Vec<u8>, output: String) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            kind,
            input,
            output,
            created_at_ms: current_timestamp_ms(),
        }
    }

    /// Input rendered for display; uploads are shown lossily.
    pub fn input_lossy(&self) -> String {
        String::from_utf8_lossy(&self.input).into_owned()
    }
}

pub(crate) fn current_timestamp_ms() -> i64 {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    since_epoch.as_millis() as i64
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Path(#[from] PathError),
    #[error(transparent)]
    Heed(#[from] heed::Error),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("record `{0}` already exists")]
    Duplicate(String),
    #[error("in-memory sink lock poisoned")]
    Poisoned,
}

/// Destination for processing records. Called after a result is computed;
/// a failure here never invalidates that result.
pub trait RecordSink: Send + Sync {
    fn append(&self, record: &ProcessingRecord) -> Result<(), SinkError>;
}

/// LMDB-backed processing history.
#[derive(Debug)]
pub struct HistoryStore {
    env: Env,
    records: Database<Str, Bytes>,
}

impl HistoryStore {
    pub fn open(paths: &AppPaths) -> Result<Self, SinkError> {
        let path = paths.history_lmdb_dir()?;
        debug_assert!(path.exists());

        let mut options = EnvOpenOptions::new();
        options.max_dbs(2);
        options.map_size(HISTORY_ENV_MAP_SIZE_BYTES);
        let env = unsafe {
            // SAFETY: the environment is opened once per process and never
            // opened twice for the same path from this crate.
            options.open(&path)?
        };
        let records = {
            let rtxn = env.read_txn()?;
            let opened = env.open_database::<Str, Bytes>(&rtxn, Some(RECORDS_DB))?;
            drop(rtxn);
            match opened {
                Some(existing) => existing,
                None => {
                    let mut wtxn = env.write_txn()?;
                    let db = env.create_database::<Str, Bytes>(&mut wtxn, Some(RECORDS_DB))?;
                    wtxn.commit()?;
                    db
                }
            }
        };
        tracing::debug!(path = %path.display(), "opened history store");
        Ok(Self { env, records })
    }

    /// Most recent records first.
    pub fn recent(&self, limit: usize) -> Result<Vec<ProcessingRecord>, SinkError> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::with_capacity(limit.min(64));
        for entry in self.records.rev_iter(&rtxn)? {
            if out.len() >= limit {
                break;
            }
            let (_, raw) = entry?;
            let (record, _) = decode_from_slice::<ProcessingRecord, _>(raw, config::standard())?;
            out.push(record);
        }
        Ok(out)
    }

    pub fn count(&self) -> Result<u64, SinkError> {
        let rtxn = self.env.read_txn()?;
        Ok(self.records.len(&rtxn)?)
    }
}

impl RecordSink for HistoryStore {
    fn append(&self, record: &ProcessingRecord) -> Result<(), SinkError> {
        debug_assert!(!record.id.is_empty());
        let mut wtxn = self.env.write_txn()?;
        if self.records.get(&wtxn, record.id.as_str())?.is_some() {
            return Err(SinkError::Duplicate(record.id.clone()));
        }
        let encoded = encode_to_vec(record, config::standard())?;
        self.records
            .put(&mut wtxn, record.id.as_str(), encoded.as_slice())?;
        wtxn.commit()?;
        Ok(())
    }
}

/// Keeps records in process memory, oldest first.
///
/// [`MemorySink::bounded`] evicts the oldest record once full and is what a
/// server with history disabled runs on; [`MemorySink::new`] never evicts.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<VecDeque<ProcessingRecord>>,
    capacity: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bounded(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn records(&self) -> Vec<ProcessingRecord> {
        self.records
            .lock()
            .map(|guard| guard.iter().cloned().collect())
            .unwrap_or_default()
    }
}

impl RecordSink for MemorySink {
    fn append(&self, record: &ProcessingRecord) -> Result<(), SinkError> {
        let mut guard = self.records.lock().map_err(|_| SinkError::Poisoned)?;
        if let Some(capacity) = self.capacity {
            while guard.len() >= capacity {
                guard.pop_front();
            }
        }
        guard.push_back(record.clone());
        debug_assert!(self.capacity.is_none_or(|capacity| guard.len() <= capacity));
        Ok(())
    }
}
