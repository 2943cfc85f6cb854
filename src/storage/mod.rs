//! Append-only output logs
//!
//! One log per stream (approved decisions, held decisions, anomalies,
//! forecasts). Every appended record gets the next per-stream sequence
//! number and is stored as self-describing JSON carrying its plant id and
//! timestamp. Logs are injected into the publisher as [`OutputLogs`] handles
//! so backends can be swapped without touching the pipeline:
//!
//! - [`InMemoryLog`]: tests and `--in-memory` runs
//! - [`SledLog`]: one sled tree per stream, big-endian sequence keys

pub mod lockfile;
pub mod memory;
pub mod sled_log;

pub use lockfile::ProcessLock;
pub use memory::InMemoryLog;
pub use sled_log::SledLog;

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AnomalyReport, Decision, Forecast};

// ============================================================================
// Records
// ============================================================================

/// Output stream a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Approved,
    Held,
    Anomalies,
    Forecasts,
}

impl StreamKind {
    pub const ALL: [StreamKind; 4] = [
        StreamKind::Approved,
        StreamKind::Held,
        StreamKind::Anomalies,
        StreamKind::Forecasts,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StreamKind::Approved => "approved",
            StreamKind::Held => "held",
            StreamKind::Anomalies => "anomalies",
            StreamKind::Forecasts => "forecasts",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal record payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "record", rename_all = "snake_case")]
pub enum RecordBody {
    Decision(Decision),
    Anomaly(AnomalyReport),
    Forecast(Forecast),
}

/// Stored envelope around a terminal record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Per-stream sequence number, assigned on append
    pub seq: u64,
    pub stream: StreamKind,
    pub plant_id: String,
    pub timestamp: DateTime<Utc>,
    /// Wall-clock time the emitter stamped the record
    pub emitted_at: DateTime<Utc>,
    pub body: RecordBody,
}

impl LogRecord {
    /// Wrap a decision; the stream follows its status.
    pub fn decision(decision: Decision) -> Self {
        let stream = if decision.is_held() {
            StreamKind::Held
        } else {
            StreamKind::Approved
        };
        Self::new(stream, decision.plant_id.clone(), decision.timestamp, RecordBody::Decision(decision))
    }

    pub fn anomaly(report: AnomalyReport) -> Self {
        Self::new(
            StreamKind::Anomalies,
            report.plant_id.clone(),
            report.timestamp,
            RecordBody::Anomaly(report),
        )
    }

    pub fn forecast(forecast: Forecast) -> Self {
        Self::new(
            StreamKind::Forecasts,
            forecast.plant_id.clone(),
            forecast.timestamp,
            RecordBody::Forecast(forecast),
        )
    }

    fn new(stream: StreamKind, plant_id: String, timestamp: DateTime<Utc>, body: RecordBody) -> Self {
        Self {
            seq: 0,
            stream,
            plant_id,
            timestamp,
            emitted_at: Utc::now(),
            body,
        }
    }

    pub fn as_decision(&self) -> Option<&Decision> {
        match &self.body {
            RecordBody::Decision(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_anomaly(&self) -> Option<&AnomalyReport> {
        match &self.body {
            RecordBody::Anomaly(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_forecast(&self) -> Option<&Forecast> {
        match &self.body {
            RecordBody::Forecast(f) => Some(f),
            _ => None,
        }
    }
}

// ============================================================================
// Log trait
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sled::Error> for StorageError {
    fn from(err: sled::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

/// Append-only record log for one stream.
///
/// Implementations must be thread-safe; the publisher appends while API
/// handlers read.
pub trait RecordLog: Send + Sync {
    /// Append a record and return the sequence number it was stored under.
    ///
    /// The record's own `seq` is ignored. Sequence numbers advance only on
    /// success.
    fn append(&self, record: &LogRecord) -> Result<u64, StorageError>;

    /// Last `limit` records, oldest first, optionally for one plant.
    fn tail(&self, limit: usize, plant_id: Option<&str>) -> Result<Vec<LogRecord>, StorageError>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn backend_name(&self) -> &'static str;
}

/// One log handle per output stream.
#[derive(Clone)]
pub struct OutputLogs {
    pub approved: Arc<dyn RecordLog>,
    pub held: Arc<dyn RecordLog>,
    pub anomalies: Arc<dyn RecordLog>,
    pub forecasts: Arc<dyn RecordLog>,
}

impl OutputLogs {
    pub fn in_memory() -> Self {
        Self {
            approved: Arc::new(InMemoryLog::new()),
            held: Arc::new(InMemoryLog::new()),
            anomalies: Arc::new(InMemoryLog::new()),
            forecasts: Arc::new(InMemoryLog::new()),
        }
    }

    /// Open (or create) the sled database and one tree per stream.
    pub fn open_sled<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = sled::open(path.as_ref())?;
        tracing::info!(path = %path.as_ref().display(), "[Storage] Output logs opened");
        Ok(Self {
            approved: Arc::new(SledLog::open(&db, StreamKind::Approved)?),
            held: Arc::new(SledLog::open(&db, StreamKind::Held)?),
            anomalies: Arc::new(SledLog::open(&db, StreamKind::Anomalies)?),
            forecasts: Arc::new(SledLog::open(&db, StreamKind::Forecasts)?),
        })
    }

    pub fn stream(&self, kind: StreamKind) -> &Arc<dyn RecordLog> {
        match kind {
            StreamKind::Approved => &self.approved,
            StreamKind::Held => &self.held,
            StreamKind::Anomalies => &self.anomalies,
            StreamKind::Forecasts => &self.forecasts,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.approved.backend_name()
    }

    /// Record counts per stream.
    pub fn counts(&self) -> StreamCounts {
        StreamCounts {
            approved: self.approved.len(),
            held: self.held.len(),
            anomalies: self.anomalies.len(),
            forecasts: self.forecasts.len(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamCounts {
    pub approved: usize,
    pub held: usize,
    pub anomalies: usize,
    pub forecasts: usize,
}

impl StreamCounts {
    pub fn total(&self) -> usize {
        self.approved + self.held + self.anomalies + self.forecasts
    }
}
