//! In-memory record log.
//!
//! Thread-safe via `RwLock`. Not durable; contents are lost on restart.

use std::sync::RwLock;

use super::{LogRecord, RecordLog, StorageError};

#[derive(Debug, Default)]
pub struct InMemoryLog {
    records: RwLock<Vec<LogRecord>>,
}

impl InMemoryLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordLog for InMemoryLog {
    fn append(&self, record: &LogRecord) -> Result<u64, StorageError> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let seq = records.len() as u64;
        let mut stored = record.clone();
        stored.seq = seq;
        records.push(stored);
        Ok(seq)
    }

    fn tail(&self, limit: usize, plant_id: Option<&str>) -> Result<Vec<LogRecord>, StorageError> {
        let records = self
            .records
            .read()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let mut out: Vec<LogRecord> = records
            .iter()
            .rev()
            .filter(|r| plant_id.map_or(true, |p| r.plant_id == p))
            .take(limit)
            .cloned()
            .collect();
        out.reverse();
        Ok(out)
    }

    fn len(&self) -> usize {
        self.records.read().map_or(0, |r| r.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Forecast;
    use chrono::Utc;

    fn record(plant: &str) -> LogRecord {
        LogRecord::forecast(Forecast::sorted(plant, Utc::now(), [1.0, 2.0, 3.0], true, 1))
    }

    #[test]
    fn test_sequence_numbers_are_dense() {
        let log = InMemoryLog::new();
        assert_eq!(log.append(&record("RJ01")).unwrap(), 0);
        assert_eq!(log.append(&record("RJ01")).unwrap(), 1);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_tail_oldest_first_with_filter() {
        let log = InMemoryLog::new();
        for plant in ["RJ01", "GJ01", "RJ01", "TN01", "RJ01"] {
            log.append(&record(plant)).unwrap();
        }
        let tail = log.tail(2, Some("RJ01")).unwrap();
        assert_eq!(tail.iter().map(|r| r.seq).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(log.tail(10, None).unwrap().len(), 5);
    }

    #[test]
    fn test_trait_object() {
        let log: Box<dyn RecordLog> = Box::new(InMemoryLog::new());
        assert_eq!(log.backend_name(), "memory");
        assert!(log.is_empty());
    }
}
