//! sled-backed record log.
//!
//! Key: sequence number as u64 big-endian bytes (sorts in append order).
//! Value: JSON-serialized [`LogRecord`].
//!
//! The next sequence number is recovered from the last key on open, so a
//! restarted process continues the stream rather than overwriting it.

use std::sync::Mutex;

use super::{LogRecord, RecordLog, StorageError, StreamKind};

pub struct SledLog {
    tree: sled::Tree,
    next_seq: Mutex<u64>,
}

impl SledLog {
    pub fn open(db: &sled::Db, stream: StreamKind) -> Result<Self, StorageError> {
        let tree = db.open_tree(stream.as_str())?;
        let next_seq = match tree.last()? {
            Some((key, _)) => decode_key(&key)? + 1,
            None => 0,
        };
        tracing::debug!(stream = %stream, next_seq, "[Storage] Stream opened");
        Ok(Self {
            tree,
            next_seq: Mutex::new(next_seq),
        })
    }
}

fn decode_key(key: &[u8]) -> Result<u64, StorageError> {
    let bytes: [u8; 8] = key
        .try_into()
        .map_err(|_| StorageError::Backend(format!("unexpected key length {}", key.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

impl RecordLog for SledLog {
    fn append(&self, record: &LogRecord) -> Result<u64, StorageError> {
        let mut next = self
            .next_seq
            .lock()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let seq = *next;

        let mut stored = record.clone();
        stored.seq = seq;
        let value = serde_json::to_vec(&stored)?;
        self.tree.insert(seq.to_be_bytes(), value)?;

        *next += 1;
        Ok(seq)
    }

    fn tail(&self, limit: usize, plant_id: Option<&str>) -> Result<Vec<LogRecord>, StorageError> {
        let mut out = Vec::with_capacity(limit.min(256));
        for item in self.tree.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            match serde_json::from_slice::<LogRecord>(&value) {
                Ok(record) if plant_id.map_or(true, |p| record.plant_id == p) => out.push(record),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "[Storage] Skipping undecodable record"),
            }
        }
        out.reverse();
        Ok(out)
    }

    fn len(&self) -> usize {
        self.tree.len()
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}
