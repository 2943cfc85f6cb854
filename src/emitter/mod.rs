//! Decision Emitter
//!
//! Stamps terminal records and hands them to the publisher through an
//! unbounded outbox, so the per-event compute chain never waits on storage.
//! The [`Publisher`] appends each record to its stream exactly once and then
//! broadcasts it as a live notification.

pub mod publisher;

pub use publisher::{PublishStats, Publisher, RetryPolicy};

use tokio::sync::mpsc;

use crate::storage::LogRecord;
use crate::types::{AnomalyReport, Decision, Forecast};

/// Receiving half of the outbox, owned by the publisher.
pub type Outbox = mpsc::UnboundedReceiver<LogRecord>;

#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("publisher outbox is closed")]
    Closed,
}

/// Cheap cloneable emitter handle; one per plant worker.
#[derive(Debug, Clone)]
pub struct DecisionEmitter {
    tx: mpsc::UnboundedSender<LogRecord>,
    record_forecasts: bool,
}

impl DecisionEmitter {
    /// Create an emitter and the outbox its records land in.
    pub fn channel(record_forecasts: bool) -> (Self, Outbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, record_forecasts }, rx)
    }

    pub fn emit_decision(&self, decision: Decision) -> Result<(), EmitError> {
        self.send(LogRecord::decision(decision))
    }

    pub fn emit_anomaly(&self, report: AnomalyReport) -> Result<(), EmitError> {
        self.send(LogRecord::anomaly(report))
    }

    /// Forecasts are only published when the forecast stream is enabled.
    pub fn emit_forecast(&self, forecast: Forecast) -> Result<(), EmitError> {
        if !self.record_forecasts {
            return Ok(());
        }
        self.send(LogRecord::forecast(forecast))
    }

    fn send(&self, record: LogRecord) -> Result<(), EmitError> {
        self.tx.send(record).map_err(|_| EmitError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StreamKind;
    use chrono::Utc;

    #[test]
    fn test_forecasts_skipped_when_disabled() {
        let (emitter, mut outbox) = DecisionEmitter::channel(false);
        emitter
            .emit_forecast(Forecast::sorted("RJ01", Utc::now(), [1.0, 2.0, 3.0], true, 1))
            .unwrap();
        assert!(outbox.try_recv().is_err());
    }

    #[test]
    fn test_records_arrive_in_order() {
        let (emitter, mut outbox) = DecisionEmitter::channel(true);
        let f = Forecast::sorted("RJ01", Utc::now(), [1.0, 2.0, 3.0], true, 1);
        emitter.emit_forecast(f.clone()).unwrap();
        emitter.emit_forecast(f).unwrap();
        assert_eq!(outbox.try_recv().unwrap().stream, StreamKind::Forecasts);
        assert!(outbox.try_recv().is_ok());
    }

    #[test]
    fn test_closed_outbox_reported() {
        let (emitter, outbox) = DecisionEmitter::channel(true);
        drop(outbox);
        let err = emitter
            .emit_forecast(Forecast::sorted("RJ01", Utc::now(), [1.0, 2.0, 3.0], true, 1))
            .unwrap_err();
        assert!(matches!(err, EmitError::Closed));
    }
}
