//! Outbox publisher.
//!
//! Drains the emitter outbox in order. Each record is appended to its stream
//! with capped exponential backoff until the append succeeds, then broadcast
//! to live subscribers. Records are never reordered: the next record waits
//! until the current one is stored.
//!
//! Cancellation only interrupts a retry backoff. The publisher otherwise runs
//! until every emitter handle is dropped and the outbox is empty.

use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Outbox;
use crate::config::PublishConfig;
use crate::storage::{LogRecord, OutputLogs, StreamCounts, StreamKind};

/// Backoff between failed appends.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub initial: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &PublishConfig) -> Self {
        Self {
            initial: Duration::from_millis(config.retry_initial_ms),
            max: Duration::from_millis(config.retry_max_ms),
        }
    }

    fn next(&self, current: Duration) -> Duration {
        (current * 2).min(self.max)
    }
}

/// Final publisher statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PublishStats {
    pub published: StreamCounts,
    pub retries: u64,
    /// Records still failing when shutdown interrupted their retry
    pub abandoned: u64,
}

impl PublishStats {
    fn count(&mut self, stream: StreamKind) {
        match stream {
            StreamKind::Approved => self.published.approved += 1,
            StreamKind::Held => self.published.held += 1,
            StreamKind::Anomalies => self.published.anomalies += 1,
            StreamKind::Forecasts => self.published.forecasts += 1,
        }
    }
}

pub struct Publisher {
    outbox: Outbox,
    logs: OutputLogs,
    notify: broadcast::Sender<LogRecord>,
    retry: RetryPolicy,
}

impl Publisher {
    pub fn new(outbox: Outbox, logs: OutputLogs, notify: broadcast::Sender<LogRecord>, retry: RetryPolicy) -> Self {
        Self {
            outbox,
            logs,
            notify,
            retry,
        }
    }

    pub async fn run(mut self, cancel: CancellationToken) -> PublishStats {
        let mut stats = PublishStats::default();
        info!(backend = self.logs.backend_name(), "[Publisher] Started");

        while let Some(record) = self.outbox.recv().await {
            let Some(seq) = self.append_with_retry(&record, &cancel, &mut stats).await else {
                stats.abandoned += 1;
                continue;
            };

            let mut stored = record;
            stored.seq = seq;
            stats.count(stored.stream);
            // No subscribers is fine.
            let _ = self.notify.send(stored);
        }

        info!(
            approved = stats.published.approved,
            held = stats.published.held,
            anomalies = stats.published.anomalies,
            forecasts = stats.published.forecasts,
            retries = stats.retries,
            abandoned = stats.abandoned,
            "[Publisher] Outbox drained, stopping"
        );
        stats
    }

    async fn append_with_retry(
        &self,
        record: &LogRecord,
        cancel: &CancellationToken,
        stats: &mut PublishStats,
    ) -> Option<u64> {
        let log = self.logs.stream(record.stream);
        let mut delay = self.retry.initial;
        loop {
            match log.append(record) {
                Ok(seq) => {
                    debug!(stream = %record.stream, plant = %record.plant_id, seq, "[Publisher] Appended");
                    return Some(seq);
                }
                Err(e) => {
                    stats.retries += 1;
                    warn!(
                        stream = %record.stream,
                        plant = %record.plant_id,
                        error = %e,
                        retry_in_ms = delay.as_millis(),
                        "[Publisher] Append failed, retrying"
                    );
                }
            }

            tokio::select! {
                () = cancel.cancelled() => {
                    error!(
                        stream = %record.stream,
                        plant = %record.plant_id,
                        "[Publisher] Shutdown during retry, record not stored"
                    );
                    return None;
                }
                () = tokio::time::sleep(delay) => {}
            }
            delay = self.retry.next(delay);
        }
    }
}
