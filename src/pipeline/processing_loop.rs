//! Event processing loop shared by every input mode.
//!
//! Pulls events from an [`EventSource`], interleaves operator-injected
//! control events, and forwards both to the plant workers. Ends when the
//! source is exhausted or shutdown is requested, then drains the workers.

use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::source::{EventSource, SourceEvent};
use super::workers::{PlantWorkers, SubmitError};
use super::{AppState, PipelineStats, SystemStatus};
use crate::config::defaults::PROGRESS_LOG_INTERVAL;
use crate::types::RawEvent;

/// Sender half used by the API to inject events into the running loop.
pub type ControlSender = mpsc::Sender<RawEvent>;

pub struct ProcessingLoop {
    workers: PlantWorkers,
    app_state: Arc<RwLock<AppState>>,
    control_rx: mpsc::Receiver<RawEvent>,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(
        workers: PlantWorkers,
        app_state: Arc<RwLock<AppState>>,
        control_rx: mpsc::Receiver<RawEvent>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            workers,
            app_state,
            control_rx,
            cancel_token,
        }
    }

    /// Run until the source is exhausted or cancellation, then drain the
    /// workers and return their combined statistics.
    pub async fn run<S: EventSource>(mut self, source: &mut S) -> PipelineStats {
        let mut from_source = 0u64;
        let mut injected = 0u64;
        let mut unroutable = 0u64;
        let mut control_open = true;

        {
            let mut state = self.app_state.write().await;
            state.status = SystemStatus::Running;
            state.source = source.source_name().to_string();
        }

        info!("📊 Processing events from {}...", source.source_name());
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        loop {
            let event = tokio::select! {
                () = self.cancel_token.cancelled() => {
                    info!("[EventLoop] Shutdown signal received");
                    break;
                }
                control = self.control_rx.recv(), if control_open => {
                    match control {
                        Some(event) => {
                            injected += 1;
                            source.on_control(&event);
                            event
                        }
                        None => {
                            control_open = false;
                            continue;
                        }
                    }
                }
                result = source.next_event() => {
                    match result {
                        Ok(SourceEvent::Event(event)) => {
                            from_source += 1;
                            event
                        }
                        Ok(SourceEvent::Eof) => {
                            info!(events = from_source, "[EventLoop] Source reached end");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "[EventLoop] Source error");
                            break;
                        }
                    }
                }
            };

            match self.workers.submit(event).await {
                Ok(()) => {}
                Err(SubmitError::Rejected(e)) => {
                    unroutable += 1;
                    warn!(error = %e, "[EventLoop] Event not routed");
                }
                Err(e @ SubmitError::WorkerStopped(_)) => {
                    warn!(error = %e, "[EventLoop] Stopping");
                    break;
                }
            }

            if from_source > 0 && from_source % PROGRESS_LOG_INTERVAL == 0 {
                let state = self.app_state.read().await;
                let (approved, held): (u64, u64) = state
                    .plants
                    .values()
                    .fold((0, 0), |(a, h), p| (a + p.counters.approved, h + p.counters.held));
                info!(
                    "📈 Progress: {} events | Approved: {} | Held: {} | Injected: {}",
                    from_source, approved, held, injected
                );
            }
        }

        self.app_state.write().await.status = SystemStatus::Draining;
        let mut stats = self.workers.shutdown().await;
        stats.events += unroutable;
        stats.rejected_unknown_plant += unroutable;
        self.app_state.write().await.status = SystemStatus::Stopped;

        info!("");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS");
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("   Events Processed:     {}", stats.events);
        info!("   Injected Events:      {}", injected);
        info!("   Readings:             {}", stats.readings);
        info!("   Decisions Approved:   {}", stats.approved);
        info!("   Decisions Held:       {}", stats.held);
        info!("   Anomalies:            {}", stats.anomalies);
        info!("   Faults / Clears:      {} / {}", stats.faults, stats.clears);
        info!(
            "   Rejected:             {} (out-of-order {}, malformed {}, unknown plant {})",
            stats.rejected(),
            stats.rejected_out_of_order,
            stats.rejected_malformed,
            stats.rejected_unknown_plant
        );
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anomaly::AnomalyDetector;
    use crate::config::{reference_plants, AnomalyConfig, ForecastConfig, PolicyConfig, SimulationConfig};
    use crate::emitter::DecisionEmitter;
    use crate::forecast::WindowedForecaster;
    use crate::pipeline::source::SyntheticSource;
    use crate::pipeline::PipelineContext;
    use crate::policy::{DispatchPolicy, PolicyHandle, PolicyModel};
    use crate::registry::PlantRegistry;
    use crate::acquisition::SyntheticGenerator;

    #[tokio::test]
    async fn test_synthetic_run_to_completion() {
        let registry = Arc::new(PlantRegistry::from_config(&reference_plants()).unwrap());
        let (emitter, mut outbox) = DecisionEmitter::channel(false);
        let ctx = Arc::new(PipelineContext::new(
            Arc::clone(&registry),
            WindowedForecaster::new(ForecastConfig::default()),
            DispatchPolicy::from_config(&PolicyConfig::default(), PolicyHandle::new(Some(PolicyModel::builtin()))),
            AnomalyDetector::new(AnomalyConfig::default()),
            emitter,
        ));
        let app_state = Arc::new(RwLock::new(AppState::default()));
        let workers = PlantWorkers::spawn(ctx, Arc::clone(&app_state), 16).await;
        let (_control_tx, control_rx) = mpsc::channel(4);

        let generator = SyntheticGenerator::new(&registry, &SimulationConfig::default());
        let mut source = SyntheticSource::new(generator, 0, Some(12));
        let stats = ProcessingLoop::new(workers, Arc::clone(&app_state), control_rx, CancellationToken::new())
            .run(&mut source)
            .await;

        assert_eq!(stats.readings, 36);
        assert_eq!(stats.approved + stats.held, 36);
        assert_eq!(app_state.read().await.status, SystemStatus::Stopped);

        let mut decisions = 0;
        while let Ok(record) = outbox.try_recv() {
            if record.as_decision().is_some() {
                decisions += 1;
            }
        }
        assert_eq!(decisions, 36);
    }
}
