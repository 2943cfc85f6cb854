//! Plant workers
//!
//! One tokio task per plant owns that plant's [`PlantPipeline`]. The router
//! forwards each event over a bounded channel by plant id, so per-plant
//! ordering is channel order and plants never contend with each other.
//! Clear commands travel on the same channel as telemetry; a clear-all is
//! copied to every worker.
//!
//! The decision chain inside a worker is synchronous. The only `.await`
//! points are receiving the next event and publishing the plant summary
//! after the chain completes.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use super::coordinator::{PipelineContext, PipelineStats, PlantPipeline};
use super::{AppState, PlantSummary};
use crate::acquisition::{route, NormalizeError, Route};
use crate::registry::PlantRegistry;
use crate::types::RawEvent;

#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Rejected(#[from] NormalizeError),
    #[error("worker for plant '{0}' has stopped")]
    WorkerStopped(String),
}

/// Router handle over the running plant workers.
pub struct PlantWorkers {
    registry: Arc<PlantRegistry>,
    senders: BTreeMap<String, mpsc::Sender<RawEvent>>,
    tasks: JoinSet<(String, PipelineStats)>,
    app_state: Arc<RwLock<AppState>>,
}

impl PlantWorkers {
    /// Spawn one worker per registered plant.
    pub async fn spawn(ctx: Arc<PipelineContext>, app_state: Arc<RwLock<AppState>>, queue_depth: usize) -> Self {
        let registry = Arc::clone(&ctx.registry);
        let mut senders = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for spec in registry.iter() {
            let Ok(pipeline) = PlantPipeline::new(Arc::clone(&ctx), &spec.id) else {
                continue;
            };
            app_state
                .write()
                .await
                .plants
                .insert(spec.id.clone(), PlantSummary::from_state(pipeline.state(), pipeline.stats()));

            let (tx, rx) = mpsc::channel(queue_depth.max(1));
            senders.insert(spec.id.clone(), tx);
            tasks.spawn(run_worker(pipeline, rx, Arc::clone(&app_state)));
        }

        info!(plants = senders.len(), queue_depth, "[Workers] Plant workers started");
        Self {
            registry,
            senders,
            tasks,
            app_state,
        }
    }

    pub fn plant_count(&self) -> usize {
        self.senders.len()
    }

    /// Forward an event to its plant worker, or to all workers for a clear-all.
    ///
    /// Waits when the target queue is full.
    pub async fn submit(&self, event: RawEvent) -> Result<(), SubmitError> {
        let target = match route(&event, &self.registry) {
            Ok(Route::Plant(id)) => Some(id.to_string()),
            Ok(Route::Broadcast) => None,
            Err(e) => {
                self.app_state.write().await.events_unroutable += 1;
                return Err(e.into());
            }
        };

        match target {
            Some(id) => self.send(&id, event).await?,
            None => {
                for id in self.senders.keys() {
                    self.send(id, event.clone()).await?;
                }
            }
        }
        self.app_state.write().await.events_routed += 1;
        Ok(())
    }

    async fn send(&self, plant_id: &str, event: RawEvent) -> Result<(), SubmitError> {
        let tx = self
            .senders
            .get(plant_id)
            .ok_or_else(|| SubmitError::WorkerStopped(plant_id.to_string()))?;
        tx.send(event)
            .await
            .map_err(|_| SubmitError::WorkerStopped(plant_id.to_string()))
    }

    /// Close every queue, let the workers drain, and sum their statistics.
    pub async fn shutdown(self) -> PipelineStats {
        let Self { senders, mut tasks, .. } = self;
        drop(senders);

        let mut total = PipelineStats::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((plant_id, stats)) => {
                    debug!(plant = %plant_id, %stats, "[Workers] Worker finished");
                    total.merge(&stats);
                }
                Err(e) => warn!(error = %e, "[Workers] Worker task failed"),
            }
        }
        total
    }
}

async fn run_worker(
    mut pipeline: PlantPipeline,
    mut rx: mpsc::Receiver<RawEvent>,
    app_state: Arc<RwLock<AppState>>,
) -> (String, PipelineStats) {
    let plant_id = pipeline.plant_id().to_string();
    debug!(plant = %plant_id, "[Workers] Worker running");

    while let Some(event) = rx.recv().await {
        // Rejections are logged and counted inside the pipeline.
        let _ = pipeline.handle(&event);
        let summary = PlantSummary::from_state(pipeline.state(), pipeline.stats());
        app_state.write().await.plants.insert(plant_id.clone(), summary);
    }

    (plant_id, pipeline.stats().clone())
}
