//! RenewCast - per-plant streaming decision loop
//!
//! Ingests plant telemetry, maintains an online forecast band per plant,
//! proposes backup dispatch, gates it against grid constraints and publishes
//! decisions, anomalies and forecasts to append-only output logs.
//!
//! # Usage
//!
//! ```bash
//! # Run with the seeded synthetic generator (three reference plants)
//! cargo run --release
//!
//! # Replay a JSONL event file as fast as possible
//! ./renewcast --source replay --replay events.jsonl --speed 0
//!
//! # Read JSONL events from stdin
//! ./simulator | ./renewcast --source stdin
//!
//! # Inject a fault while running
//! ./renewcast-inject fault GJ01 cloud --severity high
//! ```
//!
//! # Environment Variables
//!
//! - `RENEWCAST_CONFIG`: Path to renewcast.toml (default: ./renewcast.toml)
//! - `RENEWCAST_ADDR`: HTTP bind address (default: 0.0.0.0:8080)
//! - `RENEWCAST_CORS_ORIGINS`: Comma-separated allowed dashboard origins
//! - `RUST_LOG`: Logging level (default: info)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, ValueEnum};
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use renewcast::acquisition::SyntheticGenerator;
use renewcast::anomaly::AnomalyDetector;
use renewcast::api::{create_app, ApiState};
use renewcast::config::{self, defaults, PolicyMode, RenewcastConfig, StorageBackend};
use renewcast::emitter::{DecisionEmitter, Publisher, RetryPolicy};
use renewcast::forecast::WindowedForecaster;
use renewcast::pipeline::{
    AppState, EventSource, PipelineContext, PlantWorkers, ProcessingLoop, ReplaySource, StdinSource,
    SyntheticSource,
};
use renewcast::policy::{run_model_watcher, DispatchPolicy, ModelEvent, PolicyHandle, PolicyModel, WatchTiming};
use renewcast::registry::PlantRegistry;
use renewcast::storage::{OutputLogs, ProcessLock};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// Seeded synthetic telemetry for every configured plant
    Synthetic,
    /// JSONL events on stdin
    Stdin,
    /// JSONL events from a file (see --replay)
    Replay,
}

#[derive(Parser, Debug)]
#[command(name = "renewcast")]
#[command(about = "RenewCast per-plant forecast, dispatch and compliance engine")]
#[command(version)]
struct CliArgs {
    /// Path to renewcast.toml (overrides RENEWCAST_CONFIG and ./renewcast.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the server address (default: "0.0.0.0:8080")
    #[arg(short, long, env = "RENEWCAST_ADDR")]
    addr: Option<String>,

    /// Where events come from
    #[arg(long, value_enum, default_value = "synthetic")]
    source: SourceKind,

    /// JSONL file for `--source replay`
    #[arg(long, value_name = "PATH")]
    replay: Option<PathBuf>,

    /// Synthetic generator seed
    #[arg(long)]
    seed: Option<u64>,

    /// Speed multiplier (1 = one tick per second, 60 = 60x faster, 0 = no delay)
    #[arg(long, default_value = "1")]
    speed: u64,

    /// Stop the synthetic source after this many ticks
    #[arg(long)]
    max_ticks: Option<u64>,

    /// Dispatch policy variant (learned | rule)
    #[arg(long)]
    policy: Option<PolicyMode>,

    /// Keep output logs in memory instead of sled
    #[arg(long)]
    in_memory: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    dump_config: bool,
}

impl CliArgs {
    fn delay_ms(&self) -> u64 {
        if self.speed == 0 {
            0
        } else {
            defaults::SIMULATION_BASE_DELAY_MS / self.speed
        }
    }

    /// Apply CLI overrides on top of the loaded file/defaults.
    fn apply(&self, config: &mut RenewcastConfig) {
        if let Some(addr) = &self.addr {
            config.server.addr.clone_from(addr);
        }
        if let Some(seed) = self.seed {
            config.simulation.seed = seed;
        }
        if let Some(mode) = self.policy {
            config.policy.mode = mode;
        }
        if self.in_memory {
            config.storage.backend = StorageBackend::Memory;
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
    }
}

// ============================================================================
// Supervisor Task Names
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum TaskName {
    HttpServer,
    EventLoop,
    Publisher,
    ModelWatcher,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::HttpServer => write!(f, "HttpServer"),
            TaskName::EventLoop => write!(f, "EventLoop"),
            TaskName::Publisher => write!(f, "Publisher"),
            TaskName::ModelWatcher => write!(f, "ModelWatcher"),
        }
    }
}

// ============================================================================
// Shared Pipeline Initialization
// ============================================================================

/// Everything the tasks need, built before anything is spawned.
struct PipelineCore {
    app_state: Arc<RwLock<AppState>>,
    _process_lock: Option<ProcessLock>,
    workers: PlantWorkers,
    publisher: Publisher,
    control_rx: mpsc::Receiver<renewcast::RawEvent>,
    policy_handle: PolicyHandle,
    registry: Arc<PlantRegistry>,
    listener: tokio::net::TcpListener,
    app: Router,
}

/// Open storage, load the policy model, start the plant workers and bind
/// the HTTP listener.
async fn init_pipeline(config: &RenewcastConfig, cancel_token: &CancellationToken) -> Result<PipelineCore> {
    let registry = Arc::new(PlantRegistry::from_config(&config.plants).context("Invalid plant registry")?);
    info!("🏭 Plants: {}", registry.ids().collect::<Vec<_>>().join(", "));

    // Output logs
    let (process_lock, logs) = match config.storage.backend {
        StorageBackend::Memory => {
            info!("💾 Storage: in-memory (records are lost on exit)");
            (None, OutputLogs::in_memory())
        }
        StorageBackend::Sled => {
            let lock = ProcessLock::acquire(&config.storage.data_dir)?;
            let db_path = config.storage.data_dir.join(defaults::OUTPUT_DB_NAME);
            let logs = OutputLogs::open_sled(&db_path)
                .with_context(|| format!("Failed to open output logs at {}", db_path.display()))?;
            info!("💾 Storage: sled at {}", db_path.display());
            (Some(lock), logs)
        }
    };
    let counts = logs.counts();
    if counts.total() > 0 {
        info!(
            approved = counts.approved,
            held = counts.held,
            anomalies = counts.anomalies,
            forecasts = counts.forecasts,
            "💾 Resuming existing output logs"
        );
    }

    // Policy model
    let model = match &config.policy.model_path {
        Some(path) => match PolicyModel::load(path) {
            Ok(model) => {
                info!(path = %path.display(), version = %model.version, "🧠 Policy model loaded");
                Some(model)
            }
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "🧠 Policy model unusable, rule fallback until a valid model appears"
                );
                None
            }
        },
        None => Some(PolicyModel::builtin()),
    };
    let policy_handle = PolicyHandle::new(model);

    // Emitter → publisher
    let (emitter, outbox) = DecisionEmitter::channel(config.storage.record_forecasts);
    let (notify, _) = broadcast::channel(config.publish.notify_capacity);
    let publisher = Publisher::new(
        outbox,
        logs.clone(),
        notify.clone(),
        RetryPolicy::from_config(&config.publish),
    );

    let policy = DispatchPolicy::from_config(&config.policy, policy_handle.clone());
    info!(
        "🧭 Policy: {} (active version {})",
        policy.variant_name(),
        policy.active_version()
    );

    let app_state = Arc::new(RwLock::new(AppState {
        policy_variant: policy.variant_name().to_string(),
        ..AppState::default()
    }));

    let ctx = Arc::new(PipelineContext::new(
        Arc::clone(&registry),
        WindowedForecaster::new(config.forecast.clone()),
        policy,
        AnomalyDetector::new(config.anomaly.clone()),
        emitter,
    ));
    // The workers hold the only context reference so the outbox closes
    // once they have drained.
    let workers = PlantWorkers::spawn(ctx, Arc::clone(&app_state), config.publish.worker_queue_depth).await;

    let (control, control_rx) = mpsc::channel(defaults::CONTROL_CHANNEL_CAPACITY);
    let api_state = ApiState {
        app_state: Arc::clone(&app_state),
        registry: Arc::clone(&registry),
        logs,
        notify,
        control,
        policy: policy_handle.clone(),
        shutdown: cancel_token.clone(),
    };
    let app = create_app(api_state);

    let listener = tokio::net::TcpListener::bind(&config.server.addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.addr))?;
    info!("🌐 API listening on http://{}/api/v1", config.server.addr);

    Ok(PipelineCore {
        app_state,
        _process_lock: process_lock,
        workers,
        publisher,
        control_rx,
        policy_handle,
        registry,
        listener,
        app,
    })
}

// ============================================================================
// Task Spawning
// ============================================================================

/// Spawn the HTTP server task into the JoinSet.
fn spawn_http_server(
    task_set: &mut JoinSet<Result<TaskName>>,
    listener: tokio::net::TcpListener,
    app: Router,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[HttpServer] Task starting");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                info!("[HttpServer] Received shutdown signal");
            })
            .await;

        match result {
            Ok(()) => {
                info!("[HttpServer] Graceful shutdown complete");
                Ok(TaskName::HttpServer)
            }
            Err(e) => {
                error!("[HttpServer] Server error: {}", e);
                Err(anyhow::anyhow!("HTTP server error: {}", e))
            }
        }
    });
}

/// Spawn the publisher. It stops once every worker has dropped its emitter
/// and the outbox is empty; cancellation only cuts retry waits short.
fn spawn_publisher(task_set: &mut JoinSet<Result<TaskName>>, publisher: Publisher, cancel_token: CancellationToken) {
    task_set.spawn(async move {
        info!("[Publisher] Task starting");
        let stats = publisher.run(cancel_token).await;
        if stats.abandoned > 0 {
            warn!(abandoned = stats.abandoned, "[Publisher] Records were not stored");
        }
        Ok(TaskName::Publisher)
    });
}

/// Spawn the model file watcher and log every swap or rejection.
fn spawn_model_watcher(
    task_set: &mut JoinSet<Result<TaskName>>,
    path: PathBuf,
    handle: PolicyHandle,
    cancel_token: CancellationToken,
) {
    task_set.spawn(async move {
        info!("[ModelWatcher] Task starting");
        let (tx, mut rx) = mpsc::channel(8);
        let watcher = tokio::spawn(run_model_watcher(path, handle, tx, WatchTiming::default(), cancel_token));

        while let Some(event) = rx.recv().await {
            match event {
                ModelEvent::Swapped { version } => {
                    info!(version = %version, "[ModelWatcher] Policy model swapped");
                }
                ModelEvent::Rejected(reason) => {
                    warn!(reason = %reason, "[ModelWatcher] Policy model rejected, keeping previous");
                }
            }
        }

        watcher.await.context("model watcher panicked")?;
        Ok(TaskName::ModelWatcher)
    });
}

/// Spawn the event loop for a concrete source.
fn spawn_event_loop<S: EventSource>(
    task_set: &mut JoinSet<Result<TaskName>>,
    processing_loop: ProcessingLoop,
    mut source: S,
) {
    task_set.spawn(async move {
        info!("[EventLoop] Task starting");
        let stats = processing_loop.run(&mut source).await;
        info!("[EventLoop] {}", stats);
        Ok(TaskName::EventLoop)
    });
}

/// Run the supervisor loop: monitor tasks, cancel on failure, then give the
/// remaining tasks a bounded window to drain.
async fn run_supervisor(task_set: &mut JoinSet<Result<TaskName>>, cancel_token: CancellationToken) -> Result<()> {
    info!("🔒 Supervisor: All tasks spawned, monitoring...");

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("🛑 Supervisor: Shutdown signal received");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!("🔒 Supervisor: Task {} completed normally", task_name);
                    }
                    Some(Ok(Err(e))) => {
                        error!("🔒 Supervisor: Task failed with error: {}", e);
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!("🔒 Supervisor: Task panicked: {}", e);
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("Task panicked: {}", e));
                    }
                    None => {
                        info!("🔒 Supervisor: All tasks completed");
                        return Ok(());
                    }
                }
            }
        }
    }

    let drain = async {
        while let Some(result) = task_set.join_next().await {
            match result {
                Ok(Ok(task_name)) => info!("🔒 Supervisor: Task {} stopped", task_name),
                Ok(Err(e)) => warn!("🔒 Supervisor: Task stopped with error: {}", e),
                Err(e) => warn!("🔒 Supervisor: Task panicked during shutdown: {}", e),
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(defaults::SHUTDOWN_GRACE_SECS), drain)
        .await
        .is_err()
    {
        warn!(
            "🔒 Supervisor: Tasks still running after {}s, aborting",
            defaults::SHUTDOWN_GRACE_SECS
        );
        task_set.abort_all();
    }
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    let mut app_config = match &args.config {
        Some(path) => RenewcastConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => RenewcastConfig::load().context("Failed to load configuration")?,
    };
    args.apply(&mut app_config);

    if args.dump_config {
        println!("{}", app_config.to_toml()?);
        return Ok(());
    }

    config::init(app_config);
    let app_config = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  RenewCast - Renewable Plant Decision Loop");
    info!("  Forecast → Dispatch → Compliance → Publish");
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("");

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let core = init_pipeline(app_config, &cancel_token).await?;

    info!("🔒 Supervisor: Initializing task monitoring");
    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    spawn_http_server(&mut task_set, core.listener, core.app, cancel_token.clone());
    spawn_publisher(&mut task_set, core.publisher, cancel_token.clone());

    if app_config.policy.mode == PolicyMode::Learned && app_config.policy.watch_model {
        if let Some(path) = &app_config.policy.model_path {
            spawn_model_watcher(&mut task_set, path.clone(), core.policy_handle.clone(), cancel_token.clone());
        }
    }

    let processing_loop = ProcessingLoop::new(
        core.workers,
        Arc::clone(&core.app_state),
        core.control_rx,
        cancel_token.clone(),
    );

    let delay_ms = args.delay_ms();
    info!(
        "⏱️  Speed: {}x ({}ms delay between ticks)",
        if args.speed == 0 {
            "max".to_string()
        } else {
            args.speed.to_string()
        },
        delay_ms
    );

    match args.source {
        SourceKind::Synthetic => {
            info!(
                "📥 Input: synthetic telemetry (seed {}, {} plants)",
                app_config.simulation.seed,
                core.registry.len()
            );
            let generator = SyntheticGenerator::new(&core.registry, &app_config.simulation);
            let source = SyntheticSource::new(generator, delay_ms, args.max_ticks);
            spawn_event_loop(&mut task_set, processing_loop, source);
        }
        SourceKind::Stdin => {
            info!("📥 Input: stdin (JSONL events)");
            spawn_event_loop(&mut task_set, processing_loop, StdinSource::new());
        }
        SourceKind::Replay => {
            let path = args
                .replay
                .clone()
                .context("--source replay requires --replay PATH")?;
            info!("📥 Input: replay file {}", path.display());
            let source = ReplaySource::from_file(&path, delay_ms).await?;
            spawn_event_loop(&mut task_set, processing_loop, source);
        }
    }

    run_supervisor(&mut task_set, cancel_token).await?;

    info!("");
    info!("✓ RenewCast shutdown complete");
    Ok(())
}
