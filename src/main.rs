//! golnet CLI entry point

use anyhow::{Context, Result};
use golnet::config::cli::{Cli, ExecutionMode};
use golnet::config::toml::load_config;
use golnet::config::validator::validate_config;
use golnet::config::Config;
use golnet::controller::{
    report_events, stdin_keys, BoardView, EventListener, Key, LocalControl, RemoteControl,
    SessionController, SessionEnd, SessionSettings, SimulationControl,
};
use golnet::distributed::worker_service::get_node_id;
use golnet::distributed::{EngineClient, EngineService, WorkerService};
use golnet::engine::Engine;
use golnet::events::{ChannelSink, Event, EventSink};
use golnet::image::PgmStore;
use golnet::output::json::write_json_summary;
use golnet::output::text::print_results;
use golnet::output::RunReport;
use golnet::stats::TurnSummary;
use golnet::worker::LocalWorker;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let config = load_config(&cli)?;
    validate_config(&config, cli.mode).context("Configuration validation failed")?;
    init_logging(&config);

    println!("golnet v{}", env!("CARGO_PKG_VERSION"));
    println!("Distributed Game of Life");
    println!();

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match cli.mode {
        ExecutionMode::Engine => runtime.block_on(run_engine(config)),
        ExecutionMode::Worker => runtime.block_on(run_worker(config)),
        ExecutionMode::Controller => runtime.block_on(run_controller(config)),
        ExecutionMode::Local => runtime.block_on(run_local(config)),
    }
}

/// `RUST_LOG` wins over `--log-level`; `--debug` raises the default to debug
fn init_logging(config: &Config) {
    let level = if config.runtime.debug {
        "debug"
    } else {
        config.runtime.log_level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Run the engine service until a controller closes the system
async fn run_engine(config: Config) -> Result<()> {
    EngineService::new(config.engine.port)
        .with_close_grace(config.engine.close_grace())
        .run()
        .await
}

/// Run a worker service until the engine shuts it down
async fn run_worker(config: Config) -> Result<()> {
    let mut service = WorkerService::new(
        config.worker.port,
        config.engine.address.clone(),
        config.worker.threads,
    )
    .with_close_grace(config.worker.close_grace());
    if let Some(ref host) = config.worker.advertise {
        service = service.with_advertise(host.clone());
    }
    service.run().await
}

/// Drive a remote engine service
async fn run_controller(config: Config) -> Result<()> {
    let client = EngineClient::connect(config.engine.address.clone())
        .await
        .with_context(|| format!("Failed to reach engine at {}", config.engine.address))?;
    println!("Connected to engine at {}", config.engine.address);

    let (events_tx, events_rx) = mpsc::unbounded_channel();

    let mut listener_task = None;
    let mut events_address = None;
    if config.controller.visualize {
        let host = config
            .controller
            .advertise
            .clone()
            .unwrap_or_else(get_node_id);
        let listener = EventListener::bind(config.controller.port, &host).await?;
        events_address = Some(listener.address().to_string());
        listener_task = Some(listener.spawn(events_tx.clone()));
    }

    let control = Arc::new(RemoteControl::new(client, events_address));
    let result = run_session(&config, "controller", control, events_tx, events_rx, None).await;

    if let Some(task) = listener_task {
        task.abort();
    }
    result
}

/// Engine, in-process workers and controller in one process
async fn run_local(config: Config) -> Result<()> {
    let engine = Engine::new();
    let workers = config.worker.local_workers;
    let threads = (config.worker.threads / workers).max(1);
    for i in 0..workers {
        let worker = LocalWorker::new(format!("local-{}", i), threads)?;
        engine.register(Arc::new(worker))?;
    }
    println!("Local engine: {} workers x {} threads", workers, threads);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let sink = config
        .controller
        .visualize
        .then(|| Arc::new(ChannelSink::new(events_tx.clone())) as Arc<dyn EventSink>);

    let control = Arc::new(LocalControl::new(engine.clone(), sink));
    let result = run_session(
        &config,
        "local",
        control,
        events_tx,
        events_rx,
        Some(&engine),
    )
    .await;

    engine.close().await?;
    result
}

async fn run_session(
    config: &Config,
    mode: &str,
    control: Arc<dyn SimulationControl>,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    engine: Option<&Engine>,
) -> Result<()> {
    let store = Arc::new(PgmStore::new(
        &config.output.input_dir,
        &config.output.output_dir,
    ));
    let settings = SessionSettings::from_config(config);
    let (height, width) = (settings.height, settings.width);

    let reporter = tokio::spawn(report_events(
        events_rx,
        BoardView::new(height, width),
        config.output.print_events,
    ));

    let keys = if config.controller.keyboard {
        println!("Keys: s = save, p = pause/resume, q = quit, k = shut down (then Enter)");
        stdin_keys()
    } else {
        // Sender dropped: the controller sees closed input straight away
        mpsc::channel::<Key>(1).1
    };

    let started = Instant::now();
    let controller = SessionController::new(control, store, events_tx, settings);
    let end = match controller.run(keys).await {
        Ok(end) => end,
        Err(e) => {
            reporter.abort();
            return Err(e);
        }
    };
    let elapsed = started.elapsed();

    // The controller's last event ends the report
    reporter.await.context("Event reporter failed")?;

    if let SessionEnd::Detached { turn } = end {
        println!("Detached at turn {}", turn);
    }

    let turn_latency: Option<TurnSummary> = engine.map(Engine::turn_summary);
    let report = RunReport::new(mode, &end, height, width, elapsed, turn_latency);
    println!();
    print_results(&report);

    if let Some(ref path) = config.output.json_summary {
        write_json_summary(path, &report)?;
        println!("Summary written to {}", path.display());
    }

    Ok(())
}
