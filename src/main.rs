//! distlife CLI entry point

use anyhow::{Context, Result};
use distlife::config::cli::{Cli, ExecutionMode};
use distlife::config::{toml as config_toml, validator, Config};
use distlife::control::{AliveCounter, ControlSignal, Distributor, LocalCounter, RunSummary};
use distlife::coordinator::{LocalCoordinator, TurnCoordinator};
use distlife::distributed::{Broker, BrokerClient, RemoteCounter, Server, WorkerService};
use distlife::events::Event;
use distlife::io::{ImageStore, PgmStore, SeededStore};
use log::{debug, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

fn main() -> Result<()> {
    let cli = Cli::parse_args();
    cli.validate()?;

    let config = config_toml::load_config(&cli)?;
    init_logging(config.runtime.debug);

    validator::validate_for_mode(&config, cli.mode)
        .context("Configuration validation failed")?;

    if !config.runtime.events_json {
        println!("distlife v{}", env!("CARGO_PKG_VERSION"));
        println!("Partitioned Game of Life");
        println!();
        print_configuration(&config, cli.mode);
    }

    if config.runtime.dry_run {
        println!();
        println!("Dry run mode - configuration validated successfully");
        return Ok(());
    }

    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    let result = runtime.block_on(async {
        match cli.mode {
            ExecutionMode::Local => run_local(&config).await,
            ExecutionMode::Controller => run_controller(&config).await,
            ExecutionMode::Broker => run_broker(&config).await,
            ExecutionMode::Worker => run_worker(&config).await,
        }
    });

    // the stdin reader blocks a runtime thread until the next line
    runtime.shutdown_background();
    result
}

/// Initialise env_logger; `RUST_LOG` overrides the default level
fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();
}

/// Run the turn loop with in-process workers
async fn run_local(config: &Config) -> Result<()> {
    let coordinator = LocalCoordinator::spawn(
        config.run.width,
        config.run.height,
        config.run.threads,
        config.control.channel_capacity,
    );
    info!(
        "Local coordinator: {} workers over {} rows",
        coordinator.worker_count(),
        config.run.height
    );

    run_turns(config, coordinator, LocalCounter).await
}

/// Run the turn loop against a remote broker
async fn run_controller(config: &Config) -> Result<()> {
    let addr = &config.network.broker_address;
    let params = config.params();

    let coordinator = BrokerClient::connect(addr, params)
        .await
        .with_context(|| format!("Failed to connect to broker {}", addr))?;
    let counter = RemoteCounter::connect(addr, params)
        .await
        .with_context(|| format!("Failed to connect to broker {}", addr))?;
    info!("Connected to broker {}", addr);

    run_turns(config, coordinator, counter).await
}

/// Serve turns to a controller over a pool of remote workers
async fn run_broker(config: &Config) -> Result<()> {
    let broker = Broker::connect(&config.worker_addresses(), config.runtime.failure_policy).await;
    let server = Server::bind(&config.listen_address(), broker).await?;
    info!(
        "Broker listening on {} ({} workers, policy {})",
        server.local_addr()?,
        server.handler().pool_size().await,
        config.runtime.failure_policy
    );

    server.run().await
}

/// Serve partition requests for a broker
async fn run_worker(config: &Config) -> Result<()> {
    let server = WorkerService::bind(&config.worker_listen_address()).await?;
    info!("Worker listening on {}", server.local_addr()?);

    server.run().await
}

/// Drive one run: wire up events, key input and the image store, then report
async fn run_turns<C, A>(config: &Config, coordinator: C, counter: A) -> Result<()>
where
    C: TurnCoordinator,
    A: AliveCounter,
{
    let (event_tx, event_rx) = mpsc::channel(64);
    let (signal_tx, signal_rx) = mpsc::channel(16);

    let printer = tokio::spawn(print_events(event_rx, config.runtime.events_json));
    tokio::spawn(read_keys(signal_tx));

    let summary = match config.images.seed {
        Some(seed) => {
            let store = SeededStore::new(seed, config.images.density, pgm_store(config));
            run_distributor(config, coordinator, store, counter, event_tx, signal_rx).await
        }
        None => {
            run_distributor(config, coordinator, pgm_store(config), counter, event_tx, signal_rx)
                .await
        }
    };

    // the printer ends once the distributor drops its event sender
    if let Err(e) = printer.await {
        warn!("Event printer failed: {}", e);
    }

    let summary = summary?;
    if !config.runtime.events_json {
        print_summary(config, &summary);
    }
    Ok(())
}

async fn run_distributor<C, S, A>(
    config: &Config,
    coordinator: C,
    store: S,
    counter: A,
    events: mpsc::Sender<Event>,
    signals: mpsc::Receiver<ControlSignal>,
) -> Result<RunSummary>
where
    C: TurnCoordinator,
    S: ImageStore,
    A: AliveCounter,
{
    Distributor::new(
        coordinator,
        store,
        counter,
        config.params(),
        config.status_interval(),
        events,
        signals,
    )
    .run()
    .await
}

fn pgm_store(config: &Config) -> PgmStore {
    PgmStore::new(
        config.images.input_dir.clone(),
        config.images.output_dir.clone(),
    )
}

/// Print milestone events; per-turn events only show up at debug level
async fn print_events(mut events: mpsc::Receiver<Event>, json: bool) {
    while let Some(event) = events.recv().await {
        if json {
            match event.to_json() {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("Failed to encode event: {}", e),
            }
        } else if event.is_milestone() {
            info!("{}", event);
        } else {
            debug!("{}", event);
        }
    }
}

/// Turn key presses on stdin into control signals
async fn read_keys(signals: mpsc::Sender<ControlSignal>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read control input: {}", e);
                break;
            }
        };
        for key in line.chars().filter(|c| !c.is_whitespace()) {
            match ControlSignal::from_key(key) {
                Some(signal) => {
                    if signals.send(signal).await.is_err() {
                        return;
                    }
                }
                None => debug!("Ignoring key {:?}", key),
            }
        }
    }
}

fn print_configuration(config: &Config, mode: ExecutionMode) {
    println!("Configuration:");
    println!("  Mode: {:?}", mode);
    match mode {
        ExecutionMode::Local | ExecutionMode::Controller => {
            println!("  Board: {}x{}", config.run.width, config.run.height);
            println!("  Turns: {}", config.run.turns);
            println!("  Partitions: {}", config.run.threads);
            println!(
                "  Status interval: {:.1}s",
                config.status_interval().as_secs_f64()
            );
            match config.images.seed {
                Some(seed) => println!(
                    "  Initial board: random (seed {}, density {:.2})",
                    seed, config.images.density
                ),
                None => println!("  Input directory: {}", config.images.input_dir.display()),
            }
            println!("  Output directory: {}", config.images.output_dir.display());
            if mode == ExecutionMode::Controller {
                println!("  Broker: {}", config.network.broker_address);
            }
        }
        ExecutionMode::Broker => {
            println!("  Listen: {}", config.listen_address());
            println!("  Workers: {}", config.worker_addresses().join(", "));
            println!("  Failure policy: {}", config.runtime.failure_policy);
        }
        ExecutionMode::Worker => {
            println!("  Listen: {}", config.worker_listen_address());
        }
    }
    println!();
    println!("Keys: s = save, p = pause/resume, q = quit, k = shut down remote services");
    println!();
}

fn print_summary(config: &Config, summary: &RunSummary) {
    println!();
    println!("Run complete:");
    println!("  Turns completed: {}", summary.turns_completed);
    println!("  Alive cells: {}", summary.alive_cells);
    println!(
        "  Final image: {}",
        config
            .images
            .output_dir
            .join(format!("{}.pgm", summary.final_image))
            .display()
    );
    if summary.shutdown {
        println!("  Remote services shut down");
    }
}
