//! Node pool daemon: entry point for running the pool.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use nodepool_pool::{HealthMonitor, NodePool, PoolConfig, ShutdownController, Supervisor};
use nodepool_rpc::{AdminServer, AdminState};
use nodepool_utils::{init_logging, LogFormat};

#[derive(Parser)]
#[command(name = "nodepool-daemon", about = "Redundant blockchain node pool daemon")]
struct Cli {
    /// Path to a TOML configuration file. Without one every role is
    /// unconfigured. CLI flags and env vars override file settings.
    #[arg(long, env = "NODEPOOL_CONFIG")]
    config: Option<PathBuf>,

    /// Log format: "human" or "json".
    #[arg(long, env = "NODEPOOL_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "NODEPOOL_LOG_LEVEL")]
    log_level: Option<String>,

    /// Admin API port.
    #[arg(long, env = "NODEPOOL_ADMIN_PORT")]
    admin_port: Option<u16>,

    /// Bearer token for the admin API.
    #[arg(long, env = "NODEPOOL_ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Run the pool: health supervisor plus admin API, until SIGINT/SIGTERM.
    Run,
    /// Run one health sweep, print its errors as JSON and exit non-zero
    /// when there are any.
    Check,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<PoolConfig> {
        let mut config = match &self.config {
            Some(path) => PoolConfig::from_toml_file(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => PoolConfig::default(),
        };

        if let Some(format) = self.log_format {
            config.log_format = format;
        }
        if let Some(level) = &self.log_level {
            config.log_level = level.clone();
        }
        if let Some(port) = self.admin_port {
            config.admin.port = port;
        }
        if let Some(token) = &self.admin_token {
            config.admin.token = Some(token.clone());
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_logging(config.log_format, &config.log_level);

    if let Some(path) = &cli.config {
        tracing::info!("Loaded config from {}", path.display());
    }

    match cli.command {
        Command::Run => run(config).await,
        Command::Check => check(config).await,
    }
}

async fn run(config: PoolConfig) -> anyhow::Result<()> {
    let pool = Arc::new(NodePool::from_config(&config)?);
    tracing::info!(
        chain = ?config.chain,
        nodes = pool.clients().count(),
        admin_port = config.admin.port,
        "starting node pool"
    );
    if config.admin.token.is_none() {
        tracing::warn!("no admin token configured, the admin API rejects every request");
    }

    let supervisor = Supervisor::new(Arc::clone(&pool), &config.health);
    let state = AdminState {
        pool: Arc::clone(&pool),
        monitor: Arc::new(HealthMonitor::new(Arc::clone(&pool), &config.health)),
        supervisor: Some(supervisor.handle()),
        token: config.admin.token.as_deref().map(Arc::from),
    };
    let addr: SocketAddr = format!("{}:{}", config.admin.bind, config.admin.port)
        .parse()
        .with_context(|| format!("invalid admin address {}:{}", config.admin.bind, config.admin.port))?;

    let shutdown = ShutdownController::new();
    let mut stopped = shutdown.subscribe();
    let supervisor_task = tokio::spawn(supervisor.run(shutdown.subscribe()));
    let server = AdminServer::new(addr, state);
    let server_shutdown = shutdown.clone();
    let server_task = tokio::spawn(async move {
        let result = server.serve(server_shutdown.subscribe()).await;
        // The server only returns early on failure; take the daemon down with it.
        server_shutdown.shutdown();
        result
    });

    tokio::select! {
        signal = shutdown.wait_for_signal() => {
            signal.context("failed to listen for shutdown signals")?;
        }
        _ = stopped.recv() => {}
    }

    supervisor_task.await.context("health supervisor panicked")?;
    server_task
        .await
        .context("admin server panicked")?
        .context("admin server failed")?;

    tracing::info!("node pool daemon exited cleanly");
    Ok(())
}

async fn check(config: PoolConfig) -> anyhow::Result<()> {
    let pool = Arc::new(NodePool::from_config(&config)?);
    let monitor = HealthMonitor::new(pool, &config.health);

    let errors = monitor.check_all().await;
    println!("{}", serde_json::to_string_pretty(&errors)?);

    if !errors.is_empty() {
        anyhow::bail!("{} health error(s) found", errors.len());
    }
    Ok(())
}
