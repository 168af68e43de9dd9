//! `node-pool` command line.
//!
//! Builds a pool from a TOML config (plus any `--host` flags) and either
//! reports node health, runs selections, or keeps the pool synced with the
//! config file until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use node_pool::config::watcher::ConfigWatcher;
use node_pool::config::{load_config, PoolConfig};
use node_pool::net::{EndpointSpec, Host, Status};
use node_pool::observability::logging::init_logging;
use node_pool::{Pool, PoolBuilder};

#[derive(Parser)]
#[command(name = "node-pool")]
#[command(about = "Inspect and exercise a pool of cluster nodes", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra node address (repeatable).
    #[arg(short = 'H', long = "host")]
    hosts: Vec<String>,

    /// Override the configured log level.
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every node once and print the pool state as JSON
    Status,
    /// Run selections and print the chosen nodes
    Select {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,
    },
    /// Keep the pool synced with the config file until Ctrl-C
    Watch,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => PoolConfig::default(),
    };
    config
        .hosts
        .extend(cli.hosts.iter().cloned().map(EndpointSpec::Address));

    let level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| config.observability.log_level.clone());
    init_logging(&level);

    let pool = PoolBuilder::from_config(&config)?.build()?;

    match cli.command {
        Commands::Status => {
            for conn in pool.get_connections() {
                if let Err(e) = conn.ping().await {
                    tracing::warn!(host = %conn.host(), error = %e, "Node unreachable");
                    conn.set_status(Status::Dead);
                }
            }
            println!("{}", serde_json::to_string_pretty(&pool.snapshot())?);
        }
        Commands::Select { count } => {
            for _ in 0..count {
                match pool.select().await {
                    Ok(Some(conn)) => println!("{}", conn.host()),
                    Ok(None) => println!("(no selection)"),
                    Err(e) => eprintln!("Error: {}", e),
                }
            }
        }
        Commands::Watch => {
            let Some(path) = cli.config.as_deref() else {
                return Err("watch requires --config".into());
            };
            let extra_hosts = cli
                .hosts
                .iter()
                .map(|address| address.parse::<Host>())
                .collect::<Result<Vec<_>, _>>()?;
            watch(&pool, path, extra_hosts).await?;
        }
    }

    pool.close();
    Ok(())
}

async fn watch(
    pool: &Pool,
    path: &std::path::Path,
    extra_hosts: Vec<Host>,
) -> Result<(), Box<dyn std::error::Error>> {
    let _guard = ConfigWatcher::new(path)
        .with_extra_hosts(extra_hosts)
        .spawn(pool.clone())?;
    let mut ticker = tokio::time::interval(Duration::from_secs(10));

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let snapshot = pool.snapshot();
                tracing::info!(alive = snapshot.alive.len(), dead = snapshot.dead.len(), "Pool status");
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }
    Ok(())
}
