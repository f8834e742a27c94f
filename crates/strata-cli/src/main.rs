//! Strata CLI - operate the storage adapters from a shell
//!
//! Connection settings come from the process environment (optionally seeded
//! from a dotenv file): `POSTGRES_*`, `MONGO_*` and `REDIS_*`.

mod commands;

use clap::{Parser, Subcommand};
use commands::{DocCommand, PublishCommand, QueueCommand, SqlCommand, SubscribeCommand};
use std::path::PathBuf;
use strata_query::ConfigManager;
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "STRATA_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "STRATA_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    /// Dotenv file with connection settings
    #[arg(long, env = "STRATA_ENV_FILE", global = true)]
    env_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Redis task queues
    Queue(QueueCommand),
    /// Publish a message on a Redis channel
    Publish(PublishCommand),
    /// Listen on a Redis channel
    Subscribe(SubscribeCommand),
    /// MongoDB documents
    Doc(DocCommand),
    /// PostgreSQL queries
    Sql(SqlCommand),
}

fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // RUST_LOG takes full control when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .map_err(|e| anyhow::anyhow!("Invalid RUST_LOG environment variable: {}", e))?
    } else {
        tracing_subscriber::EnvFilter::new(format!(
            "strata={level},\
             strata_query={level},\
             strata_query_postgres={level},\
             strata_query_redis={level},\
             strata_query_mongodb={level},\
             tokio_postgres=warn,\
             mongodb=warn,\
             redis=warn",
            level = log_level
        ))
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
        _ => tracing_subscriber::fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set global default subscriber: {}", e))?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, &cli.log_format)?;

    let config = match &cli.env_file {
        Some(path) => ConfigManager::new().with_env_file(path),
        None => ConfigManager::new(),
    };

    match cli.command {
        Commands::Queue(cmd) => cmd.execute(&config),
        Commands::Publish(cmd) => cmd.execute(&config),
        Commands::Subscribe(cmd) => cmd.execute(&config),
        Commands::Doc(cmd) => cmd.execute(&config),
        Commands::Sql(cmd) => cmd.execute(&config),
    }
}
