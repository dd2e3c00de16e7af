use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use nodeweather_core::{AppError, Config, ConfigError, StorageBackend};
use nodeweather_storage::{
    LocalStore, NewFavorite, NewHistoryEntry, RecordStore, RemoteStore, Services, SqliteStore,
    StoreError,
};
use serde_json::Value;

#[derive(Parser, Debug)]
#[command(name = "nodeweather")]
#[command(about = "Favorite cities and search history for the weather app", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file to load instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend, overriding the config file
    #[arg(short, long, global = true)]
    backend: Option<StorageBackend>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the REST API
    Serve {
        /// Port to listen on, overriding the config file
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage favorite cities
    #[command(subcommand)]
    #[command(alias = "fav")]
    Favorites(FavoritesCommand),

    /// Manage search history
    #[command(subcommand)]
    History(HistoryCommand),

    /// Show usage statistics
    #[command(subcommand)]
    Stats(StatsCommand),

    /// Delete all favorites and all history
    Reset,
}

#[derive(Subcommand, Debug)]
enum FavoritesCommand {
    /// Save a city
    Add {
        name: String,
        #[arg(allow_negative_numbers = true)]
        lat: f64,
        #[arg(allow_negative_numbers = true)]
        lon: f64,
    },
    /// List saved cities
    #[command(alias = "ls")]
    List,
    /// Remove a city by name
    #[command(alias = "rm")]
    Remove { name: String },
    /// Remove every saved city
    Clear,
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    /// Record a lookup
    Add {
        city: String,
        /// Date as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Temperature
        #[arg(long, allow_negative_numbers = true)]
        temp: Option<f64>,
        /// Weather conditions, e.g. "Clouds"
        #[arg(long)]
        conditions: Option<String>,
    },
    /// List recent lookups, newest first
    #[command(alias = "ls")]
    List {
        #[arg(short, long)]
        limit: Option<i64>,
    },
    /// Delete all history
    Clear,
    /// Delete entries older than the given number of days
    Prune {
        #[arg(short, long)]
        days: Option<i64>,
    },
}

#[derive(Subcommand, Debug)]
enum StatsCommand {
    /// Most looked-up cities
    Top {
        #[arg(short, long)]
        limit: Option<i64>,
    },
    /// Row counts of favorites and history
    Totals,
    /// Lookups recorded on one date
    Today {
        /// Date as YYYY-MM-DD (defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    nodeweather_core::init()?;

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    if let Some(backend) = cli.backend {
        config.storage.backend = backend;
    }

    tracing::debug!("Using {:?} storage backend", config.storage.backend);

    match config.storage.backend {
        StorageBackend::Sqlite => {
            let store = SqliteStore::open(&config.storage.sqlite_path)
                .context("Failed to open SQLite database")?;
            run(cli.command, &config, store).await
        }
        StorageBackend::Local => {
            let store = LocalStore::open(&config.storage.local_dir)
                .context("Failed to open local storage")?;
            run(cli.command, &config, store).await
        }
        StorageBackend::Remote => {
            if matches!(cli.command, Commands::Serve { .. }) {
                anyhow::bail!("The remote backend cannot be served; choose sqlite or local");
            }
            let store = RemoteStore::new(&config.storage.remote_url)?;
            run(cli.command, &config, store).await
        }
    }
}

/// Load and validate the config, turning config faults into a user message.
fn load_config(path: Option<&Path>) -> Result<Config> {
    match Config::load_validated(path) {
        Ok((config, _)) => Ok(config),
        Err(e) => match e.downcast::<ConfigError>() {
            Ok(config_error) => {
                let error = AppError::from(config_error);
                anyhow::bail!("{} ({})", error.user_message(), error)
            }
            Err(other) => Err(other),
        },
    }
}

async fn run<S: RecordStore + 'static>(
    command: Commands,
    config: &Config,
    store: S,
) -> Result<()> {
    let services = Services::new(store, config.history.max_entries);

    let output = match command {
        Commands::Serve { port } => {
            let mut server = config.server.clone();
            if let Some(port) = port {
                server.port = port;
            }
            return nodeweather_server::serve(services, server.bind_addr()?).await;
        }
        Commands::Favorites(cmd) => favorites(&services, cmd).await,
        Commands::History(cmd) => history(&services, cmd).await,
        Commands::Stats(cmd) => stats(&services, cmd).await,
        Commands::Reset => services.reset().await.and_then(to_value),
    };

    match output {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(())
        }
        Err(e) => {
            tracing::debug!("Command failed: {}", e);
            let error = AppError::from(e);
            let message = match &error {
                AppError::Validation(detail) => detail.clone(),
                other => format!("{} ({})", other.user_message(), other),
            };
            anyhow::bail!(message)
        }
    }
}

async fn favorites<S: RecordStore>(
    services: &Services<S>,
    cmd: FavoritesCommand,
) -> Result<Value, StoreError> {
    let manager = &services.favorites;
    let value = match cmd {
        FavoritesCommand::Add { name, lat, lon } => {
            to_value(manager.add(NewFavorite::new(name, lat, lon)).await?)?
        }
        FavoritesCommand::List => to_value(manager.list().await?)?,
        FavoritesCommand::Remove { name } => {
            serde_json::json!({ "deleted": manager.remove_by_name(&name).await? })
        }
        FavoritesCommand::Clear => serde_json::json!({ "deleted": manager.clear().await? }),
    };
    Ok(value)
}

async fn history<S: RecordStore>(
    services: &Services<S>,
    cmd: HistoryCommand,
) -> Result<Value, StoreError> {
    let manager = &services.history;
    let value = match cmd {
        HistoryCommand::Add {
            city,
            date,
            temp,
            conditions,
        } => {
            let input = NewHistoryEntry {
                city: Some(city),
                date,
                temp,
                conditions,
            };
            to_value(manager.add(input).await?)?
        }
        HistoryCommand::List { limit } => to_value(manager.list(limit).await?)?,
        HistoryCommand::Clear => serde_json::json!({ "deleted": manager.clear().await? }),
        HistoryCommand::Prune { days } => to_value(manager.prune_older_than(days).await?)?,
    };
    Ok(value)
}

async fn stats<S: RecordStore>(
    services: &Services<S>,
    cmd: StatsCommand,
) -> Result<Value, StoreError> {
    let stats = &services.stats;
    let value = match cmd {
        StatsCommand::Top { limit } => to_value(stats.top_cities(limit).await?)?,
        StatsCommand::Totals => to_value(stats.totals().await?)?,
        StatsCommand::Today { date } => to_value(stats.today(date.as_deref()).await?)?,
    };
    Ok(value)
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, StoreError> {
    serde_json::to_value(value)
        .context("Failed to serialize result")
        .map_err(StoreError::from)
}
