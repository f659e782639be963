use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use robot_risk::common::Actor;
use robot_risk::config::{EngineConfig, FleetLayout};
use robot_risk::database::connection::{get_database_url, setup_database};
use robot_risk::server;
use robot_risk::services::import_service::CsvImportBatch;
use robot_risk::trajectory::CheckConfig;
use robot_risk::AppContext;

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    #[clap(short, long, global = true)]
    log_level: Option<String>,
    /// Engine configuration file (TOML)
    #[clap(short, long, global = true)]
    config: Option<PathBuf>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Serve {
        #[clap(short, long)]
        port: Option<u16>,
        #[clap(short, long)]
        database: Option<String>,
        #[clap(long)]
        cors_origin: Option<String>,
    },
    Db {
        #[clap(subcommand)]
        command: DbCommands,
    },
    /// Import a component CSV as the system admin
    Import {
        #[clap(short, long)]
        file: PathBuf,
        /// Overrides `import.timeout_secs`
        #[clap(long)]
        timeout_secs: Option<u64>,
        #[clap(short, long)]
        database: Option<String>,
    },
    /// Run a trajectory check from a JSON config file
    Check {
        #[clap(long)]
        config_file: PathBuf,
        #[clap(short, long)]
        database: Option<String>,
    },
    /// Print the trajectory check config template
    Template,
}

#[derive(Subcommand, Debug)]
enum DbCommands {
    Init {
        #[clap(short, long)]
        database: Option<String>,
    },
    Migrate {
        #[clap(subcommand)]
        direction: server::MigrateDirection,
        #[clap(short, long)]
        database: Option<String>,
    },
    /// Create groups and components from a fleet layout file
    Seed {
        #[clap(long)]
        layout: PathBuf,
        #[clap(short, long)]
        database: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    setup_logging(&args.log_level);

    let mut config = EngineConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Serve {
            port,
            database,
            cors_origin,
        } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(database) = database {
                config.database.path = database;
            }
            if cors_origin.is_some() {
                config.server.cors_origin = cors_origin;
            }
            info!("Starting server on port {}", config.server.port);
            server::start_server(config).await?;
        }
        Commands::Db { command } => match command {
            DbCommands::Init { database } => {
                let database = database.unwrap_or(config.database.path);
                info!("Initializing database: {}", database);
                server::migrate_database(&database, server::MigrateDirection::Up).await?;
            }
            DbCommands::Migrate {
                direction,
                database,
            } => {
                let database = database.unwrap_or(config.database.path);
                info!("Running database migration: {:?}", direction);
                server::migrate_database(&database, direction).await?;
            }
            DbCommands::Seed { layout, database } => {
                if let Some(database) = database {
                    config.database.path = database;
                }
                let layout = FleetLayout::load(&layout)?;
                let ctx = open_context(config).await?;
                let summary = ctx.registry().apply_layout(&layout).await?;
                print_json(&summary)?;
            }
        },
        Commands::Import {
            file,
            timeout_secs,
            database,
        } => {
            if let Some(database) = database {
                config.database.path = database;
            }
            info!("Importing components from {}", file.display());
            let batch = CsvImportBatch::from_path(&file)?;
            let ctx = open_context(config).await?;
            let summary = ctx
                .imports()
                .import_components(batch, &Actor::system(), timeout_secs)
                .await?;
            print_json(&summary)?;
        }
        Commands::Check {
            config_file,
            database,
        } => {
            if let Some(database) = database {
                config.database.path = database;
            }
            let content = std::fs::read_to_string(&config_file)
                .with_context(|| format!("failed to read {}", config_file.display()))?;
            let check: CheckConfig = serde_json::from_str(&content)
                .with_context(|| format!("invalid check config {}", config_file.display()))?;
            let ctx = open_context(config).await?;
            let result = ctx.checks().execute(check).await?;
            print_json(&result)?;
        }
        Commands::Template => {
            print_json(&CheckConfig::template(&config.trajectory))?;
        }
    }

    Ok(())
}

async fn open_context(config: EngineConfig) -> Result<AppContext> {
    let database_url = get_database_url(Some(&config.database.path));
    let db = setup_database(&database_url).await?;
    Ok(AppContext::new(db, config))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn setup_logging(log_level: &Option<String>) {
    let log_level = match log_level
        .as_ref()
        .unwrap_or(&"info".to_string())
        .to_lowercase()
        .as_str()
    {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("sqlx=warn,{}", log_level)))
        .without_time()
        .init();
}
