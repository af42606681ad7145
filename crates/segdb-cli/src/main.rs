mod clustering;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use segdb_db::{PgStore, SegmentationStore};
use tracing_subscriber::EnvFilter;

use crate::clustering::ClusteringCommands;

#[derive(Debug, Parser)]
#[command(name = "segdb-cli")]
#[command(about = "Customer segmentation operator CLI")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Clustering runs, history and reconciliation
    Clustering {
        #[command(subcommand)]
        command: ClusteringCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("segdb-cli: pass --help to list commands");
        return Ok(());
    };

    let config = segdb_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = segdb_db::PoolConfig::from_app_config(&config);
    let pool = segdb_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            segdb_db::ping(&pool).await?;
            println!("database reachable");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = segdb_db::run_migrations(&pool).await?;
            println!("migrations up to date ({applied} applied)");
        }
        Commands::Clustering { command } => {
            let store: Arc<dyn SegmentationStore> = Arc::new(PgStore::new(pool));
            clustering::dispatch(store, &config, command).await?;
        }
    }

    Ok(())
}
