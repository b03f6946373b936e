use catalog_search::Result;
use catalog_search::commands::{configure, run_refresh, run_search, serve_mcp, show_status};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "catalog-search")]
#[command(about = "Natural-language search over a table/column catalog, served over MCP")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the index storage
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and catalog settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Start MCP server on stdio
    Serve,
    /// Search the catalog for tables matching a query
    Search {
        /// Natural-language question or table name
        query: String,
        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },
    /// Rebuild or reload the index when the metadata file changed
    Refresh {
        /// Metadata file to index instead of the configured one
        #[arg(long)]
        metadata_path: Option<PathBuf>,
    },
    /// Show configuration, Ollama health and index state
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries MCP traffic when serving
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir.as_deref();

    match cli.command {
        Commands::Config { show } => {
            configure(config_dir, show)?;
        }
        Commands::Serve => {
            serve_mcp(config_dir).await?;
        }
        Commands::Search { query, json } => {
            run_search(config_dir, &query, json).await?;
        }
        Commands::Refresh { metadata_path } => {
            run_refresh(config_dir, metadata_path.as_deref()).await?;
        }
        Commands::Status => {
            show_status(config_dir).await?;
        }
    }

    Ok(())
}
