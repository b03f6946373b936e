use anyhow::{Context, Result, bail};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::catalog::Fingerprint;
use crate::config::links::{links_config_file, resolve_base_url};
use crate::config::{Config, get_config_dir, run_interactive_config, show_config};
use crate::embeddings::OllamaClient;
use crate::index::LanceIndexStore;
use crate::lifecycle::{IndexLifecycle, SourceRegistry, storage_dir_for};
use crate::mcp::{McpServer, register_catalog_tools};
use crate::ranking::RankedTable;
use crate::service::{CatalogService, ResponseStatus};

fn load_config(config_dir: Option<&Path>) -> Result<Config> {
    let dir = get_config_dir(config_dir).context("Failed to resolve configuration directory")?;
    Config::load(&dir).context("Failed to load configuration")
}

/// Run the interactive setup, or print the current settings when `show` is set
#[inline]
pub fn configure(config_dir: Option<&Path>, show: bool) -> Result<()> {
    let dir = get_config_dir(config_dir).context("Failed to resolve configuration directory")?;
    if show {
        show_config(&dir)
    } else {
        run_interactive_config(&dir)
    }
}

/// Serve catalog search over MCP on stdio until the client disconnects or Ctrl-C
#[inline]
pub async fn serve_mcp(config_dir: Option<&Path>) -> Result<()> {
    let config = load_config(config_dir)?;
    info!(
        "Starting catalog search MCP server for {}",
        config.catalog.metadata_path.display()
    );

    let service = Arc::new(
        CatalogService::start(&config)
            .await
            .context("Failed to initialize the search engine")?,
    );

    let server = Arc::new(McpServer::new(
        env!("CARGO_PKG_NAME").to_string(),
        env!("CARGO_PKG_VERSION").to_string(),
    ));
    register_catalog_tools(&server, &service).await;

    let served = tokio::select! {
        result = Arc::clone(&server).serve_stdio() => result.context("MCP server failed"),
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("Failed to listen for Ctrl-C: {}", e);
            }
            info!("Interrupted, shutting down");
            Ok(())
        }
    };

    service.shutdown().await;
    served
}

/// Answer one query from the command line
#[inline]
pub async fn run_search(config_dir: Option<&Path>, query: &str, json: bool) -> Result<()> {
    let config = load_config(config_dir)?;
    let service = CatalogService::start(&config)
        .await
        .context("Failed to initialize the search engine")?;

    let response = service.search(query).await;
    service.shutdown().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
    } else if let Some(results) = &response.results {
        print_results(query, results);
    }

    if response.status == ResponseStatus::Error {
        let message = response
            .error
            .map_or_else(|| "unknown error".to_string(), |e| format!("{:?}: {}", e.kind, e.message));
        bail!("Search failed: {}", message);
    }
    Ok(())
}

fn print_results(query: &str, results: &[RankedTable]) {
    if results.is_empty() {
        println!("No tables found for {}", style(query).yellow());
        return;
    }

    println!("Tables for {}:", style(query).cyan());
    for (rank, table) in results.iter().enumerate() {
        println!();
        println!(
            "{}. {} {}",
            rank + 1,
            style(&table.table_name).bold().green(),
            style(format!("(score {:.4})", table.similarity_score)).dim()
        );
        if !table.table_description.is_empty() {
            println!("   {}", table.table_description);
        }
        println!("   {}", style(&table.openmetadata_url).underlined());
        for column in &table.column_descriptions {
            let key = if column.is_primary_key { " [PK]" } else { "" };
            println!(
                "   - {} {}{}: {}",
                style(&column.column_name).cyan(),
                style(&column.data_type).dim(),
                key,
                column.description
            );
        }
    }
}

/// Build or load the index for `metadata_path` (default: the configured file)
#[inline]
pub async fn run_refresh(config_dir: Option<&Path>, metadata_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_dir)?;
    let path = metadata_path.unwrap_or(&config.catalog.metadata_path);

    let client = OllamaClient::new(&config.ollama).context("Failed to create Ollama client")?;
    let lifecycle = IndexLifecycle::new(Arc::new(SourceRegistry::new(config.index_dir_path())));

    let spinner = ProgressBar::new_spinner().with_style(
        ProgressStyle::with_template("{spinner} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(format!("Indexing {}", path.display()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let outcome = lifecycle.initialize(Arc::new(client), path).await;
    spinner.finish_and_clear();

    let outcome = outcome.with_context(|| format!("Failed to refresh {}", path.display()))?;
    println!(
        "{} {}",
        style(format!("✓ {}", outcome.status)).green(),
        outcome.detail
    );
    Ok(())
}

/// Report configuration, Ollama health and the persisted index state without rebuilding anything
#[inline]
pub async fn show_status(config_dir: Option<&Path>) -> Result<()> {
    let config = load_config(config_dir).unwrap_or_default();

    println!("{}", style("📊 Catalog Search Status").bold().cyan());
    println!("{}", "=".repeat(50));
    println!();

    println!("{}", style("🤖 Ollama:").bold());
    match OllamaClient::new(&config.ollama) {
        Ok(client) => {
            let probe = client.clone();
            match tokio::task::spawn_blocking(move || probe.health_check()).await {
                Ok(Ok(())) => println!(
                    "   ✅ Connected ({}:{}), model {}",
                    config.ollama.host, config.ollama.port, config.ollama.model
                ),
                Ok(Err(e)) => println!("   ⚠️  Unhealthy: {:#}", e),
                Err(e) => println!("   ❌ Health check did not complete: {}", e),
            }
        }
        Err(e) => println!("   ❌ Invalid configuration: {:#}", e),
    }

    println!();
    println!("{}", style("🔗 Catalog links:").bold());
    let link_file = links_config_file(&config.links);
    let (base_url, source) = resolve_base_url(&link_file);
    println!("   Base URL: {} ({:?})", style(base_url).cyan(), source);

    println!();
    println!("{}", style("🔍 Index:").bold());
    let metadata_path = &config.catalog.metadata_path;
    println!("   Metadata: {}", metadata_path.display());

    let Ok(canonical) = tokio::fs::canonicalize(metadata_path).await else {
        println!("   ❌ Metadata file not found");
        return Ok(());
    };

    let storage_dir: PathBuf = storage_dir_for(&config.index_dir_path(), &canonical);
    println!("   Storage: {}", storage_dir.display());

    let current = Fingerprint::read(&canonical).await.ok();
    match LanceIndexStore::new(storage_dir).read_manifest().await {
        Some(manifest) => {
            println!(
                "   Built: {} ({} tables, dimension {})",
                manifest.built_at, manifest.document_count, manifest.dimension
            );
            let fresh = current.is_some_and(|fp| manifest.covers(&canonical, fp));
            if fresh {
                println!("   ✅ Up to date with fingerprint {}", manifest.fingerprint);
            } else {
                println!(
                    "   ⚠️  Stale: indexed {}, file is now {}",
                    manifest.fingerprint,
                    current.map_or_else(|| "unreadable".to_string(), |fp| fp.to_string())
                );
            }
        }
        None => println!("   💤 Not built yet"),
    }

    Ok(())
}
