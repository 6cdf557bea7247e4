//! Dredge - asynchronous research task orchestration daemon
//!
//! CLI entry point: serve the tool protocol, inspect configuration, dump
//! tool schemas.

use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::Result;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dredge::cli::{Cli, Command};
use dredge::config::Config;
use dredge::context::AppContext;
use dredge::dispatch::{ActionRegistry, Dispatcher};
use dredge::schema::SchemaRegistry;
use dredge::server;
use dredge::tools::ToolRouter;
use dredgestore::Store;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_ref())?;

    match cli.command {
        Command::Serve { socket, db } => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(serve(config, socket, db))
        }
        Command::Config => {
            println!("{}", "# Effective dredge configuration".dimmed());
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Command::Schema { tool } => {
            let registry = SchemaRegistry::load()?;
            let Some(input) = registry.input_schema(&tool) else {
                eyre::bail!(
                    "Unknown tool: {}. Registered: {}",
                    tool,
                    registry.tool_names().join(", ")
                );
            };
            let input_header = format!("# {} input schema", tool);
            println!("{}", input_header.as_str().bold());
            println!("{}", serde_json::to_string_pretty(input)?);
            if let Some(output) = registry.output_schema(&tool) {
                let output_header = format!("# {} output schema", tool);
                println!("{}", output_header.as_str().bold());
                println!("{}", serde_json::to_string_pretty(output)?);
            }
            Ok(())
        }
    }
}

async fn serve(
    mut config: Config,
    socket: Option<std::path::PathBuf>,
    db: Option<std::path::PathBuf>,
) -> Result<()> {
    if let Some(socket) = socket {
        config.server.socket_path = socket;
    }
    let db_path = db.unwrap_or_else(|| config.database.effective_path());

    let store = Store::open(&db_path)?;
    info!(db = %db_path.display(), "Store opened");

    let ctx = Arc::new(AppContext::new(config.clone(), store.clone())?);
    let router = Arc::new(ToolRouter::standard(ctx.schemas.clone()));

    // Exploration pipelines are collaborators linked by embedding binaries
    // (see dredge::actions::ExplorePipeline); the bare daemon serves the
    // full tool surface and fails target_queue jobs fast.
    let registry = ActionRegistry::new();
    warn!("No exploration pipeline linked; target_queue jobs will fail until an action is registered");

    let dispatcher = Dispatcher::spawn(
        ctx.queue.clone(),
        store,
        ctx.exploration.clone(),
        Arc::new(registry),
        ctx.cancels.clone(),
        ctx.bus.clone(),
        &config.queue,
    );

    let (listener, socket_path) = server::create_listener_at(&config.server.socket_path)?;
    info!(socket = %socket_path.display(), "Listening");

    let shutdown = CancellationToken::new();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal_shutdown.cancel();
        }
    });

    let evictor = ctx.exploration.start_evictor(
        std::time::Duration::from_secs(config.status.eviction_secs.max(1)),
        shutdown.clone(),
    );

    let result = server::serve(listener, ctx, router, shutdown).await;

    dispatcher.shutdown().await;
    let _ = evictor.await;
    server::cleanup_socket(&socket_path);

    result
}
