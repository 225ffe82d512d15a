//! Stockfish MCP - Unified CLI
//!
//! Chess analysis MCP server with stdio and HTTP modes of operation.

#![warn(missing_docs)]

mod cli;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use rmcp::ServiceExt;
use std::path::PathBuf;
use std::sync::Arc;
use stockfish_mcp::{ChessServer, EngineConfig, EngineSession, GameStore};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = engine_config(&cli);

    match cli.command {
        Command::Server => run_mcp_server(config).await,
        Command::Http { port, host } => run_http_server(host, port, config).await,
    }
}

/// Builds the engine configuration from CLI flags and the environment.
fn engine_config(cli: &Cli) -> EngineConfig {
    let path = cli
        .stockfish_path
        .clone()
        .or_else(|| std::env::var_os("STOCKFISH_PATH").map(PathBuf::from));
    EngineConfig {
        path,
        depth: cli.depth,
        ..EngineConfig::default()
    }
}

/// Run the MCP server (stdio mode)
async fn run_mcp_server(config: EngineConfig) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    info!("Starting Stockfish MCP server");

    let engine = Arc::new(EngineSession::new(config));
    let server = ChessServer::with_shared(engine.clone(), GameStore::new());

    info!("Server ready - connect via MCP protocol");
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;

    engine.close().await;

    Ok(())
}

/// Run the HTTP MCP server
async fn run_http_server(host: String, port: u16, config: EngineConfig) -> Result<()> {
    use axum::Router;
    use rmcp::transport::streamable_http_server::{
        session::local::LocalSessionManager,
        tower::{StreamableHttpServerConfig, StreamableHttpService},
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(host, port, "Starting Stockfish MCP server on HTTP");

    let session_manager = Arc::new(LocalSessionManager::default());

    // One engine subprocess and one game, shared across every connection.
    let engine = Arc::new(EngineSession::new(config));
    let games = GameStore::new();

    let http_config = StreamableHttpServerConfig::default();

    let factory_engine = engine.clone();
    let http_service = StreamableHttpService::new(
        move || {
            Ok(ChessServer::with_shared(
                factory_engine.clone(),
                games.clone(),
            ))
        },
        session_manager,
        http_config,
    );

    let app = Router::new().fallback_service(http_service);

    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    info!("Server ready at http://{host}:{port}/");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    engine.close().await;

    Ok(())
}
