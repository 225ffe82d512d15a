//! Command-line interface for stockfish_mcp.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stockfish MCP - chess analysis server over the Model Context Protocol
#[derive(Parser, Debug)]
#[command(name = "stockfish_mcp")]
#[command(about = "Chess analysis MCP server backed by a UCI engine", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Path to the engine executable. Falls back to the STOCKFISH_PATH
    /// environment variable, then to `stockfish` on PATH.
    #[arg(long, global = true)]
    pub stockfish_path: Option<PathBuf>,

    /// Search depth for analysis
    #[arg(long, global = true, default_value = "15")]
    pub depth: u32,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the MCP server (stdio mode)
    Server,

    /// Run the MCP server over HTTP
    Http {
        /// Port to bind to
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}
