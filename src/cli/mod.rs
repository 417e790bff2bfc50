// Keypool — CLI Module
//
// Command-line interface using clap derive macros.
// Subcommands: status, ask, serve, check-config.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub use commands::execute;

/// Keypool — a credential pool gateway for rate-limited LLM APIs.
#[derive(Parser, Debug)]
#[command(name = "keypool")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to a TOML config file (default: <config dir>/keypool/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the gateway status snapshot as JSON (no secrets).
    Status,

    /// Send one prompt and print the structured JSON reply.
    Ask {
        /// The prompt text.
        prompt: String,

        /// Model identifier (overrides profile and config default).
        #[arg(long)]
        model: Option<String>,

        #[arg(long)]
        temperature: Option<f32>,

        #[arg(long)]
        max_tokens: Option<u32>,

        /// Attempt ceiling for this request.
        #[arg(long)]
        retries: Option<u32>,

        /// Sequence tag, used for call profiles and sticky assignment.
        #[arg(long)]
        tag: Option<u64>,
    },

    /// Run the JSON-RPC server on a Unix domain socket.
    Serve {
        /// Socket path (default: $XDG_RUNTIME_DIR/keypool/keypool.sock).
        #[arg(long)]
        socket: Option<PathBuf>,
    },

    /// Validate the config and report which credential slots are set.
    CheckConfig,
}
