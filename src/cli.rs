//! Command-line interface definition for Ideascope
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for interactive chat, history management, and the
//! assistant API service.

use clap::{Parser, Subcommand};

/// Ideascope - chat-driven search over a catalog of GSoC program ideas
///
/// Query the idea catalog in natural language, read streamed AI summaries
/// of the results, and keep the conversation history locally.
#[derive(Parser, Debug, Clone)]
#[command(name = "ideascope")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the history database path
    #[arg(long)]
    pub storage_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for Ideascope
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start interactive chat mode
    Chat {
        /// Query mode: raw (send as typed) or enhanced (rewrite first)
        #[arg(short, long)]
        mode: Option<String>,

        /// Ranked results to request per query
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Resume a stored chat by id (8-char prefix accepted)
        #[arg(short, long)]
        resume: Option<String>,
    },

    /// Manage stored chat history
    History {
        /// History subcommand
        #[command(subcommand)]
        command: HistoryCommand,
    },

    /// Run the assistant API service
    Serve {
        /// Listen address
        #[arg(short, long, default_value = "127.0.0.1:3310")]
        addr: String,
    },
}

/// History management subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum HistoryCommand {
    /// List recent chats
    List {
        /// Maximum chats to show
        #[arg(short, long, default_value_t = 20)]
        limit: usize,
    },

    /// Print one chat's transcript
    Show {
        /// Chat id (8-char prefix accepted)
        id: String,
    },

    /// Delete a chat
    Delete {
        /// Chat id (8-char prefix accepted)
        id: String,
    },

    /// Delete chats older than the retention window
    Purge,
}

impl Cli {
    /// Parse command-line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
