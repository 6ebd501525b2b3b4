//! Ideascope - chat-driven GSoC idea search library
//!
//! This library provides the core functionality for the Ideascope chat
//! application: a durable local store for conversation history, the chat
//! session model, and the query pipeline that turns a user query into a
//! progressively streamed summary of ranked catalog results. It also
//! contains the assistant API service that fronts the AI provider.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `session`: Chat session model (records, messages, pure operations)
//! - `storage`: Durable chat store with recency index and retention purge
//! - `pipeline`: Per-turn state machine with streamed summaries and fallbacks
//! - `search`: Ranked-result service client
//! - `assistant`: Assistant API service client (enhance + summarize)
//! - `server`: Assistant API service (axum) and the Gemini backend
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use ideascope::storage::ChatStore;
//! use ideascope::session::ChatRecord;
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = ChatStore::new()?;
//!     let chat = ChatRecord::new("mentorship projects about compilers");
//!     store.upsert(&chat)?;
//!     Ok(())
//! }
//! ```

pub mod assistant;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod search;
pub mod server;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use error::{IdeascopeError, Result};
pub use pipeline::{QueryMode, QueryPipeline, TurnOptions, TurnOutcome};
pub use session::{ChatRecord, MessageRecord, Role};
pub use storage::ChatStore;
