/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `chat`    — Interactive chat mode
- `history` — Stored-chat listing, inspection, deletion, and purge
- `serve`   — The assistant API service (thin wrapper over `server`)

These handlers are intentionally small and use the library components:
the search and assistant clients, the query pipeline, and the chat store.
*/

use colored::Colorize;

use crate::config::Config;
use crate::error::Result;
use crate::pipeline::QueryMode;
use crate::session::{ChatRecord, Role};
use crate::storage::ChatStore;

pub mod history;

/// Open the chat store honoring the configured path override
pub(crate) fn open_store(config: &Config) -> Result<ChatStore> {
    match &config.storage.path {
        Some(path) => ChatStore::new_with_path(path),
        None => ChatStore::new(),
    }
}

/// Print a stored chat as a role-tagged transcript
pub(crate) fn print_transcript(chat: &ChatRecord) {
    println!();
    println!(
        "{} {}  {}",
        chat.short_id().cyan(),
        chat.title.bold(),
        chat.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed()
    );
    for message in &chat.messages {
        let tag = match message.role {
            Role::User => "you".green(),
            Role::Assistant => "ideascope".blue(),
        };
        println!("\n{}:", tag);
        println!("{}", message.content);
    }
    println!();
}

/// Special commands recognized inside the chat loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpecialCommand {
    /// Regular input, not a command
    None,
    /// Leave the chat loop
    Exit,
    /// Print command help
    Help,
    /// Drop the active chat; the next query starts a fresh one
    New,
    /// List recent stored chats
    List,
    /// Switch to a stored chat by id
    Switch(String),
    /// Change the query mode
    Mode(QueryMode),
    /// Change the per-query result count
    Count(u32),
    /// Unrecognized or malformed command, with a message to show
    Unknown(String),
}

/// Parse a chat-loop line into a special command
pub fn parse_special_command(input: &str) -> SpecialCommand {
    if !input.starts_with('/') {
        return SpecialCommand::None;
    }

    let mut parts = input.split_whitespace();
    let command = parts.next().unwrap_or("");

    match command {
        "/exit" | "/quit" => SpecialCommand::Exit,
        "/help" => SpecialCommand::Help,
        "/new" => SpecialCommand::New,
        "/list" => SpecialCommand::List,
        "/switch" => match parts.next() {
            Some(id) => SpecialCommand::Switch(id.to_string()),
            None => SpecialCommand::Unknown("/switch needs a chat id".to_string()),
        },
        "/mode" => match parts.next().map(QueryMode::parse_str) {
            Some(Ok(mode)) => SpecialCommand::Mode(mode),
            _ => SpecialCommand::Unknown("/mode needs 'raw' or 'enhanced'".to_string()),
        },
        "/count" => match parts.next().and_then(|n| n.parse::<u32>().ok()) {
            Some(n) if n > 0 => SpecialCommand::Count(n),
            _ => SpecialCommand::Unknown("/count needs a positive number".to_string()),
        },
        other => SpecialCommand::Unknown(format!("Unknown command: {other}. Try /help.")),
    }
}

fn print_help() {
    println!("\nCommands:");
    println!("  /new            start a fresh chat");
    println!("  /list           list recent stored chats");
    println!("  /switch <id>    resume a stored chat (8-char prefix works)");
    println!("  /mode <m>       set query mode: raw or enhanced");
    println!("  /count <n>      set results per query (5, 10, 15 or 20 suggested)");
    println!("  /help           show this help");
    println!("  /exit           leave\n");
    println!("Anything else is sent to the catalog as a search query.\n");
}

// Chat command handler
pub mod chat {
    //! Interactive chat mode handler.
    //!
    //! Builds the pipeline and its collaborators, runs the retention pass,
    //! and drives a readline loop that submits queries as pipeline turns.
    //! The session-state lock keeps new-chat creation and chat switching
    //! out while a turn is in flight.

    use super::*;
    use crate::assistant::AssistantClient;
    use crate::error::IdeascopeError;
    use crate::pipeline::{
        QueryPipeline, SessionState, SummaryObserver, TurnOptions, TurnOutcome, TurnPhase,
    };
    use crate::search::SearchClient;
    use crate::session::{self, MessageRecord};
    use rustyline::error::ReadlineError;
    use rustyline::DefaultEditor;
    use std::io::Write;
    use std::time::Duration;

    /// Observer that renders turn progress to the terminal
    #[derive(Default)]
    struct StdoutObserver {
        printed_chunks: bool,
    }

    impl SummaryObserver for StdoutObserver {
        fn phase(&mut self, phase: TurnPhase) {
            match phase {
                TurnPhase::Enhancing => println!("{}", "enhancing query...".dimmed()),
                TurnPhase::Searching => println!("{}", "searching catalog...".dimmed()),
                TurnPhase::Summarizing => println!(),
                _ => {}
            }
        }

        fn chunk(&mut self, delta: &str, _so_far: &str) {
            self.printed_chunks = true;
            print!("{delta}");
            let _ = std::io::stdout().flush();
        }
    }

    /// Start interactive chat mode
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `mode` - Optional override for the query mode ("raw" or "enhanced")
    /// * `count` - Optional override for the per-query result count
    /// * `resume` - Optional stored chat id to resume
    pub async fn run_chat(
        config: Config,
        mode: Option<String>,
        count: Option<u32>,
        resume: Option<String>,
    ) -> Result<()> {
        let store = open_store(&config)?;

        // Retention pass on startup; failure must not block the chat.
        match store.purge_expired(config.storage.retention_days) {
            Ok(0) => {}
            Ok(purged) => tracing::info!("retention pass purged {} expired chats", purged),
            Err(e) => tracing::warn!("retention pass failed: {}", e),
        }

        let mut mode = match mode.as_deref() {
            Some(m) => QueryMode::parse_str(m).map_err(IdeascopeError::Validation)?,
            None => QueryMode::parse_str(&config.assistant.query_mode)
                .map_err(IdeascopeError::Validation)?,
        };
        let mut result_count = count.unwrap_or(config.search.result_count);
        if result_count == 0 {
            return Err(
                IdeascopeError::Validation("result count must be a positive integer".into()).into(),
            );
        }

        let timeout = Duration::from_secs(config.search.timeout_seconds);
        let search = SearchClient::new(config.search.endpoint.clone(), timeout)?;
        let assistant = AssistantClient::new(config.assistant.endpoint.clone(), timeout)?;
        let pipeline = QueryPipeline::new(search, assistant, store.clone());

        let mut session_state = SessionState::new();
        if let Some(id) = resume {
            match store.get(&id)? {
                Some(chat) => {
                    print_transcript(&chat);
                    session_state.set_chat(chat)?;
                }
                None => println!("{}", format!("No stored chat matches '{id}'.").yellow()),
            }
        }

        let mut rl = DefaultEditor::new()?;
        print_welcome_banner(mode, result_count);

        loop {
            let prompt = format!("{} ideascope> ", mode.colored_tag());
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    rl.add_history_entry(trimmed)?;

                    match parse_special_command(trimmed) {
                        SpecialCommand::Exit => break,
                        SpecialCommand::Help => {
                            print_help();
                            continue;
                        }
                        SpecialCommand::New => {
                            match session_state.clear_chat() {
                                Ok(()) => println!("Started a new chat.\n"),
                                Err(e) => println!("{}", format!("{e:#}").yellow()),
                            }
                            continue;
                        }
                        SpecialCommand::List => {
                            print_recent(&store);
                            continue;
                        }
                        SpecialCommand::Switch(id) => {
                            switch_chat(&store, &mut session_state, &id);
                            continue;
                        }
                        SpecialCommand::Mode(new_mode) => {
                            mode = new_mode;
                            println!("Query mode set to {mode}\n");
                            continue;
                        }
                        SpecialCommand::Count(n) => {
                            result_count = n;
                            if ![5, 10, 15, 20].contains(&n) {
                                println!("Result count set to {n} (5/10/15/20 are the usual picks)\n");
                            } else {
                                println!("Result count set to {n}\n");
                            }
                            continue;
                        }
                        SpecialCommand::Unknown(message) => {
                            println!("{}\n", message.yellow());
                            continue;
                        }
                        SpecialCommand::None => {}
                    }

                    // A query turn. The controller owns the session model:
                    // first query creates the chat, later ones append.
                    let chat = match session_state.chat() {
                        Some(existing) => {
                            session::append_message(existing, MessageRecord::user(trimmed))
                        }
                        None => ChatRecord::new(trimmed),
                    };

                    if let Err(e) = session_state.begin_turn() {
                        println!("{}", format!("{e:#}").yellow());
                        continue;
                    }
                    let opts = TurnOptions {
                        mode,
                        result_count,
                    };
                    let mut observer = StdoutObserver::default();
                    let outcome = pipeline.run_turn(&chat, trimmed, &opts, &mut observer).await;
                    session_state.end_turn();

                    match outcome {
                        Ok(TurnOutcome::Completed {
                            chat: updated,
                            summary_streamed,
                        }) => {
                            if !summary_streamed {
                                if observer.printed_chunks {
                                    // A partial stream was rendered before the
                                    // fallback kicked in; separate them.
                                    println!("\n");
                                }
                                let content = updated
                                    .messages
                                    .last()
                                    .map(|m| m.content.as_str())
                                    .unwrap_or_default();
                                println!("\n{content}");
                            }
                            println!();
                            let _ = session_state.set_chat(updated);
                        }
                        Ok(TurnOutcome::Skipped) => {}
                        Err(e) => {
                            println!("{}", format!("Search failed: {e:#}").red());
                            // The user's message stays in the in-memory chat;
                            // nothing was persisted.
                            let _ = session_state.set_chat(chat);
                        }
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(e) => return Err(e.into()),
            }
        }

        println!("Goodbye!");
        Ok(())
    }

    fn print_welcome_banner(mode: QueryMode, result_count: u32) {
        println!();
        println!("{}", "Ideascope".bold());
        println!(
            "Ask for GSoC project ideas in plain language. Mode: {}, results per query: {}.",
            mode, result_count
        );
        println!("Type {} for commands.\n", "/help".cyan());
    }

    fn switch_chat(store: &ChatStore, session_state: &mut SessionState, id: &str) {
        if session_state.is_turn_in_flight() {
            println!("{}", "A turn is still running; try again when it finishes.".yellow());
            return;
        }
        match store.get(id) {
            Ok(Some(chat)) => {
                print_transcript(&chat);
                if let Err(e) = session_state.set_chat(chat) {
                    println!("{}", format!("{e:#}").yellow());
                }
            }
            Ok(None) => println!("{}", format!("No stored chat matches '{id}'.").yellow()),
            Err(e) => println!("{}", format!("Could not load chat: {e:#}").red()),
        }
    }

    fn print_recent(store: &ChatStore) {
        match store.list_recent(10, None) {
            Ok((chats, _)) if chats.is_empty() => {
                println!("{}", "No stored chats yet.".yellow());
            }
            Ok((chats, _)) => {
                println!();
                for chat in chats {
                    println!(
                        "  {}  {}  {}",
                        chat.id[..8.min(chat.id.len())].cyan(),
                        chat.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                        chat.title
                    );
                }
                println!("\nUse {} to resume one.\n", "/switch <id>".cyan());
            }
            Err(e) => println!("{}", format!("Could not list chats: {e:#}").red()),
        }
    }
}

// Serve command handler
pub mod serve {
    //! Assistant API service handler.

    use super::*;

    /// Run the assistant API service until interrupted
    pub async fn run_serve(config: Config, addr: &str) -> Result<()> {
        crate::server::serve(config, addr).await
    }
}
