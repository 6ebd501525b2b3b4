//! History command handlers
//!
//! Listing walks the recency index page by page through the continuation
//! cursor instead of one big scan.

use colored::Colorize;
use prettytable::{format, Table};

use crate::cli::HistoryCommand;
use crate::config::Config;
use crate::error::Result;
use crate::storage::ChatSummary;

const PAGE_SIZE: usize = 10;

/// Handle history commands
pub fn handle_history(config: &Config, command: HistoryCommand) -> Result<()> {
    let store = super::open_store(config)?;

    match command {
        HistoryCommand::List { limit } => {
            let mut chats: Vec<ChatSummary> = Vec::new();
            let mut cursor = None;
            while chats.len() < limit {
                let page = (limit - chats.len()).min(PAGE_SIZE);
                let (batch, next) = store.list_recent(page, cursor.as_ref())?;
                chats.extend(batch);
                match next {
                    Some(c) => cursor = Some(c),
                    None => break,
                }
            }

            if chats.is_empty() {
                println!("{}", "No chat history found.".yellow());
                return Ok(());
            }

            let mut table = Table::new();
            table.set_format(*format::consts::FORMAT_BORDERS_ONLY);

            table.add_row(prettytable::row![
                "ID".bold(),
                "Title".bold(),
                "Messages".bold(),
                "Created".bold()
            ]);

            for chat in chats {
                let id_short = &chat.id[..8.min(chat.id.len())];
                let title = if chat.title.chars().count() > 40 {
                    let head: String = chat.title.chars().take(37).collect();
                    format!("{head}...")
                } else {
                    chat.title
                };
                let created = chat.created_at.format("%Y-%m-%d %H:%M").to_string();

                table.add_row(prettytable::row![
                    id_short.cyan(),
                    title,
                    chat.message_count,
                    created
                ]);
            }

            println!("\nChat History:");
            table.printstd();
            println!();
            println!(
                "Use {} to resume a chat.",
                "ideascope chat --resume <ID>".cyan()
            );
            println!();
        }
        HistoryCommand::Show { id } => match store.get(&id)? {
            Some(chat) => super::print_transcript(&chat),
            None => println!("{}", format!("No stored chat matches '{id}'.").yellow()),
        },
        HistoryCommand::Delete { id } => {
            store.delete(&id)?;
            println!("{}", format!("Deleted chat {id}").green());
        }
        HistoryCommand::Purge => {
            let purged = store.purge_expired(config.storage.retention_days)?;
            println!(
                "{}",
                format!(
                    "Purged {purged} chats older than {} days",
                    config.storage.retention_days
                )
                .green()
            );
        }
    }

    Ok(())
}
