//! History command - list, remove and clear reading history

use crate::address::QueryAddress;
use crate::cli::HistoryCommands;
use crate::store::HistoryEntry;
use crate::{BookHubError, db::Database};
use colored::Colorize;
use dialoguer::Confirm;

type Result<T> = std::result::Result<T, BookHubError>;

/// Execute a history subcommand
///
/// # Errors
/// Returns an error if database operations, prompting or output fail
pub fn execute(db: &Database, command: &HistoryCommands, quiet: bool) -> Result<()> {
    match command {
        HistoryCommands::List { json } => list(db, *json, quiet),
        HistoryCommands::Remove { path } => remove(db, &QueryAddress::parse(path), quiet),
        HistoryCommands::Clear { yes } => clear(db, *yes || quiet),
    }
}

fn list(db: &Database, json: bool, quiet: bool) -> Result<()> {
    let entries = db.list_history()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        if !quiet {
            println!("History is empty.");
        }
        return Ok(());
    }

    for entry in &entries {
        println!("{}", format_entry(entry, quiet));
    }
    Ok(())
}

fn format_entry(entry: &HistoryEntry, quiet: bool) -> String {
    if quiet {
        return entry.address.to_string();
    }
    let page = if entry.memento.page.is_empty() {
        String::new()
    } else {
        format!("  {}", entry.memento.page.cyan())
    };
    format!(
        "{}  {}{page}",
        entry.last_accessed.format("%Y-%m-%d %H:%M").to_string().dimmed(),
        entry.address.to_string().yellow()
    )
}

fn remove(db: &Database, address: &QueryAddress, quiet: bool) -> Result<()> {
    if !db.remove_history(address)? {
        return Err(BookHubError::InvalidInput(format!("{address} is not in history")));
    }
    if !quiet {
        println!("{} Removed {} from history", "✓".green().bold(), address.to_string().yellow());
    }
    Ok(())
}

fn clear(db: &Database, skip_prompt: bool) -> Result<()> {
    let count = db.history_count();
    if count == 0 {
        return Ok(());
    }
    if !skip_prompt {
        let confirmed = Confirm::new()
            .with_prompt(format!("Remove all {count} history entries?"))
            .default(false)
            .interact()
            .map_err(|e| BookHubError::InvalidInput(format!("Failed to get confirmation: {e}")))?;
        if !confirmed {
            println!("Operation cancelled.");
            return Ok(());
        }
    }
    db.clear_history()?;
    if !skip_prompt {
        println!("{} Cleared {count} history entries", "✓".green().bold());
    }
    Ok(())
}
