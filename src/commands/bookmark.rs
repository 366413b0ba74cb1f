//! Bookmark command - manage the bookmark tree

use crate::address::QueryAddress;
use crate::cli::{BookmarkCommands, bookmark_address};
use crate::store::BookmarkNode;
use crate::{BookHubError, db::Database};
use colored::Colorize;

type Result<T> = std::result::Result<T, BookHubError>;

/// Execute a bookmark subcommand
///
/// # Errors
/// Returns an error for invalid bookmark paths or failed database operations
pub fn execute(db: &Database, command: &BookmarkCommands, quiet: bool) -> Result<()> {
    match command {
        BookmarkCommands::Add { name, target } => {
            let path = bookmark_address(name);
            let target = QueryAddress::parse(target);
            db.add_bookmark(&path, &target)?;
            if !quiet {
                println!(
                    "{} Bookmarked {} as {}",
                    "✓".green().bold(),
                    target.to_string().yellow(),
                    path.to_string().cyan()
                );
            }
        }
        BookmarkCommands::Folder { name } => {
            let path = bookmark_address(name);
            db.add_bookmark_folder(&path)?;
            if !quiet {
                println!("{} Created folder {}", "✓".green().bold(), path.to_string().cyan());
            }
        }
        BookmarkCommands::List => list(db, quiet)?,
        BookmarkCommands::Remove { name } => {
            let path = bookmark_address(name);
            let removed = db.remove_bookmark(&path)?;
            if !quiet {
                println!("{} Removed {removed} bookmark node(s)", "✓".green().bold());
            }
        }
    }
    Ok(())
}

fn list(db: &Database, quiet: bool) -> Result<()> {
    let nodes = db.list_bookmarks()?;
    if nodes.is_empty() {
        if !quiet {
            println!("No bookmarks.");
        }
        return Ok(());
    }
    for (path, node) in &nodes {
        println!("{}", format_node(path, node));
    }
    Ok(())
}

fn format_node(path: &QueryAddress, node: &BookmarkNode) -> String {
    let depth = path.path().trim_matches('/').matches('/').count();
    let indent = "  ".repeat(depth);
    match node {
        BookmarkNode::Folder { name } => format!("{indent}{}/", name.bold()),
        BookmarkNode::Entry { name, target } => {
            format!("{indent}{} {} {}", name.cyan(), "→".dimmed(), target.to_string().yellow())
        }
    }
}
