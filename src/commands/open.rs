//! Open command - load a location through the hub and report the result

use crate::BookHubError;
use crate::cli::OpenArgs;
use crate::hub::{BookHub, BookHubEvent, CommandHandle, CommandOutcome, RecursiveOpenRequest};
use crate::store::BookMementoType;
use colored::Colorize;
use dialoguer::Confirm;
use serde::Serialize;
use std::sync::mpsc::Receiver;

type Result<T> = std::result::Result<T, BookHubError>;

/// Page list printed by `--pages --json`
#[derive(Debug, Serialize)]
struct PageListing {
    address: String,
    current: Option<String>,
    pages: Vec<String>,
}

/// Execute the open command
///
/// Recursive-open offers and codec hints are answered interactively unless
/// `quiet` or `--json` is set.
///
/// # Errors
/// Returns `BookHubError::InvalidInput` with the user-facing message when the
/// load fails, or an I/O or serialization error while reporting.
pub fn execute(hub: &BookHub, args: &OpenArgs, quiet: bool) -> Result<()> {
    let events = hub.subscribe();
    let interactive = !quiet && !args.json;

    let handle = hub
        .request_load(Some(&args.address()), args.entry.as_deref(), args.load_options(), true)
        .ok_or_else(|| BookHubError::InvalidInput(format!("{} was not loaded", args.path)))?;

    match run(hub, &handle, &events, args.json, interactive, quiet)? {
        CommandOutcome::Completed => {}
        CommandOutcome::Canceled => {
            if !quiet {
                println!("Load canceled.");
            }
            return Ok(());
        }
        CommandOutcome::Failed(message) => return Err(BookHubError::InvalidInput(message)),
    }

    if let Some(index) = args.goto {
        if hub.with_current_book(|book| book.move_to(index)).flatten().is_none() {
            return Err(BookHubError::InvalidInput(format!("Cannot move to page {index}")));
        }
        report(&events, args.json, quiet)?;
    }

    if args.pages {
        print_pages(hub, args.json)?;
    } else if !quiet && !args.json {
        print_summary(hub);
    }
    Ok(())
}

/// Wait for `handle`, answering follow-up offers until no command is left
fn run(
    hub: &BookHub,
    handle: &CommandHandle,
    events: &Receiver<BookHubEvent>,
    json: bool,
    interactive: bool,
    quiet: bool,
) -> Result<CommandOutcome> {
    let mut outcome = handle.wait();
    loop {
        let mut follow_up = None;
        for event in events.try_iter() {
            print_event(&event, json, quiet)?;
            match event {
                BookHubEvent::ConfirmRecursive { request } if interactive => {
                    if confirm_recursive(&request)? {
                        follow_up = hub.confirm_recursive(&request);
                    }
                }
                BookHubEvent::CodecRequired { extension, store_uri } if interactive => {
                    offer_codec(&extension, &store_uri)?;
                }
                _ => {}
            }
        }
        match follow_up {
            Some(next) => outcome = next.wait(),
            None => return Ok(outcome),
        }
    }
}

fn report(events: &Receiver<BookHubEvent>, json: bool, quiet: bool) -> Result<()> {
    for event in events.try_iter() {
        print_event(&event, json, quiet)?;
    }
    Ok(())
}

fn print_event(event: &BookHubEvent, json: bool, quiet: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else if !quiet && let Some(line) = describe(event) {
        println!("{line}");
    }
    Ok(())
}

/// Human-readable line for events worth showing
fn describe(event: &BookHubEvent) -> Option<String> {
    match event {
        BookHubEvent::LoadStarting { path } => Some(format!("{} {path}", "Opening".dimmed())),
        BookHubEvent::BookChanged {
            address: Some(address),
            memento_type,
        } => {
            let source = match memento_type {
                BookMementoType::Bookmark => " (bookmarked)",
                BookMementoType::History => " (from history)",
                BookMementoType::None => "",
            };
            Some(format!("{} Opened {}{}", "✓".green().bold(), address.to_string().yellow(), source.dimmed()))
        }
        BookHubEvent::EmptyResult { message } => Some(format!("{} {message}", "⚠".yellow().bold())),
        BookHubEvent::HistoryAdded { address } => Some(format!("{}", format!("Added {address} to history").dimmed())),
        BookHubEvent::CodecRequired { extension, .. } => Some(format!(
            "{} No codec installed for .{extension} images",
            "⚠".yellow().bold()
        )),
        _ => None,
    }
}

fn confirm_recursive(request: &RecursiveOpenRequest) -> Result<bool> {
    Confirm::new()
        .with_prompt(format!(
            "{} has no pages but {} sub-folders. Open recursively?",
            request.address, request.sub_folder_count
        ))
        .default(true)
        .interact()
        .map_err(|e| BookHubError::InvalidInput(format!("Failed to get confirmation: {e}")))
}

fn offer_codec(extension: &str, store_uri: &str) -> Result<()> {
    let open_store = Confirm::new()
        .with_prompt(format!("Open the download page for the .{extension} codec?"))
        .default(false)
        .interact()
        .map_err(|e| BookHubError::InvalidInput(format!("Failed to get confirmation: {e}")))?;
    if open_store && let Err(e) = open::that(store_uri) {
        eprintln!("Failed to open {store_uri}: {e}");
    }
    Ok(())
}

fn print_summary(hub: &BookHub) {
    let Some(address) = hub.current_address() else {
        return;
    };
    let Some((count, page)) = hub.with_current_book(|book| (book.page_count(), book.current_page())) else {
        return;
    };
    match page {
        Some(page) => println!("{}: {count} pages, showing {}", address, page.cyan()),
        None => println!("{address}: {count} pages"),
    }
}

fn print_pages(hub: &BookHub, json: bool) -> Result<()> {
    let Some(address) = hub.current_address() else {
        return Ok(());
    };
    let Some((pages, current)) = hub.with_current_book(|book| (book.pages(), book.current_page())) else {
        return Ok(());
    };

    if json {
        let listing = PageListing {
            address: address.to_string(),
            current,
            pages,
        };
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    for (index, page) in pages.iter().enumerate() {
        if current.as_deref() == Some(page.as_str()) {
            println!("{} {index:>4}  {}", "▶".green(), page.bold());
        } else {
            println!("  {index:>4}  {page}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::QueryAddress;
    use crate::config::BookHubConfig;
    use crate::hub::Collaborators;
    use crate::testing::{MemoryBookmarks, MemoryHistory, MockArchiveOpener, MockBookFactory};
    use std::sync::Arc;

    fn hub(history: &MemoryHistory) -> Arc<BookHub> {
        BookHub::new(
            Collaborators {
                opener: Arc::new(MockArchiveOpener::new().directory("/comics").archive("/comics/a.zip")),
                factory: Arc::new(MockBookFactory::new().book("/comics/a.zip", &["p1.jpg", "p2.jpg", "p3.jpg"])),
                history: Arc::new(history.clone()),
                bookmarks: Arc::new(MemoryBookmarks::new()),
            },
            BookHubConfig::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_open_and_goto() {
        let history = MemoryHistory::new();
        let hub = hub(&history);
        let args = OpenArgs {
            path: "/comics/a.zip".into(),
            goto: Some(2),
            ..OpenArgs::default()
        };

        execute(&hub, &args, true).unwrap();
        assert_eq!(hub.current_memento().unwrap().page, "p3.jpg");
        assert_eq!(
            history.entry(&QueryAddress::file("/comics/a.zip")).unwrap().memento.page,
            "p3.jpg"
        );
        hub.shutdown();
    }

    #[test]
    fn test_open_failure_is_an_error() {
        let hub = hub(&MemoryHistory::new());
        let args = OpenArgs {
            path: "/comics/missing.zip".into(),
            ..OpenArgs::default()
        };

        let err = execute(&hub, &args, true).unwrap_err();
        assert!(matches!(err, BookHubError::InvalidInput(message) if message.contains("/comics/missing.zip")));
        hub.shutdown();
    }

    #[test]
    fn test_describe_events() {
        let opened = describe(&BookHubEvent::BookChanged {
            address: Some(QueryAddress::file("/comics/a.zip")),
            memento_type: BookMementoType::History,
        })
        .unwrap();
        assert!(opened.contains("/comics/a.zip"));
        assert!(opened.contains("from history"));

        let empty = describe(&BookHubEvent::EmptyResult {
            message: "There are no pages in /x".into(),
        })
        .unwrap();
        assert!(empty.contains("There are no pages in /x"));

        assert!(describe(&BookHubEvent::ViewCleared).is_none());
        assert!(
            describe(&BookHubEvent::LoadingStateChanged {
                is_loading: true,
                path: None,
            })
            .is_none()
        );
    }
}
