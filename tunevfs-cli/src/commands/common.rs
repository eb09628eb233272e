//! Common utilities shared across CLI commands.

use std::path::Path;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tunevfs::config::ConfigFile;
use tunevfs::operation::{QueryResult, Row};
use tunevfs::vfs::root_uri;
use tunevfs::{Request, VfsService};
use url::Url;

use crate::error::CliError;

/// Spinner redraw period.
const TICK: Duration = Duration::from_millis(120);

/// Parses a command argument as a URI, falling back to a local path.
///
/// Single-letter schemes are taken for Windows drive letters.
pub fn parse_uri(arg: &str) -> Result<Url, CliError> {
    if let Ok(uri) = Url::parse(arg) {
        if uri.scheme().len() > 1 {
            return Ok(uri);
        }
    }
    let path = Path::new(arg)
        .canonicalize()
        .map_err(|_| CliError::InvalidUri(arg.to_string()))?;
    Url::from_file_path(&path).map_err(|_| CliError::InvalidUri(arg.to_string()))
}

/// URI argument or the VFS root when absent.
pub fn parse_uri_or_root(arg: Option<&str>) -> Result<Url, CliError> {
    match arg {
        Some(arg) => parse_uri(arg),
        None => Ok(root_uri()),
    }
}

/// Starts the VFS service from configuration.
pub fn start_service(config: &ConfigFile) -> Result<VfsService, CliError> {
    Ok(VfsService::from_config(config)?)
}

/// Spinner on stderr; hidden when stderr is not a terminal.
pub fn spinner(message: &str) -> ProgressBar {
    if !console::Term::stderr().is_term() {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(TICK);
    bar
}

/// Runs `request` to completion, passing rows to `on_rows` as they arrive.
///
/// Between polls the loop waits for the service to announce the request
/// key, or for the notification period to elapse.
pub async fn run_to_completion(
    service: &VfsService,
    request: &Request,
    mut on_rows: impl FnMut(&[Row]),
) -> Result<(), CliError> {
    let key = request.key();
    let mut notifications = service.subscribe();
    let bar = spinner(&format!("{} {}", request.kind, request.uri));
    let period = Duration::from_secs(1);

    loop {
        match service.query(request).await {
            QueryResult::Finished(rows) => {
                bar.finish_and_clear();
                on_rows(&rows);
                return Ok(());
            }
            QueryResult::Failed(message) => {
                bar.finish_and_clear();
                return Err(CliError::Query(message));
            }
            QueryResult::Cancelled => {
                bar.finish_and_clear();
                return Err(CliError::Cancelled);
            }
            QueryResult::Partial(rows) => {
                bar.suspend(|| on_rows(&rows));
            }
            QueryResult::Progress { done, total } => {
                if total > 0 {
                    bar.set_message(format!("{} {} ({}/{})", request.kind, request.uri, done, total));
                }
            }
        }

        // Any notification for our key, or the period, means "ask again"
        let _ = tokio::time::timeout(period, async {
            while let Ok(notified) = notifications.recv().await {
                if notified == key {
                    break;
                }
            }
        })
        .await;
    }
}

/// Prints rows as a table or as JSON lines.
pub fn print_rows(rows: &[Row], json: bool) {
    for row in rows {
        if json {
            match serde_json::to_string(row) {
                Ok(line) => println!("{}", line),
                Err(e) => eprintln!("Failed to encode row: {}", e),
            }
            continue;
        }
        match row {
            Row::Dir {
                name,
                description,
                tracks,
                ..
            } => {
                let tracks = tracks.map(|n| format!(" ({} tracks)", n)).unwrap_or_default();
                println!(
                    "{}/{}  {}",
                    style(name).bold().blue(),
                    tracks,
                    style(description).dim()
                );
            }
            Row::File {
                name,
                description,
                details,
                cached,
                ..
            } => {
                let mark = if *cached { "*" } else { " " };
                println!(
                    "{} {}  {}  {}",
                    style(mark).green(),
                    name,
                    style(details).cyan(),
                    style(description).dim()
                );
            }
            Row::Parent { uri, name, .. } => {
                let name = if name.is_empty() { "/" } else { name.as_str() };
                println!("{}  {}", style(name).bold(), style(uri).dim());
            }
            Row::Content { name, size, path, .. } => {
                let path = path.as_deref().unwrap_or("(not cached)");
                println!(
                    "{}  {}  {}",
                    name,
                    tunevfs::vfs::format_size(*size),
                    path
                );
            }
            Row::EndOfResults => {}
        }
    }
}
