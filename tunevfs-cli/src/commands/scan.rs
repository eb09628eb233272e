//! Scan command - list playable modules below the given locations.

use std::sync::Arc;
use std::time::Duration;

use console::style;
use tunevfs::config::ConfigFile;
use tunevfs::decoder::{ProbeDecoder, PROPERTY_AUTHOR, PROPERTY_TITLE, PROPERTY_TYPE};
use tunevfs::scanner::ScanEvent;
use tunevfs::Identifier;

use super::common::{parse_uri, spinner, start_service};
use crate::error::CliError;

/// Run the scan command.
pub async fn run(
    config: &ConfigFile,
    uris: &[String],
    queue_size: usize,
    json: bool,
) -> Result<(), CliError> {
    let ids = uris
        .iter()
        .map(|uri| parse_uri(uri).map(Identifier::from_url))
        .collect::<Result<Vec<_>, _>>()?;

    let service = start_service(config)?;
    let scanner = service.scanner(Arc::new(ProbeDecoder::new()));
    let mut handle = scanner.spawn(ids, queue_size);
    let bar = spinner("Scanning");

    let mut found = 0u64;
    let summary = loop {
        let Some(event) = handle.recv().await else {
            break None;
        };
        match event {
            ScanEvent::Module { id, module } => {
                found += 1;
                bar.set_message(format!("Scanning ({} modules)", found));
                let title = module.property(PROPERTY_TITLE, "");
                let author = module.property(PROPERTY_AUTHOR, "");
                let kind = module.property(PROPERTY_TYPE, "");
                let duration = format_duration(module.duration());
                bar.suspend(|| {
                    if json {
                        let line = serde_json::json!({
                            "uri": id.full().as_str(),
                            "title": title,
                            "author": author,
                            "type": kind,
                            "duration": duration,
                        });
                        println!("{}", line);
                    } else {
                        println!("{}\t{}\t{}\t{}\t{}", id, kind, duration, author, title);
                    }
                });
            }
            ScanEvent::Error { id, message } => {
                bar.suspend(|| eprintln!("{} {}: {}", style("skipped").yellow(), id, message));
            }
            ScanEvent::Finished(summary) => break Some(summary),
        }
    };
    bar.finish_and_clear();
    service.shutdown();

    let Some(summary) = summary else {
        return Err(CliError::Query("scan ended unexpectedly".to_string()));
    };
    if let Some(reason) = summary.aborted {
        return Err(CliError::Query(reason));
    }
    eprintln!(
        "{} modules, {} skipped{}",
        summary.modules,
        summary.errors,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    Ok(())
}

fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
