//! Browsing commands: resolve, list, parents, search.

use tunevfs::config::ConfigFile;
use tunevfs::operation::Row;
use tunevfs::Request;

use super::common::{parse_uri, parse_uri_or_root, print_rows, run_to_completion, start_service};
use crate::error::CliError;

/// Run the resolve command.
pub async fn resolve(config: &ConfigFile, uri: &str, json: bool) -> Result<(), CliError> {
    let request = Request::resolve(parse_uri(uri)?);
    let mut found = false;
    run(config, &request, |rows| {
        found |= !rows.is_empty();
        print_rows(rows, json);
    })
    .await?;
    if !found {
        return Err(CliError::Query(format!("Nothing found at {}", request.uri)));
    }
    Ok(())
}

/// Run the list command.
pub async fn list(config: &ConfigFile, uri: Option<&str>, json: bool) -> Result<(), CliError> {
    let request = Request::listing(parse_uri_or_root(uri)?);
    run(config, &request, |rows| print_rows(rows, json)).await
}

/// Run the parents command.
pub async fn parents(config: &ConfigFile, uri: &str, json: bool) -> Result<(), CliError> {
    let request = Request::parents(parse_uri(uri)?);
    run(config, &request, |rows| print_rows(rows, json)).await
}

/// Run the search command, printing matches as they are found.
pub async fn search(
    config: &ConfigFile,
    uri: &str,
    query: &str,
    json: bool,
) -> Result<(), CliError> {
    let request = Request::search(parse_uri(uri)?, query);
    let mut matches = 0usize;
    run(config, &request, |rows| {
        matches += rows.iter().filter(|row| **row != Row::EndOfResults).count();
        print_rows(rows, json);
    })
    .await?;
    if !json {
        eprintln!("{} matches", matches);
    }
    Ok(())
}

async fn run(
    config: &ConfigFile,
    request: &Request,
    on_rows: impl FnMut(&[Row]),
) -> Result<(), CliError> {
    let service = start_service(config)?;
    let result = run_to_completion(&service, request, on_rows).await;
    service.shutdown();
    result
}
