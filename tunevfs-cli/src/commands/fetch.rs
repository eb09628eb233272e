//! Fetch command - make file content available locally.

use std::fs::File;
use std::io;
use std::path::Path;

use tunevfs::config::ConfigFile;
use tunevfs::operation::Row;
use tunevfs::Request;

use super::common::{parse_uri, print_rows, run_to_completion, start_service};
use crate::error::CliError;

/// Run the fetch command.
///
/// Without `output` the location of the cached content is printed.
pub async fn run(
    config: &ConfigFile,
    uri: &str,
    output: Option<&Path>,
    json: bool,
) -> Result<(), CliError> {
    let service = start_service(config)?;
    let request = Request::file(parse_uri(uri)?);

    let mut content = Vec::new();
    let result = run_to_completion(&service, &request, |rows| content.extend_from_slice(rows)).await;
    if let Err(e) = result {
        service.shutdown();
        return Err(e);
    }

    if let Some(output) = output {
        let copied = tokio::task::block_in_place(|| -> Result<u64, CliError> {
            let mut reader = service.open_file(&request.uri)?;
            let mut writer = File::create(output)?;
            Ok(io::copy(&mut reader, &mut writer)?)
        })?;
        println!("Wrote {} bytes to {}", copied, output.display());
    } else {
        print_rows(&content, json);
        if let [Row::Content { path: None, .. }] = content.as_slice() {
            eprintln!("Content too small to cache; use --output to save it");
        }
    }

    service.shutdown();
    Ok(())
}
