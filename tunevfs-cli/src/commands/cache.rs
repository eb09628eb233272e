//! Cache management CLI commands.

use clap::Subcommand;
use tunevfs::blob::BlobCache;
use tunevfs::config::ConfigFile;
use tunevfs::vfs::format_size;

use crate::error::CliError;

/// Catalog databases kept next to the blob cache.
const CATALOGS: [&str; 3] = ["zxart", "zxtunes", "modarchive"];

/// Cache action subcommands.
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove all downloaded content
    Clear,
    /// Show cache statistics
    Stats,
}

/// Run a cache subcommand.
pub fn run(config: &ConfigFile, action: CacheAction) -> Result<(), CliError> {
    let blobs = BlobCache::new(config.blobs_directory());

    match action {
        CacheAction::Clear => {
            println!("Clearing download cache at: {}", blobs.root().display());

            match blobs.clear() {
                Ok(result) => {
                    println!(
                        "Deleted {} files, freed {}",
                        result.files_deleted,
                        format_size(result.bytes_freed)
                    );
                    Ok(())
                }
                Err(e) => Err(CliError::CacheClear(e.to_string())),
            }
        }
        CacheAction::Stats => {
            println!("Download cache: {}", blobs.root().display());

            match blobs.stats() {
                Ok((files, bytes)) => {
                    println!("  Files: {}", files);
                    println!("  Size:  {}", format_size(bytes));
                }
                Err(e) => return Err(CliError::CacheStats(e.to_string())),
            }

            for name in CATALOGS {
                let path = config.database_path(name);
                match std::fs::metadata(&path) {
                    Ok(metadata) => println!("Catalog {}: {}", name, format_size(metadata.len())),
                    Err(_) => println!("Catalog {}: (not created)", name),
                }
            }
            Ok(())
        }
    }
}
