//! Init command - initialize configuration file.

use tunevfs::config::{config_file_path, ConfigFile};

use crate::error::CliError;

/// Run the init command.
///
/// An existing file is rewritten with its current values, adding any keys
/// it lacks.
pub fn run() -> Result<(), CliError> {
    let path = config_file_path();
    let existed = path.exists();

    let config = ConfigFile::load()?;
    config.save()?;
    std::fs::create_dir_all(&config.cache.directory)?;

    if existed {
        println!("Updated configuration file: {}", path.display());
    } else {
        println!("Created configuration file: {}", path.display());
    }
    println!("Cache directory: {}", config.cache.directory.display());
    println!();
    println!("Edit this file or use 'tunevfs config set' to customize settings.");
    Ok(())
}
