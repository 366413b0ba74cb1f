//! Config command - inspect the configuration file

use crate::cli::ConfigCommands;
use crate::config::BookHubConfig;
use crate::BookHubError;

type Result<T> = std::result::Result<T, BookHubError>;

/// Execute a config subcommand
///
/// # Errors
/// Returns an error if the configuration cannot be serialized or located
pub fn execute(config: &BookHubConfig, command: &ConfigCommands) -> Result<()> {
    match command {
        ConfigCommands::Show => {
            let toml_string = toml::to_string_pretty(config)
                .map_err(|e| BookHubError::InvalidInput(format!("Failed to serialize config: {e}")))?;
            print!("{toml_string}");
        }
        ConfigCommands::Path => {
            println!("{}", BookHubConfig::config_path()?.display());
        }
    }
    Ok(())
}
