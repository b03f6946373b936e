// Configuration management module
// TOML settings, interactive setup, and external catalog link resolution

pub mod interactive;
pub mod links;
pub mod settings;

#[cfg(test)]
mod tests;

pub use interactive::{run_interactive_config, show_config};
pub use links::{BaseUrlSource, BaseUrlWatcher, CatalogLinks};
pub use settings::{CatalogConfig, Config, ConfigError, LinksConfig, OllamaConfig};

/// Resolve the configuration directory, preferring an explicit override
#[inline]
pub fn get_config_dir(
    override_dir: Option<&std::path::Path>,
) -> Result<std::path::PathBuf, ConfigError> {
    match override_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Config::default_dir(),
    }
}
