// Configuration management module
// TOML settings persisted under a platform config directory

pub mod settings;

pub use settings::{Config, ConfigError, OllamaConfig, SearchConfig};

/// Get the directory holding the config file and backing stores.
///
/// Honors the `DOCVEC_DIR` environment variable, falling back to the
/// platform config directory.
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    if let Ok(dir) = std::env::var("DOCVEC_DIR") {
        return Ok(std::path::PathBuf::from(dir));
    }

    dirs::config_dir()
        .map(|dir| dir.join("docvec"))
        .ok_or(ConfigError::DirectoryError)
}
