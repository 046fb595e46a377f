// Configuration management module
// TOML settings, environment overrides, secrets and their rendering

pub mod display;
pub mod settings;


pub use display::{render_config, show_config};
pub use settings::{
    ApiKey, AuthStyle, Config, ConfigError, EmbeddingConfig, EmbeddingProvider, GenerationConfig,
    IngestConfig, Secrets, ServerConfig, StoreConfig,
};

/// Get the configuration directory path
#[inline]
pub fn get_config_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::config_dir()
}
