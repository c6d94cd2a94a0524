// Configuration management module
// TOML settings for Ollama, generation, chunking and the document store

pub mod interactive;
pub mod settings;

pub use interactive::{run_interactive_config, show_config};
pub use settings::{Config, ConfigError, DocumentsConfig, GenerationConfig, OllamaConfig};

/// Get the default base directory path
#[inline]
pub fn get_base_dir() -> Result<std::path::PathBuf, ConfigError> {
    Config::default_base_dir()
}
