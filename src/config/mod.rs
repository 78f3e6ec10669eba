//! Configuration: `~/.config/glasgow-web/config.toml`.

mod loader;
mod types;

pub use loader::ConfigError;
pub use types::{BundleConfig, CommandConfig, Config, SessionConfig, StorageConfig, TerminalConfig};
