use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::fs::FsLayout;

/// Root configuration container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub terminal: TerminalConfig,
    #[serde(default)]
    pub bundles: Vec<BundleConfig>,
}

/// Interpreter session settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Virtual home directory, persisted across sessions (default: "/root").
    #[serde(default = "default_home_directory")]
    pub home_directory: String,
    /// Where a native directory is mounted (default: "/mnt").
    #[serde(default = "default_mount_directory")]
    pub mount_directory: String,
    /// How long a unit must run before the stop control enables (default: 100).
    #[serde(default = "default_interrupt_delay_ms")]
    pub interrupt_delay_ms: u64,
    /// Consecutive shell failures before the shell gives up (default: 3).
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
    /// Package locators installed at startup.
    #[serde(default)]
    pub packages: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            home_directory: default_home_directory(),
            mount_directory: default_mount_directory(),
            interrupt_delay_ms: default_interrupt_delay_ms(),
            max_failures: default_max_failures(),
            packages: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn layout(&self) -> FsLayout {
        FsLayout {
            home_directory: self.home_directory.clone(),
            mount_directory: self.mount_directory.clone(),
        }
    }
}

/// Persistent storage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the home snapshot. Defaults to the platform data
    /// directory.
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
    /// Push home to the store after every change, not just between
    /// commands (default: true).
    #[serde(default = "default_auto_persist")]
    pub auto_persist: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: None,
            auto_persist: default_auto_persist(),
        }
    }
}

impl StorageConfig {
    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("glasgow-web")
        })
    }
}

/// Terminal settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalConfig {
    /// Width used when the host terminal size is unknown (default: 80).
    #[serde(default = "default_columns")]
    pub default_columns: u16,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            default_columns: default_columns(),
        }
    }
}

/// A toolchain bundle made of host executables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleConfig {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub commands: Vec<CommandConfig>,
}

/// One command of a bundle and the program that implements it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandConfig {
    pub name: String,
    pub program: String,
}

fn default_home_directory() -> String {
    "/root".to_string()
}

fn default_mount_directory() -> String {
    "/mnt".to_string()
}

fn default_interrupt_delay_ms() -> u64 {
    100
}

fn default_max_failures() -> u32 {
    3
}

fn default_auto_persist() -> bool {
    true
}

fn default_columns() -> u16 {
    80
}
