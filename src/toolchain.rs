//! Text-level facade over the build pipeline.

use tracing::info;

use crate::builder::{BuildError, BuildResult, Builder, CommandRegistry, Packages};
use crate::fs::FileTree;

/// A started build worker together with its package list.
pub struct Toolchain {
    builder: Builder,
    packages: Packages,
}

impl Toolchain {
    /// Start the worker and wait until it has announced its packages.
    pub async fn load(registry: CommandRegistry) -> Result<Self, BuildError> {
        let builder = Builder::spawn(registry)?;
        let packages = builder.packages().await?;
        for (name, version) in &packages {
            info!(package = %name, %version, "toolchain package");
        }
        Ok(Self { builder, packages })
    }

    pub fn available(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    pub fn version(&self, name: &str) -> Option<&str> {
        self.packages.get(name).map(String::as_str)
    }

    pub fn packages(&self) -> &Packages {
        &self.packages
    }

    /// Run a build, handing each output line to `on_output` as text.
    /// Invalid UTF-8 is replaced, not rejected.
    pub async fn build(
        &self,
        files: FileTree,
        script_name: &str,
        mut on_output: impl FnMut(&str) + Send,
    ) -> Result<BuildResult, BuildError> {
        self.builder
            .build(files, script_name, |bytes| {
                on_output(&String::from_utf8_lossy(bytes))
            })
            .await
    }
}
