//! Toolchain commands and the registry they are looked up in.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::fs::FileTree;

use super::line_buffer::LineBuffer;
use super::protocol::Packages;

/// How a command run ended when it did not simply succeed.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Controlled exit: stops the script and becomes the build result.
    #[error("exited with code {code}")]
    Exit { code: i32, files: FileTree },

    /// Anything else. Fails the build.
    #[error("{0}")]
    Fault(String),
}

/// Output side of a running command. Standard output and standard error
/// share one line buffer, so lines keep their relative order.
pub struct CommandIo<'a> {
    buffer: &'a mut LineBuffer,
    emit: &'a mut dyn FnMut(Vec<u8>),
}

impl<'a> CommandIo<'a> {
    pub(crate) fn new(buffer: &'a mut LineBuffer, emit: &'a mut dyn FnMut(Vec<u8>)) -> Self {
        Self { buffer, emit }
    }

    pub fn stdout(&mut self, bytes: &[u8]) {
        self.write(bytes);
    }

    pub fn stderr(&mut self, bytes: &[u8]) {
        self.write(bytes);
    }

    /// Flushes are ignored; output is forwarded a full line at a time.
    pub fn flush(&mut self) {}

    fn write(&mut self, bytes: &[u8]) {
        for line in self.buffer.push(bytes) {
            if !line.is_empty() {
                (self.emit)(line);
            }
        }
    }
}

/// One toolchain entry point.
///
/// Receives the current file tree by value and returns the tree the next
/// command should see.
pub trait Command: Send + Sync {
    fn run(
        &self,
        args: &[String],
        files: FileTree,
        io: &mut CommandIo<'_>,
    ) -> Result<FileTree, CommandError>;
}

impl<F> Command for F
where
    F: Fn(&[String], FileTree, &mut CommandIo<'_>) -> Result<FileTree, CommandError> + Send + Sync,
{
    fn run(
        &self,
        args: &[String],
        files: FileTree,
        io: &mut CommandIo<'_>,
    ) -> Result<FileTree, CommandError> {
        self(args, files, io)
    }
}

/// A named, versioned group of commands.
#[derive(Clone)]
pub struct Bundle {
    pub name: String,
    pub version: String,
    commands: Vec<(String, Arc<dyn Command>)>,
}

impl Bundle {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            commands: Vec::new(),
        }
    }

    pub fn with_command(mut self, name: impl Into<String>, command: impl Command + 'static) -> Self {
        self.commands.push((name.into(), Arc::new(command)));
        self
    }

    pub fn command_names(&self) -> impl Iterator<Item = &str> {
        self.commands.iter().map(|(name, _)| name.as_str())
    }
}

/// Bundles available to a build worker, injected at spawn time.
#[derive(Clone, Default)]
pub struct CommandRegistry {
    bundles: Vec<Bundle>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, bundle: Bundle) {
        self.bundles.push(bundle);
    }

    pub fn with_bundle(mut self, bundle: Bundle) -> Self {
        self.register(bundle);
        self
    }

    pub fn packages(&self) -> Packages {
        self.bundles
            .iter()
            .map(|bundle| (bundle.name.clone(), bundle.version.clone()))
            .collect()
    }

    /// Command table by name. Later bundles win on a name clash.
    pub(crate) fn command_table(&self) -> HashMap<String, Arc<dyn Command>> {
        self.bundles
            .iter()
            .flat_map(|bundle| bundle.commands.iter())
            .map(|(name, command)| (name.clone(), Arc::clone(command)))
            .collect()
    }
}
