//! Commands backed by host executables.

use std::io::Read;
use std::path::{Component, Path, PathBuf};
use std::process::{Command as Process, Stdio};
use std::sync::mpsc;
use std::thread;

use tracing::{debug, warn};

use crate::config::BundleConfig;
use crate::fs::FileTree;

use super::command::{Bundle, Command, CommandError, CommandIo, CommandRegistry};

/// Runs `program` in a scratch directory materialized from the file tree,
/// then reads the directory back as the resulting tree.
///
/// A non-zero exit status is a controlled exit; failing to start the
/// program, or a kill by signal, is a fault.
#[derive(Debug, Clone)]
pub struct ExternalCommand {
    program: PathBuf,
}

impl ExternalCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Command for ExternalCommand {
    fn run(
        &self,
        args: &[String],
        files: FileTree,
        io: &mut CommandIo<'_>,
    ) -> Result<FileTree, CommandError> {
        let scratch = tempfile::Builder::new()
            .prefix("glasgow-build-")
            .tempdir()
            .map_err(|e| fault("create scratch directory", e))?;
        materialize(scratch.path(), &files)?;

        let mut child = Process::new(&self.program)
            .args(args)
            .current_dir(scratch.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| fault(&format!("start '{}'", self.program.display()), e))?;
        debug!(program = %self.program.display(), ?args, "command started");

        let (chunks_tx, chunks_rx) = mpsc::channel::<Vec<u8>>();
        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(pump(stdout, chunks_tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(pump(stderr, chunks_tx.clone()));
        }
        drop(chunks_tx);
        for chunk in chunks_rx {
            io.stdout(&chunk);
        }
        let lost_output = !join_readers(readers);

        let status = child.wait().map_err(|e| fault("wait for command", e))?;
        if lost_output {
            warn!(program = %self.program.display(), "output reader panicked");
            return Err(CommandError::Fault(format!(
                "lost output of '{}'",
                self.program.display()
            )));
        }
        let produced = collect(scratch.path())?;
        match status.code() {
            Some(0) => Ok(produced),
            Some(code) => Err(CommandError::Exit {
                code,
                files: produced,
            }),
            None => Err(CommandError::Fault(format!(
                "'{}' was terminated by a signal",
                self.program.display()
            ))),
        }
    }
}

fn pump(mut source: impl Read + Send + 'static, sink: mpsc::Sender<Vec<u8>>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut buffer = [0u8; 4096];
        loop {
            match source.read(&mut buffer) {
                Ok(0) | Err(_) => break,
                Ok(count) => {
                    if sink.send(buffer[..count].to_vec()).is_err() {
                        break;
                    }
                }
            }
        }
    })
}

/// Wait for every reader; false if any of them panicked.
fn join_readers(readers: Vec<thread::JoinHandle<()>>) -> bool {
    readers
        .into_iter()
        .fold(true, |clean, reader| reader.join().is_ok() && clean)
}

fn fault(action: &str, err: std::io::Error) -> CommandError {
    CommandError::Fault(format!("failed to {}: {}", action, err))
}

fn materialize(root: &Path, files: &FileTree) -> Result<(), CommandError> {
    for (relative, bytes) in files.iter() {
        let escapes = Path::new(relative)
            .components()
            .any(|part| !matches!(part, Component::Normal(_) | Component::CurDir));
        if escapes {
            return Err(CommandError::Fault(format!(
                "refusing to write '{}' outside the build directory",
                relative
            )));
        }
        let target = root.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| fault("create directory", e))?;
        }
        std::fs::write(&target, bytes).map_err(|e| fault("write input file", e))?;
    }
    Ok(())
}

fn collect(root: &Path) -> Result<FileTree, CommandError> {
    let mut tree = FileTree::new();
    let mut pending = vec![(root.to_path_buf(), String::new())];
    while let Some((dir, prefix)) = pending.pop() {
        let entries = std::fs::read_dir(&dir).map_err(|e| fault("read output directory", e))?;
        for entry in entries {
            let entry = entry.map_err(|e| fault("read output directory", e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let relative = if prefix.is_empty() {
                name
            } else {
                format!("{}/{}", prefix, name)
            };
            let path = entry.path();
            if path.is_dir() {
                pending.push((path, relative));
            } else if path.is_file() {
                let bytes = std::fs::read(&path).map_err(|e| fault("read output file", e))?;
                tree.insert(relative, bytes);
            }
        }
    }
    Ok(tree)
}

/// Build the command registry described by the `[[bundles]]` config.
pub fn registry_from_config(bundles: &[BundleConfig]) -> CommandRegistry {
    bundles
        .iter()
        .fold(CommandRegistry::new(), |registry, config| {
            let bundle = config.commands.iter().fold(
                Bundle::new(&config.name, &config.version),
                |bundle, command| {
                    bundle.with_command(&command.name, ExternalCommand::new(&command.program))
                },
            );
            registry.with_bundle(bundle)
        })
}
