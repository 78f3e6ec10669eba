//! The isolated build context: a dedicated thread owning the command table.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::fs::FileTree;

use super::command::{Command, CommandError, CommandIo, CommandRegistry};
use super::line_buffer::LineBuffer;
use super::protocol::{BuilderMessage, HostMessage};
use super::script::{Script, ScriptError};

/// Reasons a build fails outright.
#[derive(Debug, Error)]
pub(crate) enum BuildFault {
    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("Command '{0}' is not available")]
    UnknownCommand(String),

    #[error("Command '{command}' failed: {message}")]
    Command { command: String, message: String },
}

pub(crate) struct WorkerChannels {
    pub requests: std_mpsc::Sender<HostMessage>,
    pub events: mpsc::UnboundedReceiver<BuilderMessage>,
    pub thread: thread::JoinHandle<()>,
}

/// Start the worker. It announces its packages before taking requests and
/// exits when the request sender is dropped.
pub(crate) fn spawn(registry: CommandRegistry) -> std::io::Result<WorkerChannels> {
    let (requests, inbox) = std_mpsc::channel();
    let (outbox, events) = mpsc::unbounded_channel();
    let thread = thread::Builder::new()
        .name("builder-worker".to_string())
        .spawn(move || run(registry, inbox, outbox))?;
    Ok(WorkerChannels {
        requests,
        events,
        thread,
    })
}

fn run(
    registry: CommandRegistry,
    inbox: std_mpsc::Receiver<HostMessage>,
    outbox: mpsc::UnboundedSender<BuilderMessage>,
) {
    let packages = registry.packages();
    let commands = registry.command_table();
    debug!(?packages, "build worker ready");
    if outbox.send(BuilderMessage::Packages { packages }).is_err() {
        return;
    }

    while let Ok(message) = inbox.recv() {
        match message {
            HostMessage::Build { files, script_name } => {
                let mut emit = |bytes: Vec<u8>| {
                    debug!(target: "builder", "{}", String::from_utf8_lossy(&bytes).trim_end());
                    if outbox.send(BuilderMessage::Output { bytes }).is_err() {
                        trace!("host dropped; discarding output");
                    }
                };
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                    execute(&commands, files, &script_name, &mut emit)
                }));
                let reply = match outcome {
                    Ok(Ok((code, files))) => BuilderMessage::Result { code, files },
                    Ok(Err(fault)) => BuilderMessage::Error {
                        error: fault.to_string(),
                    },
                    Err(payload) => BuilderMessage::Error {
                        error: format!("Build panicked: {}", panic_message(payload.as_ref())),
                    },
                };
                debug!(kind = reply.kind(), script = %script_name, "build finished");
                if outbox.send(reply).is_err() {
                    break;
                }
            }
        }
    }
    debug!("build worker stopped");
}

/// Run every command of the script in order, threading the file tree
/// through. A controlled exit ends the script early with its code.
pub(crate) fn execute(
    commands: &HashMap<String, Arc<dyn Command>>,
    files: FileTree,
    script_name: &str,
    emit: &mut dyn FnMut(Vec<u8>),
) -> Result<(i32, FileTree), BuildFault> {
    let script = Script::from_tree(&files, script_name)?;
    let mut buffer = LineBuffer::new();
    let mut current = files;

    for step in &script.commands {
        let mut io = CommandIo::new(&mut buffer, emit);
        io.stdout(&step.trace_line());

        let command = commands
            .get(&step.name)
            .ok_or_else(|| BuildFault::UnknownCommand(step.name.clone()))?;
        match command.run(&step.args, current, &mut io) {
            Ok(next) => current = next,
            Err(CommandError::Exit { code, files }) => return Ok((code, files)),
            Err(CommandError::Fault(message)) => {
                return Err(BuildFault::Command {
                    command: step.name.clone(),
                    message,
                })
            }
        }
    }
    Ok((0, current))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        text.to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unknown panic".to_string()
    }
}
