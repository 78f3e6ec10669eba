//! Shared test utilities: stub interpreter, spy terminal, stub commands.

#![allow(dead_code, unused_imports)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use glasgow_web::builder::{Bundle, CommandError, CommandIo, CommandRegistry};
use glasgow_web::controller::{
    InputDevice, Interpreter, InterpreterError, InterruptFlag, InterruptWaiter, OutputSink,
    SessionHooks, TerminalIo,
};
use glasgow_web::fs::{FileTree, FsLayout, FsMirror, MemoryStore};
use parking_lot::Mutex;
use tokio::sync::Notify;

pub type SpyBuffer = Arc<Mutex<Vec<u8>>>;

/// A mirror over an in-memory persistent store, with the default layout.
pub fn memory_mirror(auto_persist: bool) -> (FsMirror, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let mirror = FsMirror::new(FsLayout::default(), store.clone(), auto_persist);
    (mirror, store)
}

/// Let spawned tasks and debounced deliveries run.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

// --- terminal -----------------------------------------------------------

/// Terminal double: records writes, serves queued input.
pub struct SpyTerminal {
    pub written: SpyBuffer,
    input: Mutex<VecDeque<Vec<u8>>>,
    ready: Notify,
    columns: u16,
}

impl SpyTerminal {
    pub fn new(columns: u16) -> Arc<Self> {
        Arc::new(Self {
            written: Arc::new(Mutex::new(Vec::new())),
            input: Mutex::new(VecDeque::new()),
            ready: Notify::new(),
            columns,
        })
    }

    /// Queue a chunk for the next read. An empty chunk reads as end of input.
    pub fn push_input(&self, bytes: &[u8]) {
        self.input.lock().push_back(bytes.to_vec());
        self.ready.notify_one();
    }

    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.written.lock()).into_owned()
    }
}

#[async_trait]
impl TerminalIo for SpyTerminal {
    async fn read(&self) -> Vec<u8> {
        loop {
            if let Some(chunk) = self.input.lock().pop_front() {
                return chunk;
            }
            self.ready.notified().await;
        }
    }

    fn write(&self, bytes: &[u8]) -> usize {
        self.written.lock().extend_from_slice(bytes);
        bytes.len()
    }

    fn columns(&self) -> u16 {
        self.columns
    }
}

// --- interpreter --------------------------------------------------------

/// What a `run` call on the stub does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubBehavior {
    /// Echo the source back as the result.
    Echo,
    /// Signal start, wait on a registered waiter until interrupted, signal end.
    WaitForInterrupt,
    /// Signal start, poll the flag until raised, signal end.
    PollFlag,
}

/// Interpreter double that records every call it receives.
pub struct StubInterpreter {
    pub calls: Mutex<Vec<String>>,
    pub hooks: Mutex<Option<SessionHooks>>,
    pub flag: Mutex<Option<InterruptFlag>>,
    pub stdout: Mutex<Option<OutputSink>>,
    pub stdin: Mutex<Option<Arc<dyn InputDevice>>>,
    stdin_fd: u32,
    behavior: StubBehavior,
}

impl StubInterpreter {
    pub fn new(behavior: StubBehavior) -> Arc<Self> {
        Self::with_stdin_fd(behavior, 0)
    }

    pub fn with_stdin_fd(behavior: StubBehavior, stdin_fd: u32) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            hooks: Mutex::new(None),
            flag: Mutex::new(None),
            stdout: Mutex::new(None),
            stdin: Mutex::new(None),
            stdin_fd,
            behavior,
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().push(call.into());
    }

    fn session_hooks(&self) -> Result<SessionHooks, InterpreterError> {
        self.hooks
            .lock()
            .clone()
            .ok_or_else(|| InterpreterError::raised("RuntimeError", "not attached"))
    }
}

#[async_trait]
impl Interpreter for StubInterpreter {
    fn attach(&self, hooks: SessionHooks) {
        self.record("attach");
        *self.hooks.lock() = Some(hooks);
    }

    fn set_interrupt_flag(&self, flag: InterruptFlag) {
        self.record("set_interrupt_flag");
        *self.flag.lock() = Some(flag);
    }

    fn set_stdout(&self, sink: OutputSink) {
        self.record("set_stdout");
        *self.stdout.lock() = Some(sink);
    }

    fn set_stderr(&self, _sink: OutputSink) {
        self.record("set_stderr");
    }

    fn redirect_stdin(&self, device: Arc<dyn InputDevice>) -> Result<u32, InterpreterError> {
        self.record("redirect_stdin");
        *self.stdin.lock() = Some(device);
        Ok(self.stdin_fd)
    }

    async fn load_package_manager(&self) -> Result<(), InterpreterError> {
        self.record("load_package_manager");
        Ok(())
    }

    async fn install_package(&self, locator: &str) -> Result<(), InterpreterError> {
        self.record(format!("install:{}", locator));
        Ok(())
    }

    async fn run(&self, source: &str) -> Result<Option<String>, InterpreterError> {
        self.record(format!("run:{}", source));
        match self.behavior {
            StubBehavior::Echo => {
                let sink = self.stdout.lock().clone();
                if let Some(sink) = sink {
                    sink(source.as_bytes());
                }
                Ok(Some(source.to_string()))
            }
            StubBehavior::WaitForInterrupt => {
                let hooks = self.session_hooks()?;
                let waiter = InterruptWaiter::new();
                hooks.set_interrupt_waiter(Some(Arc::new(waiter.clone())));
                hooks.signal_execution_start();
                waiter.cancelled().await;
                hooks.set_interrupt_waiter(None);
                hooks.signal_execution_end();
                Err(InterpreterError::Interrupted)
            }
            StubBehavior::PollFlag => {
                let hooks = self.session_hooks()?;
                let flag = self.flag.lock().clone().unwrap_or_default();
                hooks.signal_execution_start();
                while !flag.take() {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                hooks.signal_execution_end();
                Err(InterpreterError::Interrupted)
            }
        }
    }
}

// --- build commands -----------------------------------------------------

/// `echo-exit <code> [text]`: print text, then exit with code (0 continues).
pub fn echo_exit(
    args: &[String],
    files: FileTree,
    io: &mut CommandIo<'_>,
) -> Result<FileTree, CommandError> {
    let code: i32 = args.first().and_then(|a| a.parse().ok()).unwrap_or(0);
    if let Some(text) = args.get(1) {
        io.stdout(format!("{}\n", text).as_bytes());
    }
    if code == 0 {
        Ok(files)
    } else {
        Err(CommandError::Exit { code, files })
    }
}

/// `write <path> <text>`: add a file to the tree.
pub fn write_file(
    args: &[String],
    files: FileTree,
    _io: &mut CommandIo<'_>,
) -> Result<FileTree, CommandError> {
    match args {
        [path, text] => Ok(files.with(path.clone(), text.as_bytes().to_vec())),
        _ => Err(CommandError::Fault("usage: write <path> <text>".to_string())),
    }
}

/// `chunks`: emit output split mid-line across writes.
pub fn chunked_output(
    _args: &[String],
    files: FileTree,
    io: &mut CommandIo<'_>,
) -> Result<FileTree, CommandError> {
    io.stdout(b"par");
    io.flush();
    io.stderr(b"tial\nsecond ");
    io.stdout(b"line\ntrailing");
    Ok(files)
}

pub fn panicking(
    _args: &[String],
    _files: FileTree,
    _io: &mut CommandIo<'_>,
) -> Result<FileTree, CommandError> {
    panic!("synthesis exploded");
}

/// `slow <ms>`: block the worker for a while.
pub fn slow(
    args: &[String],
    files: FileTree,
    _io: &mut CommandIo<'_>,
) -> Result<FileTree, CommandError> {
    let millis: u64 = args.first().and_then(|a| a.parse().ok()).unwrap_or(50);
    std::thread::sleep(Duration::from_millis(millis));
    Ok(files)
}

/// Registry with one `test` bundle holding every stub command.
pub fn stub_registry() -> CommandRegistry {
    CommandRegistry::new().with_bundle(
        Bundle::new("test-tools", "1.0")
            .with_command("echo-exit", echo_exit)
            .with_command("write", write_file)
            .with_command("chunks", chunked_output)
            .with_command("panic", panicking)
            .with_command("slow", slow),
    )
}

/// A file tree holding a script named `script.json` with `commands`.
pub fn script_tree(commands: &[&[&str]]) -> FileTree {
    let commands: Vec<Vec<&str>> = commands.iter().map(|c| c.to_vec()).collect();
    let body = serde_json::json!({ "commands": commands }).to_string();
    FileTree::new().with("script.json", body.into_bytes())
}
