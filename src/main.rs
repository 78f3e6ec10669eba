use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use glasgow_web::builder::registry_from_config;
use glasgow_web::config::Config;
use glasgow_web::controller::{ExecutionGate, SessionController};
use glasgow_web::fs::{DirectoryStore, FsMirror, SnapshotStore};
use glasgow_web::logging::init_tracing;
use glasgow_web::pty::host::{host_size, spawn_stdin_forwarder, RawModeGuard};
use glasgow_web::pty::{self, PtySlave, ResizeWatcher, Signal};
use glasgow_web::shell::{ShellOptions, ToolShell};
use glasgow_web::toolchain::Toolchain;

#[derive(Debug, Parser)]
#[command(name = "glasgow-web", version, about = "Interactive hardware toolchain shell")]
struct Cli {
    /// Config file (default: ~/.config/glasgow-web/config.toml).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the persisted home snapshot.
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Host directory to mount at the mount directory.
    #[arg(long)]
    mount: Option<PathBuf>,

    /// Only persist home between commands.
    #[arg(long)]
    no_auto_persist: bool,
}

const BANNER: &str = "glasgow-web: type `help` for commands, ^C to stop, ^D to quit\n";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(dir) = cli.state_dir {
        config.storage.state_dir = Some(dir);
    }
    if cli.no_auto_persist {
        config.storage.auto_persist = false;
    }
    info!(?config, "configuration loaded");

    let (master, slave, mut output) = pty::open(host_size(config.terminal.default_columns));
    let raw_mode = RawModeGuard::new().map_err(|e| anyhow!("failed to enable raw mode: {}", e))?;

    let pump = tokio::spawn(async move {
        let mut stdout = io::stdout();
        while let Some(chunk) = output.recv().await {
            if stdout.write_all(&chunk).and_then(|_| stdout.flush()).is_err() {
                break;
            }
        }
    });
    spawn_stdin_forwarder(master.clone()).context("failed to start stdin forwarder")?;
    let resize = ResizeWatcher::start(master.clone())
        .map_err(|e| anyhow!("failed to watch terminal resizes: {}", e))?;

    let result = run(&config, cli.mount, slave).await;

    if let Some(resize) = resize {
        resize.stop();
    }
    master.end_session();
    let _ = pump.await;
    drop(raw_mode);
    result
}

async fn run(config: &Config, mount: Option<PathBuf>, slave: PtySlave) -> Result<()> {
    slave.write(BANNER.as_bytes());

    slave.write(b"Loading toolchain...\n");
    let toolchain = match Toolchain::load(registry_from_config(&config.bundles)).await {
        Ok(toolchain) => Some(Arc::new(toolchain)),
        Err(err) => {
            warn!(error = %err, "toolchain unavailable");
            slave.write(format!("Toolchain unavailable: {}\n", err).as_bytes());
            None
        }
    };

    let store = SnapshotStore::open(config.storage.resolved_state_dir())?;
    let filesystem = FsMirror::new(
        config.session.layout(),
        Arc::new(store),
        config.storage.auto_persist,
    );

    let shell = Arc::new(ToolShell::new(
        ShellOptions {
            max_failures: config.session.max_failures,
        },
        toolchain,
    ));
    let controller = SessionController::new(shell, filesystem.clone());

    let interrupts = controller.clone();
    slave.on_signal(move |signal| match signal {
        Signal::Interrupt => {
            let delivery = interrupts.interrupt();
            debug!(?delivery, "terminal interrupt");
        }
    });

    controller.setup_input_output(Arc::new(slave))?;

    let gate = ExecutionGate::new(Duration::from_millis(config.session.interrupt_delay_ms));
    gate.on_change(|enabled| debug!(enabled, "stop control"));
    let started = gate.clone();
    controller.on_execution_start(move || started.execution_started());
    controller.on_execution_end(move || gate.execution_ended());

    let home = config.session.home_directory.clone();
    controller.watch_tree(&home, |nodes| {
        debug!(entries = nodes.len(), "home tree changed");
    })?;

    filesystem.mount_home().await?;
    if let Some(dir) = mount {
        let dir = dir
            .canonicalize()
            .with_context(|| format!("cannot mount '{}'", dir.display()))?;
        filesystem
            .mount_native_fs(Arc::new(DirectoryStore::new(dir)))
            .await?;
    }

    for locator in &config.session.packages {
        controller.install(locator).await?;
    }

    let outcome = controller.run_code("repl").await;
    if filesystem.is_native_mounted() {
        filesystem.unmount_native_fs().await?;
    }
    controller.dispose();
    outcome?;
    Ok(())
}
