//! File logging, gated by `GLASGOW_WEB_LOG`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable naming the log file.
pub const LOG_ENV: &str = "GLASGOW_WEB_LOG";

const DEFAULT_FILTER: &str = "info";

/// `{base}.{timestamp}.{pid}`, so concurrent sessions never share a file.
fn session_log_path(base: &Path, timestamp: u64, pid: u32) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{}.{}", timestamp, pid));
    PathBuf::from(name)
}

/// Install the global subscriber if `GLASGOW_WEB_LOG` is set.
///
/// The terminal belongs to the session, so nothing is ever logged to it:
/// without the variable this is a no-op. `RUST_LOG` filters, default `info`.
pub fn init_tracing() {
    let Some(base) = std::env::var_os(LOG_ENV) else {
        return;
    };

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0);
    let path = session_log_path(Path::new(&base), timestamp, std::process::id());

    let file = match std::fs::File::create(&path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Warning: cannot create log file {}: {}", path.display(), err);
            return;
        }
    };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let file_layer = fmt::layer()
        .with_writer(file)
        .with_ansi(false)
        .with_thread_names(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .init();
}
