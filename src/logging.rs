//! Logging setup: stderr output plus a rolling daily log file.

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Returns the platform-appropriate directory for log files.
///
/// | Platform | Directory |
/// |----------|-----------|
/// | Linux | `$XDG_STATE_HOME/pacerec/logs` or `~/.local/state/pacerec/logs` |
/// | macOS | `~/Library/Application Support/pacerec/logs` |
/// | Windows | `%LOCALAPPDATA%\pacerec\logs` |
pub fn log_dir() -> PathBuf {
    match directories::ProjectDirs::from("", "", "pacerec") {
        Some(base) => {
            #[cfg(target_os = "linux")]
            {
                base.state_dir()
                    .map(|p| p.to_path_buf())
                    .unwrap_or_else(|| base.data_local_dir().join("state"))
                    .join("logs")
            }
            #[cfg(not(target_os = "linux"))]
            {
                base.data_local_dir().join("logs")
            }
        }
        None => std::env::temp_dir().join("pacerec").join("logs"),
    }
}

/// Initialize tracing. `RUST_LOG` takes precedence over the verbosity
/// flags. Returns the file appender guard, which must stay alive for
/// the process lifetime; `None` when the log directory is unavailable.
pub fn init(verbose: bool, quiet: bool) -> Option<WorkerGuard> {
    let default_level = if verbose {
        "debug"
    } else if quiet {
        "warn"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let dir = log_dir();
    let file_layer = match std::fs::create_dir_all(&dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&dir, "pacerec.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            Some((layer, guard))
        }
        Err(e) => {
            eprintln!("warning: log directory unavailable ({}), logging to stderr only", e);
            None
        }
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false);

    match file_layer {
        Some((layer, guard)) => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_ends_with_logs() {
        let dir = log_dir();
        assert!(dir.ends_with("logs"), "unexpected log dir: {:?}", dir);
    }
}
