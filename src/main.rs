//! pacerec command-line interface.
//!
//! Headless screen recording: `pacerec record` captures the primary
//! monitor until Ctrl+C (or `--duration` elapses).

use clap::{Args, Parser, Subcommand};
use pacerec::recorder::{self, RecorderState, RecordingHandle};
use pacerec::{config, encoder, Config};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

/// pacerec - fixed-rate screen recorder
#[derive(Parser, Debug)]
#[command(name = "pacerec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record the primary monitor to an MP4 file
    Record(RecordOptions),
    /// List available displays
    List,
    /// Show or change stored settings
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Args, Debug)]
struct RecordOptions {
    /// Target frame rate (default from config, initially 20)
    #[arg(long)]
    fps: Option<u32>,

    /// Directory for the output file (default: Videos directory)
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Stop automatically after this many seconds
    #[arg(long)]
    duration: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the current configuration
    Show,
    /// Update configuration values
    Set {
        /// Default frame rate
        #[arg(long)]
        fps: Option<u32>,

        /// Default output directory
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let _guard = pacerec::logging::init(cli.verbose, cli.quiet);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Commands::Record(options) => record(options).await,
        Commands::List => {
            list_displays();
            Ok(())
        }
        Commands::Config { action } => configure(action),
    }
}

async fn record(options: RecordOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load();
    let fps = options.fps.unwrap_or(config.fps);
    if fps == 0 {
        return Err("frame rate must be at least 1".into());
    }
    let output_dir = options.output_dir.or(config.output_dir);
    if let Some(ref dir) = output_dir {
        config::validate_directory(dir)?;
    }

    encoder::ensure_ffmpeg()?;

    let handle = recorder::start(fps, output_dir)?;
    println!(
        "Recording to {} at {} fps (Ctrl+C to stop)",
        handle.output_path().display(),
        fps
    );

    wait_for_stop(&handle, options.duration).await?;
    handle.request_stop();

    let output_path = handle.output_path().to_path_buf();
    let summary = tokio::task::spawn_blocking(move || handle.wait()).await??;
    println!(
        "Recording complete: {:.1}s, {} frames ({} skipped), saved to {}",
        summary.elapsed.as_secs_f64(),
        summary.frames_written,
        summary.frames_skipped,
        output_path.display()
    );
    Ok(())
}

/// Block the controller until Ctrl+C, the optional duration elapses, or
/// the capture thread closes on its own (fatal write error).
async fn wait_for_stop(
    handle: &RecordingHandle,
    duration: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let deadline = duration.map(Duration::from_secs);
    let closed = async {
        while handle.state() != RecorderState::Closed {
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    };

    match deadline {
        Some(limit) => {
            tokio::select! {
                r = tokio::signal::ctrl_c() => r?,
                _ = tokio::time::sleep(limit) => {}
                _ = closed => {}
            }
        }
        None => {
            tokio::select! {
                r = tokio::signal::ctrl_c() => r?,
                _ = closed => {}
            }
        }
    }
    Ok(())
}

fn list_displays() {
    let monitors = pacerec::capture::list_monitors();
    if monitors.is_empty() {
        println!("No displays found");
        return;
    }
    for m in monitors {
        let primary = if m.is_primary { " (primary)" } else { "" };
        println!(
            "{}: {} {}x{} at ({}, {}){}",
            m.id, m.name, m.width, m.height, m.x, m.y, primary
        );
    }
}

fn configure(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Show => {
            let config = Config::load();
            println!("fps: {}", config.fps);
            match config.output_dir {
                Some(dir) => println!("output_dir: {}", dir.display()),
                None => println!("output_dir: (default Videos directory)"),
            }
            Ok(())
        }
        ConfigAction::Set { fps, output_dir } => {
            let mut config = Config::load();
            if let Some(fps) = fps {
                if fps == 0 {
                    return Err("frame rate must be at least 1".into());
                }
                config.fps = fps;
            }
            if let Some(dir) = output_dir {
                config::validate_directory(&dir)?;
                config.output_dir = Some(dir);
            }
            let path = config.save()?;
            println!("Saved {}", path.display());
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_record_with_options() {
        let cli = Cli::try_parse_from([
            "pacerec",
            "record",
            "--fps",
            "30",
            "--duration",
            "5",
        ])
        .unwrap();

        match cli.command {
            Commands::Record(options) => {
                assert_eq!(options.fps, Some(30));
                assert_eq!(options.duration, Some(5));
                assert!(options.output_dir.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_parses_config_set() {
        let cli =
            Cli::try_parse_from(["pacerec", "config", "set", "--fps", "60"]).unwrap();

        match cli.command {
            Commands::Config {
                action: ConfigAction::Set { fps, output_dir },
            } => {
                assert_eq!(fps, Some(60));
                assert!(output_dir.is_none());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["pacerec", "pause"]).is_err());
    }
}
