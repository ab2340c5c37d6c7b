//! runboard: run several commands side by side from one terminal.
//!
//! This is the entry point of the application. It parses command-line arguments,
//! loads configuration, and hands control to the supervisor's event loop, which
//! multiplexes process output and reads operator commands from stdin.

mod command;
mod config;
mod console;
mod events;
mod logging;
mod output;
mod palette;
mod process;
mod runner;
mod supervisor;

use std::io::BufRead;
use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Style};
use clap::builder::Styles;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::console::Console;
use crate::events::Event;
use crate::logging::LogLevel;
use crate::supervisor::Supervisor;

/// Command-line interface definition.
#[derive(Debug, Parser)]
#[command(
    name = "runboard",
    version,
    about = "Run several commands side by side with interactive control",
    styles = help_styles()
)]
struct Cli {
    /// Path to the configuration file (default: ./runboard.toml).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Diagnostic log level (overrides RUNBOARD_LOG).
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    /// Disable colored output.
    #[arg(long)]
    no_color: bool,
    /// Text shown before the input marker.
    #[arg(long, default_value = "run")]
    prompt: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level);
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_config_error(&err);
            err.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32, ConfigError> {
    let specs = config::load_specs(cli.config.as_deref())?;

    let styled = !cli.no_color && std::env::var_os("NO_COLOR").is_none();
    let console = Console::stdio(&cli.prompt, styled);
    let (event_tx, event_rx) = mpsc::channel(256);
    let supervisor = Supervisor::new(specs, console, event_tx.clone());

    spawn_stdin_listener(event_tx.clone());
    spawn_signal_listener(event_tx);

    Ok(supervisor.run(event_rx).await)
}

fn report_config_error(err: &ConfigError) {
    match err {
        ConfigError::Load(err) => eprintln!("error: {:#}", err),
        ConfigError::InvalidEntries(entries) => {
            for entry in entries {
                eprintln!("error: {}", entry);
            }
            eprintln!("error: {}; nothing was started", err);
        }
    }
}

fn spawn_stdin_listener(tx: mpsc::Sender<Event>) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut reader = stdin.lock();
        let mut buffer = Vec::new();
        loop {
            buffer.clear();
            match reader.read_until(b'\n', &mut buffer) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buffer).into_owned();
                    if tx.blocking_send(Event::Input(line)).is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!(error = %err, "failed to read stdin");
                    break;
                }
            }
        }
        debug!("stdin reader finished");
        let _ = tx.blocking_send(Event::InputClosed);
    });
}

fn spawn_signal_listener(tx: mpsc::Sender<Event>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = match signal(SignalKind::terminate()) {
                Ok(signal) => signal,
                Err(err) => {
                    warn!(error = %err, "cannot listen for SIGTERM");
                    return;
                }
            };
            loop {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
                if tx.send(Event::Shutdown).await.is_err() {
                    return;
                }
            }
        }
        #[cfg(not(unix))]
        {
            while tokio::signal::ctrl_c().await.is_ok() {
                if tx.send(Event::Shutdown).await.is_err() {
                    return;
                }
            }
        }
    });
}

fn help_styles() -> Styles {
    Styles::styled()
        .header(
            Style::new()
                .fg_color(Some(AnsiColor::Cyan.into()))
                .effects(Effects::BOLD),
        )
        .usage(
            Style::new()
                .fg_color(Some(AnsiColor::Green.into()))
                .effects(Effects::BOLD),
        )
        .literal(Style::new().fg_color(Some(AnsiColor::Yellow.into())))
        .placeholder(Style::new().fg_color(Some(AnsiColor::Magenta.into())))
}
