//! Diagnostic logging via `tracing` + `tracing-subscriber`.
//!
//! The filter comes from `--log-level` when given, else from `RUNBOARD_LOG` (any
//! `EnvFilter` directive, e.g. `debug` or `runboard=trace`), else `warn` so the
//! interactive console stays quiet. Diagnostics go to stderr.

use tracing_subscriber::EnvFilter;

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "RUNBOARD_LOG";

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Installs the global subscriber. Call once, before anything logs.
pub fn init_logging(cli_level: Option<LogLevel>) {
    let filter = build_filter(cli_level, std::env::var(LOG_ENV).ok().as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Flag first, then a valid environment directive, then `warn`.
fn build_filter(cli_level: Option<LogLevel>, env: Option<&str>) -> EnvFilter {
    if let Some(level) = cli_level {
        return EnvFilter::new(level.directive());
    }
    env.and_then(|raw| EnvFilter::try_new(raw.trim()).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn flag_beats_environment() {
        let filter = build_filter(Some(LogLevel::Debug), Some("error"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));
    }

    #[test]
    fn environment_directive_is_used_without_flag() {
        let filter = build_filter(None, Some(" trace "));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::TRACE));
    }

    #[test]
    fn invalid_or_missing_environment_falls_back_to_warn() {
        for env in [None, Some("web=verbose")] {
            let filter = build_filter(None, env);
            assert_eq!(filter.max_level_hint(), Some(LevelFilter::WARN), "{:?}", env);
        }
    }
}
