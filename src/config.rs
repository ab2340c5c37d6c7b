//! Configuration management for runboard.
//!
//! This module defines the structure of the `runboard.toml` configuration file,
//! loads it, and turns each entry into a validated `ProcessSpec`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::process::ProcessSpec;

/// Name of the config file looked up in the working directory.
pub const DEFAULT_CONFIG: &str = "runboard.toml";

/// Top-level configuration structure corresponding to `runboard.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Processes to supervise, keyed by name, in declaration order.
    ///
    /// Entries stay raw until `build_specs` so that a bad entry is reported on its own.
    #[serde(rename = "process", default)]
    pub processes: IndexMap<String, toml::Value>,
}

/// Configuration for a single process.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessConfig {
    /// Command to execute.
    pub command: Option<CommandLine>,
    /// Palette color for the process label.
    pub color: Option<String>,
    /// Working directory for the process.
    pub cwd: Option<String>,
    /// Environment variables to set for the process.
    pub env: Option<HashMap<String, String>>,
}

/// The two accepted spellings of a command.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CommandLine {
    /// `command = "npm run dev"`, split with shell quoting rules.
    Shell(String),
    /// `command = ["npm", "run", "dev"]`, executable first.
    Argv(Vec<String>),
}

impl CommandLine {
    fn split(&self) -> Result<(String, Vec<String>), String> {
        let mut parts = match self {
            CommandLine::Shell(line) => {
                shell_words::split(line).map_err(|err| format!("cannot parse command: {}", err))?
            }
            CommandLine::Argv(parts) => parts.clone(),
        };
        if parts.is_empty() || parts[0].is_empty() {
            return Err("command is empty".to_string());
        }
        let cmd = parts.remove(0);
        Ok((cmd, parts))
    }
}

/// Why configuration could not produce a process list.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Nothing usable was supplied: missing, unreadable or malformed file.
    #[error(transparent)]
    Load(#[from] anyhow::Error),
    /// The file parsed, but some entries are unusable.
    #[error("configuration has {} invalid process entries", .0.len())]
    InvalidEntries(Vec<EntryError>),
}

impl ConfigError {
    pub fn exit_code(&self) -> i32 {
        match self {
            ConfigError::Load(_) => 1,
            ConfigError::InvalidEntries(_) => 2,
        }
    }
}

/// A single unusable entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("process '{name}': {reason}")]
pub struct EntryError {
    pub name: String,
    pub reason: String,
}

/// Picks the config file: an explicit path, else `runboard.toml` if present.
pub fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    let path = Path::new(DEFAULT_CONFIG);
    if path.exists() {
        Ok(path.to_path_buf())
    } else {
        Err(ConfigError::Load(anyhow!(
            "no configuration found (pass --config or create {})",
            DEFAULT_CONFIG
        )))
    }
}

/// Loads and parses the configuration from a file path.
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    parse_config(&raw).with_context(|| format!("failed to parse config file {}", path.display()))
}

pub fn parse_config(raw: &str) -> anyhow::Result<Config> {
    Ok(toml::from_str(raw)?)
}

/// Validates every entry and builds the specs, in declaration order.
///
/// All invalid entries are reported together; no spec is returned if any is invalid.
pub fn build_specs(config: Config) -> Result<Vec<ProcessSpec>, ConfigError> {
    if config.processes.is_empty() {
        return Err(ConfigError::Load(anyhow!("no processes defined")));
    }
    let mut specs = Vec::with_capacity(config.processes.len());
    let mut errors = Vec::new();
    for (name, value) in config.processes {
        let process = match value.try_into::<ProcessConfig>() {
            Ok(process) => process,
            Err(err) => {
                errors.push(EntryError {
                    name,
                    reason: err.message().to_string(),
                });
                continue;
            }
        };
        let Some(command) = &process.command else {
            errors.push(EntryError {
                name,
                reason: "missing `command`".to_string(),
            });
            continue;
        };
        match command.split() {
            Ok((cmd, args)) => specs.push(ProcessSpec {
                name,
                cmd,
                args,
                cwd: process.cwd,
                color: process.color,
                env: process.env.unwrap_or_default(),
            }),
            Err(reason) => errors.push(EntryError { name, reason }),
        }
    }
    if errors.is_empty() {
        Ok(specs)
    } else {
        Err(ConfigError::InvalidEntries(errors))
    }
}

/// Full path from an optional file location to validated specs.
pub fn load_specs(explicit: Option<&Path>) -> Result<Vec<ProcessSpec>, ConfigError> {
    let path = resolve_path(explicit)?;
    let config = load_config(&path)?;
    build_specs(config)
}
