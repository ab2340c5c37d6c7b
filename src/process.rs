//! Data structures for tracking supervised processes.
//!
//! A `ProcessSpec` is the immutable description of one configured command, and a
//! `ProcessEntry` wraps it with the runtime state the lifecycle transitions mutate.

use std::collections::HashMap;

use crossterm::style::Color;

use crate::output::LineBuffer;
use crate::runner::ChildHandle;

/// Specification for a process to be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSpec {
    /// Unique name, as declared in the config file.
    pub name: String,
    /// The command executable.
    pub cmd: String,
    /// Arguments for the command.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: Option<String>,
    /// Palette color pinned in the config, if any.
    pub color: Option<String>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
}

impl ProcessSpec {
    /// Renders the command line the way a shell user would type it.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(1 + self.args.len());
        parts.push(self.cmd.clone());
        parts.extend(self.args.iter().cloned());
        shell_words::join(parts)
    }
}

/// The lifecycle status of a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    /// Not running; either never started or stopped by the operator.
    Stopped,
    /// A child is alive.
    Running,
    /// Spawn failed, or the child exited non-zero on its own.
    Failed,
    /// The child exited successfully on its own.
    Completed,
}

impl ProcessStatus {
    pub fn label(self) -> &'static str {
        match self {
            ProcessStatus::Stopped => "stopped",
            ProcessStatus::Running => "running",
            ProcessStatus::Failed => "failed",
            ProcessStatus::Completed => "completed",
        }
    }
}

/// Runtime state of one configured command.
#[derive(Debug)]
pub struct ProcessEntry {
    pub spec: ProcessSpec,
    /// Name padded to the longest configured name.
    pub display_name: String,
    pub color: Color,
    /// Control handle of the live child. Present exactly while `Running`.
    pub handle: Option<ChildHandle>,
    pub status: ProcessStatus,
    /// An operator stop is in flight.
    pub stopping: bool,
    /// Respawn once the current child has exited.
    pub restart: bool,
    pub stdout: LineBuffer,
    pub stderr: LineBuffer,
}

impl ProcessEntry {
    pub fn new(spec: ProcessSpec, width: usize, color: Color) -> Self {
        let display_name = format!("{:<width$}", spec.name, width = width);
        Self {
            spec,
            display_name,
            color,
            handle: None,
            status: ProcessStatus::Stopped,
            stopping: false,
            restart: false,
            stdout: LineBuffer::default(),
            stderr: LineBuffer::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }
}

#[cfg(test)]
pub(crate) fn spec(name: &str, cmd: &str, args: &[&str]) -> ProcessSpec {
    ProcessSpec {
        name: name.to_string(),
        cmd: cmd.to_string(),
        args: args.iter().map(|arg| arg.to_string()).collect(),
        cwd: None,
        color: None,
        env: HashMap::new(),
    }
}
