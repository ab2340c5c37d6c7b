//! Process supervision.
//!
//! The `Registry` owns every `ProcessEntry` and is the only place their fields change:
//! `start`, `stop`, `restart` and the two event handlers `on_output`/`on_end`. The
//! `Supervisor` drains the event queue one event at a time, opening one console scope
//! per event, and asks the `Shutdown` coordinator whether a global quit has finished.

use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::command::{self, Action, Command};
use crate::console::{Console, ConsoleScope};
use crate::events::{Event, RunEnd};
use crate::output::{line_text, StreamKind};
use crate::palette::{status_style, ColorAllocator};
use crate::process::{ProcessEntry, ProcessSpec, ProcessStatus};
use crate::runner;

const BULLET: &str = "\u{2022}";

/// What the event loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(i32),
}

/// All configured entries, in configuration order.
pub struct Registry {
    entries: IndexMap<String, ProcessEntry>,
    event_tx: mpsc::Sender<Event>,
}

impl Registry {
    pub fn new(specs: Vec<ProcessSpec>, event_tx: mpsc::Sender<Event>) -> Self {
        let width = specs
            .iter()
            .map(|spec| spec.name.chars().count())
            .max()
            .unwrap_or(0);
        let mut colors = ColorAllocator::new();
        let mut entries = IndexMap::with_capacity(specs.len());
        for spec in specs {
            let (color, rejected) = colors.assign(spec.color.as_deref());
            if let Some(pinned) = rejected {
                warn!(process = %spec.name, color = %pinned, "not a palette color; picking one");
            }
            entries.insert(spec.name.clone(), ProcessEntry::new(spec, width, color));
        }
        debug!(counts = ?colors.counts(), "colors assigned");
        Self { entries, event_tx }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn by_name(&self, name: &str) -> Option<&ProcessEntry> {
        self.entries.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProcessEntry> {
        self.entries.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    /// Whether no entry has a live child.
    pub fn all_stopped(&self) -> bool {
        self.entries.values().all(|entry| !entry.is_running())
    }

    fn running_ids(&self) -> Vec<usize> {
        self.entries
            .values()
            .enumerate()
            .filter(|(_, entry)| entry.is_running())
            .map(|(id, _)| id)
            .collect()
    }

    fn label(out: &ConsoleScope<'_>, entry: &ProcessEntry) -> String {
        out.paint(entry.name(), Some(entry.color), false)
    }

    /// Runs one control action against one entry.
    pub fn apply(&mut self, action: Action, id: usize, out: &mut ConsoleScope<'_>) {
        match action {
            Action::Start => self.start(id, out, true),
            Action::Stop => self.stop(id, out),
            Action::Restart => self.restart(id, out),
        }
    }

    /// Spawns the entry's command unless a child is already alive.
    ///
    /// `announce` prints the "Starting" banner; respawns after a restart are quiet.
    pub fn start(&mut self, id: usize, out: &mut ConsoleScope<'_>, announce: bool) {
        let Some((_, entry)) = self.entries.get_index_mut(id) else {
            return;
        };
        let name = Self::label(out, entry);
        if entry.is_running() {
            out.line(format_args!("{} is already running.", name));
            return;
        }
        if announce {
            out.line(format_args!("Starting {}...", name));
        }
        entry.stdout.clear();
        entry.stderr.clear();
        entry.stopping = false;
        entry.restart = false;
        match runner::spawn(id, &entry.spec, self.event_tx.clone()) {
            Ok(handle) => {
                info!(process = %entry.spec.name, pid = ?handle.pid(), "started");
                entry.handle = Some(handle);
                entry.status = ProcessStatus::Running;
            }
            Err(err) => {
                debug!(process = %entry.spec.name, error = %err, "spawn failed");
                entry.status = ProcessStatus::Failed;
                out.error_line(format_args!(
                    "Could not start {} ({}):",
                    name,
                    entry.spec.command_line()
                ));
                out.error_line(err);
            }
        }
    }

    /// Requests termination of a live child; the exit event completes the stop.
    pub fn stop(&mut self, id: usize, out: &mut ConsoleScope<'_>) {
        let Some((_, entry)) = self.entries.get_index_mut(id) else {
            return;
        };
        let name = Self::label(out, entry);
        let Some(handle) = &entry.handle else {
            out.line(format_args!("{} is not running.", name));
            return;
        };
        out.line(format_args!("Stopping {}...", name));
        debug!(process = %entry.spec.name, "stop requested");
        handle.request_termination();
        entry.stopping = true;
        entry.restart = false;
    }

    /// Terminates and respawns a live child, or starts an idle entry.
    pub fn restart(&mut self, id: usize, out: &mut ConsoleScope<'_>) {
        let Some((_, entry)) = self.entries.get_index_mut(id) else {
            return;
        };
        match &entry.handle {
            Some(handle) => {
                out.line(format_args!("Restarting {}...", Self::label(out, entry)));
                debug!(process = %entry.spec.name, "restart requested");
                handle.request_termination();
                entry.restart = true;
            }
            None => self.start(id, out, true),
        }
    }

    /// Renders every line completed by `chunk`.
    pub fn on_output(
        &mut self,
        id: usize,
        stream: StreamKind,
        chunk: &[u8],
        out: &mut ConsoleScope<'_>,
    ) {
        let Some((_, entry)) = self.entries.get_index_mut(id) else {
            return;
        };
        let lines = match stream {
            StreamKind::Stdout => entry.stdout.push(chunk),
            StreamKind::Stderr => entry.stderr.push(chunk),
        };
        for line in lines {
            out.process_line(&entry.display_name, entry.color, stream, &line_text(&line));
        }
    }

    /// Applies an exit: settles the status, then respawns if a restart is pending.
    pub fn on_end(&mut self, id: usize, end: RunEnd, out: &mut ConsoleScope<'_>) {
        let Some((_, entry)) = self.entries.get_index_mut(id) else {
            return;
        };
        for (stream, rest) in [
            (StreamKind::Stdout, entry.stdout.flush()),
            (StreamKind::Stderr, entry.stderr.flush()),
        ] {
            if let Some(rest) = rest {
                out.process_line(&entry.display_name, entry.color, stream, &line_text(&rest));
            }
        }

        entry.handle = None;
        let name = Self::label(out, entry);
        if entry.stopping {
            entry.stopping = false;
            entry.status = ProcessStatus::Stopped;
        } else {
            entry.status = match end {
                RunEnd::Exited(None) | RunEnd::Exited(Some(0)) => ProcessStatus::Completed,
                RunEnd::Exited(Some(code)) => {
                    out.error_line(format_args!("{} exited with errors (code {})", name, code));
                    ProcessStatus::Failed
                }
                RunEnd::Lost(error) => {
                    out.error_line(format_args!("Lost track of {}: {}", name, error));
                    ProcessStatus::Failed
                }
            };
        }
        info!(process = %entry.spec.name, status = entry.status.label(), "ended");

        if entry.restart {
            entry.restart = false;
            self.start(id, out, false);
        }
    }

    pub fn print_status(&self, out: &mut ConsoleScope<'_>) {
        out.line("Process status:");
        for entry in self.iter() {
            let (color, bold) = status_style(entry.status);
            out.line(format_args!(
                " {} {} {}",
                out.paint(BULLET, Some(color), bold),
                out.paint(&entry.display_name, Some(entry.color), false),
                out.paint(entry.status.label(), Some(color), bold),
            ));
        }
    }

    pub fn print_help(&self, out: &mut ConsoleScope<'_>) {
        let actions = Action::ALL.map(Action::keyword).join("|");
        out.line("Control commands (the action may come first or last):");
        out.line(format_args!("  <{}> <name|all|*>", actions));
        out.line("Other commands:");
        out.line("  status   show the state of every process");
        out.line("  help     show this help");
        out.line("  quit     stop every process and exit");
        out.line("Processes:");
        for entry in self.iter() {
            out.line(format_args!(
                "  {}  {}",
                out.paint(&entry.display_name, Some(entry.color), false),
                entry.spec.command_line()
            ));
        }
    }
}

/// Global quit coordination.
#[derive(Debug, Default)]
pub struct Shutdown {
    in_progress: bool,
}

impl Shutdown {
    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Stops every running entry. Exits right away when nothing is running.
    pub fn begin(&mut self, registry: &mut Registry, out: &mut ConsoleScope<'_>) -> Flow {
        if !self.in_progress {
            info!("quit requested");
        }
        self.in_progress = true;
        for id in registry.running_ids() {
            registry.stop(id, out);
        }
        self.progress(registry)
    }

    /// Exits once a quit is underway and the last child is gone.
    pub fn progress(&self, registry: &Registry) -> Flow {
        if self.in_progress && registry.all_stopped() {
            info!("all processes stopped");
            Flow::Exit(0)
        } else {
            Flow::Continue
        }
    }
}

/// Owner of the registry, the console and the shutdown state.
pub struct Supervisor {
    registry: Registry,
    console: Console,
    shutdown: Shutdown,
}

impl Supervisor {
    pub fn new(specs: Vec<ProcessSpec>, console: Console, event_tx: mpsc::Sender<Event>) -> Self {
        Self {
            registry: Registry::new(specs, event_tx),
            console,
            shutdown: Shutdown::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Launches every entry, in configuration order.
    pub fn start_all(&mut self) {
        for id in 0..self.registry.len() {
            let mut out = self.console.scope();
            self.registry.start(id, &mut out, true);
        }
    }

    /// Starts everything and processes events until a quit completes.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) -> i32 {
        self.start_all();
        while let Some(event) = events.recv().await {
            if let Flow::Exit(code) = self.handle_event(event) {
                return code;
            }
        }
        0
    }

    /// Handles one event to completion.
    pub fn handle_event(&mut self, event: Event) -> Flow {
        if let Event::InputClosed = event {
            debug!("operator input closed");
            return Flow::Continue;
        }
        let Self {
            registry,
            console,
            shutdown,
        } = self;
        let flow = {
            let mut out = console.scope();
            match event {
                Event::ProcessOutput { id, stream, chunk } => {
                    registry.on_output(id, stream, &chunk, &mut out);
                    Flow::Continue
                }
                Event::ProcessEnded { id, end } => {
                    registry.on_end(id, end, &mut out);
                    shutdown.progress(registry)
                }
                Event::Input(line) => execute(registry, shutdown, &line, &mut out),
                Event::Shutdown => shutdown.begin(registry, &mut out),
                Event::InputClosed => Flow::Continue,
            }
        };
        if let Flow::Exit(_) = flow {
            console.finish();
        }
        flow
    }
}

fn execute(
    registry: &mut Registry,
    shutdown: &mut Shutdown,
    line: &str,
    out: &mut ConsoleScope<'_>,
) -> Flow {
    let parsed = {
        let names = registry.names();
        command::parse(line, &names)
    };
    let command = match parsed {
        Ok(command) => command,
        Err(unknown) => {
            debug!(input = %unknown.input, "unknown command");
            out.error_line(unknown);
            return Flow::Continue;
        }
    };
    match command {
        Command::Empty => Flow::Continue,
        Command::Quit => shutdown.begin(registry, out),
        Command::Status => {
            registry.print_status(out);
            Flow::Continue
        }
        Command::Help => {
            registry.print_help(out);
            Flow::Continue
        }
        Command::Control { action, targets } => {
            if shutdown.in_progress() && action != Action::Stop {
                out.line(format_args!(
                    "Shutting down; ignoring `{}`.",
                    command::clean_input(line)
                ));
                return Flow::Continue;
            }
            for id in targets {
                registry.apply(action, id, out);
            }
            Flow::Continue
        }
    }
}
