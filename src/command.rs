//! Operator command grammar.
//!
//! A line is cleaned (control characters removed, whitespace trimmed) and split on
//! whitespace. One token is a global command; two tokens are a control action and a
//! target, in either order. Everything else is rejected with the cleaned input echoed.

use thiserror::Error;

/// Per-entry control actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Start,
    Stop,
    Restart,
}

impl Action {
    pub const ALL: [Action; 3] = [Action::Start, Action::Stop, Action::Restart];

    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "start" => Some(Action::Start),
            "stop" => Some(Action::Stop),
            "restart" => Some(Action::Restart),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            Action::Start => "start",
            Action::Stop => "stop",
            Action::Restart => "restart",
        }
    }
}

/// A parsed operator command. Targets are registry indices, in registry order for
/// `all`/`*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Quit,
    Status,
    Help,
    Control { action: Action, targets: Vec<usize> },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown command: {input}")]
pub struct UnknownCommand {
    pub input: String,
}

/// Removes control characters and surrounding whitespace.
pub fn clean_input(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parses one input line against the configured entry `names`.
pub fn parse(raw: &str, names: &[&str]) -> Result<Command, UnknownCommand> {
    let input = clean_input(raw);
    let tokens = input.split_whitespace().collect::<Vec<_>>();
    let parsed = match tokens.as_slice() {
        [] => Some(Command::Empty),
        [single] => parse_global(single),
        [first, second] => parse_control(first, second, names),
        _ => None,
    };
    parsed.ok_or(UnknownCommand { input })
}

fn parse_global(token: &str) -> Option<Command> {
    match token {
        "quit" | "q" => Some(Command::Quit),
        "status" | "s" => Some(Command::Status),
        "help" | "h" | "?" => Some(Command::Help),
        _ => None,
    }
}

fn parse_control(first: &str, second: &str, names: &[&str]) -> Option<Command> {
    let (action, target) = match (Action::parse(first), Action::parse(second)) {
        (Some(action), None) => (action, second),
        (None, Some(action)) => (action, first),
        _ => return None,
    };
    let targets = resolve_target(target, names)?;
    Some(Command::Control { action, targets })
}

fn resolve_target(target: &str, names: &[&str]) -> Option<Vec<usize>> {
    if target == "all" || target == "*" {
        return Some((0..names.len()).collect());
    }
    names
        .iter()
        .position(|name| *name == target)
        .map(|index| vec![index])
}
