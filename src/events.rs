//! Event definitions for the supervisor's event loop.
//!
//! Child readers, child waiters, the stdin reader and the signal listener all feed one
//! queue. The supervisor handles one event completely before taking the next, so the
//! registry is only ever mutated from one place.

use crate::output::StreamKind;

/// How a run of a child process came to an end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    /// The child exited. `None` means it was ended by a signal.
    Exited(Option<i32>),
    /// Waiting on the child failed, so its fate is unknown.
    Lost(String),
}

/// Represents an event in the supervisor's main event loop.
#[derive(Debug, Clone)]
pub enum Event {
    /// Raw bytes read from one of a child's output pipes.
    ProcessOutput {
        id: usize,
        stream: StreamKind,
        chunk: Vec<u8>,
    },
    /// A child ended. Sent after both of its pipes reached EOF.
    ProcessEnded { id: usize, end: RunEnd },
    /// One line typed by the operator.
    Input(String),
    /// The operator's input stream closed.
    InputClosed,
    /// The supervisor itself was asked to terminate (Ctrl-C, SIGTERM).
    Shutdown,
}
