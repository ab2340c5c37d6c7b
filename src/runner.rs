//! Spawning child processes and bridging them to the event loop.
//!
//! Each run gets two reader tasks (stdout, stderr) that forward raw chunks, and one
//! waiter task that owns the child, delivers termination requests to it, and reports
//! the exit once both readers have drained their pipes.

use std::process::Stdio;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tracing::debug;

use crate::events::{Event, RunEnd};
use crate::output::StreamKind;
use crate::process::ProcessSpec;

const READ_CHUNK: usize = 8 * 1024;

/// Control side of a live child. Dropping it does not affect the child.
#[derive(Debug)]
pub struct ChildHandle {
    pid: Option<u32>,
    terminate_tx: mpsc::UnboundedSender<()>,
}

impl ChildHandle {
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Asks the child to terminate. Does not wait; the exit arrives as an event.
    pub fn request_termination(&self) {
        if self.terminate_tx.send(()).is_err() {
            debug!(pid = ?self.pid, "termination requested after waiter finished");
        }
    }
}

/// Spawns `spec` and wires its output and exit into `event_tx` under `id`.
///
/// Fails only when the OS refuses to start the command.
pub fn spawn(
    id: usize,
    spec: &ProcessSpec,
    event_tx: mpsc::Sender<Event>,
) -> std::io::Result<ChildHandle> {
    let mut command = Command::new(&spec.cmd);
    command.args(&spec.args);
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }
    if !spec.env.is_empty() {
        command.envs(&spec.env);
    }
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    command.kill_on_drop(true);

    let mut child = command.spawn()?;
    let pid = child.id();
    debug!(process = %spec.name, ?pid, "spawned");

    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        let tx = event_tx.clone();
        readers.push(tokio::spawn(read_stream(id, StreamKind::Stdout, stdout, tx)));
    }
    if let Some(stderr) = child.stderr.take() {
        let tx = event_tx.clone();
        readers.push(tokio::spawn(read_stream(id, StreamKind::Stderr, stderr, tx)));
    }

    let (terminate_tx, terminate_rx) = mpsc::unbounded_channel();
    let name = spec.name.clone();
    tokio::spawn(async move {
        let end = wait_child(&name, &mut child, terminate_rx).await;
        for reader in readers {
            let _ = reader.await;
        }
        debug!(process = %name, ?end, "run ended");
        let _ = event_tx.send(Event::ProcessEnded { id, end }).await;
    });

    Ok(ChildHandle { pid, terminate_tx })
}

async fn wait_child(
    name: &str,
    child: &mut Child,
    mut terminate_rx: mpsc::UnboundedReceiver<()>,
) -> RunEnd {
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            Some(()) = terminate_rx.recv() => terminate(name, child),
        }
    };
    match status {
        Ok(status) => RunEnd::Exited(status.code()),
        Err(err) => {
            debug!(process = %name, error = %err, "failed to wait on child");
            RunEnd::Lost(err.to_string())
        }
    }
}

#[cfg(unix)]
fn terminate(name: &str, child: &mut Child) {
    // id() is None once the child has been reaped, so the pid cannot be stale here.
    match child.id() {
        Some(pid) => {
            debug!(process = %name, pid, "sending SIGTERM");
            unsafe {
                let _ = libc::kill(pid as i32, libc::SIGTERM);
            }
        }
        None => debug!(process = %name, "child already reaped"),
    }
}

#[cfg(not(unix))]
fn terminate(name: &str, child: &mut Child) {
    debug!(process = %name, "killing child");
    if let Err(err) = child.start_kill() {
        debug!(process = %name, error = %err, "failed to kill child");
    }
}

async fn read_stream<R>(id: usize, stream: StreamKind, mut reader: R, tx: mpsc::Sender<Event>)
where
    R: AsyncRead + Unpin,
{
    let mut buffer = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buffer).await {
            Ok(0) => break,
            Ok(n) => {
                let chunk = buffer[..n].to_vec();
                if tx
                    .send(Event::ProcessOutput { id, stream, chunk })
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(err) => {
                debug!(id, ?stream, error = %err, "read failed");
                break;
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::spec;

    async fn collect(rx: &mut mpsc::Receiver<Event>) -> (Vec<u8>, Vec<u8>, RunEnd) {
        let mut out = Vec::new();
        let mut err = Vec::new();
        loop {
            match rx.recv().await.expect("event") {
                Event::ProcessOutput { stream, chunk, .. } => match stream {
                    StreamKind::Stdout => out.extend(chunk),
                    StreamKind::Stderr => err.extend(chunk),
                },
                Event::ProcessEnded { end, .. } => return (out, err, end),
                other => panic!("unexpected event {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn output_arrives_before_exit() {
        let (tx, mut rx) = mpsc::channel(16);
        let spec = spec("sh", "sh", &["-c", "printf 'a\\nb'; printf oops >&2; exit 3"]);
        let handle = spawn(7, &spec, tx).unwrap();
        assert!(handle.pid().is_some());
        let (out, err, end) = collect(&mut rx).await;
        assert_eq!(out, b"a\nb");
        assert_eq!(err, b"oops");
        assert_eq!(end, RunEnd::Exited(Some(3)));
    }

    #[tokio::test]
    async fn termination_request_ends_child() {
        let (tx, mut rx) = mpsc::channel(16);
        let handle = spawn(0, &spec("sleep", "sleep", &["30"]), tx).unwrap();
        handle.request_termination();
        let (_, _, end) = collect(&mut rx).await;
        assert_eq!(end, RunEnd::Exited(None));
    }

    #[tokio::test]
    async fn missing_executable_fails_to_spawn() {
        let (tx, _rx) = mpsc::channel(16);
        let result = spawn(0, &spec("nope", "definitely-not-a-real-binary-xyz", &[]), tx);
        assert!(result.is_err());
    }
}
