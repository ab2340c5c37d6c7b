//! The shared console: process output, replies and the input prompt.
//!
//! Everything that reaches the terminal goes through a [`ConsoleScope`]. Opening a
//! scope erases the prompt if it is on screen; dropping it draws the prompt again,
//! whether the body finished normally, returned early or unwound. Output from
//! different processes therefore never lands in the middle of a half-drawn prompt.

use std::fmt::Display;
use std::io::{self, Write};

use crossterm::cursor::MoveToColumn;
use crossterm::queue;
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{Clear, ClearType};
use strip_ansi_escapes::strip;
use tracing::debug;

use crate::output::StreamKind;

/// Anything the console can write to.
pub type Sink = Box<dyn Write + Send>;

/// Owner of the output and error sinks.
pub struct Console {
    out: Sink,
    err: Sink,
    prompt: String,
    prompt_width: usize,
    /// Width of the prompt currently on screen, 0 when none is shown.
    shown: usize,
    styled: bool,
}

impl Console {
    pub fn new(out: Sink, err: Sink, prompt: &str, styled: bool) -> Self {
        let mut console = Self {
            out,
            err,
            prompt: String::new(),
            prompt_width: 0,
            shown: 0,
            styled,
        };
        if !prompt.is_empty() {
            console.prompt = format!("{} {} ", prompt, console.paint(">", None, true));
            console.prompt_width = visible_width(&console.prompt);
        }
        console
    }

    /// Console on the supervisor's own stdout/stderr.
    pub fn stdio(prompt: &str, styled: bool) -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::stderr()), prompt, styled)
    }

    /// Opens a write region. The prompt is erased now and redrawn when the scope drops.
    pub fn scope(&mut self) -> ConsoleScope<'_> {
        if let Err(err) = self.erase_prompt() {
            debug!(error = %err, "failed to erase prompt");
        }
        ConsoleScope { console: self }
    }

    /// Leaves the last prompt in place and moves the terminal to a fresh line.
    pub fn finish(&mut self) {
        let result = writeln!(self.out).and_then(|()| self.out.flush());
        log_write_error(result, "final newline");
        self.shown = 0;
    }

    /// Applies color and weight, or returns the plain text when styling is off.
    pub fn paint(&self, text: &str, color: Option<Color>, bold: bool) -> String {
        if !self.styled {
            return text.to_string();
        }
        let mut content = text.stylize();
        if let Some(color) = color {
            content = content.with(color);
        }
        if bold {
            content = content.bold();
        }
        content.to_string()
    }

    fn erase_prompt(&mut self) -> io::Result<()> {
        if self.shown > 0 {
            queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
            self.shown = 0;
        }
        Ok(())
    }

    fn draw_prompt(&mut self) -> io::Result<()> {
        if self.prompt_width > 0 && self.shown == 0 {
            self.out.write_all(self.prompt.as_bytes())?;
            self.shown = self.prompt_width;
        }
        self.out.flush()
    }
}

/// A guarded batch of console writes.
pub struct ConsoleScope<'a> {
    console: &'a mut Console,
}

impl ConsoleScope<'_> {
    pub fn line(&mut self, text: impl Display) {
        log_write_error(writeln!(self.console.out, "{}", text), "stdout line");
    }

    /// Writes to the error sink after flushing stdout, so the two stay in order.
    pub fn error_line(&mut self, text: impl Display) {
        let console = &mut *self.console;
        log_write_error(console.out.flush(), "stdout flush");
        let result = writeln!(console.err, "{}", text).and_then(|()| console.err.flush());
        log_write_error(result, "stderr line");
    }

    /// Writes one line of child output behind the entry's label.
    ///
    /// Stderr lines keep the separator in the entry color but show the name in red.
    pub fn process_line(&mut self, label: &str, color: Color, stream: StreamKind, text: &str) {
        let name_color = match stream {
            StreamKind::Stdout => color,
            StreamKind::Stderr => Color::Red,
        };
        let name = self.paint(label, Some(name_color), false);
        let separator = self.paint("|", Some(color), true);
        self.line(format_args!("{} {} {}", name, separator, text));
    }

    pub fn paint(&self, text: &str, color: Option<Color>, bold: bool) -> String {
        self.console.paint(text, color, bold)
    }
}

impl Drop for ConsoleScope<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.console.draw_prompt() {
            debug!(error = %err, "failed to draw prompt");
        }
    }
}

// Write errors are never fatal; they are only traced.
fn log_write_error(result: io::Result<()>, what: &str) {
    if let Err(err) = result {
        debug!(error = %err, what, "console write failed");
    }
}

fn visible_width(text: &str) -> usize {
    String::from_utf8_lossy(&strip(text.as_bytes())).chars().count()
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// In-memory sink that can be inspected while the console still owns a clone.
    #[derive(Clone, Default)]
    pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn raw(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }

        /// Contents with escapes stripped and every prompt removed.
        pub fn visible(&self, prompt: &str) -> String {
            let bytes = self.0.lock().unwrap().clone();
            let text = String::from_utf8_lossy(&strip(bytes)).into_owned();
            if prompt.is_empty() {
                text
            } else {
                text.replace(&format!("{} > ", prompt), "")
            }
        }

        pub fn lines(&self, prompt: &str) -> Vec<String> {
            self.visible(prompt).lines().map(str::to_string).collect()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Console writing stdout and stderr into one buffer, in write order.
    pub fn console(prompt: &str, styled: bool) -> (Console, SharedBuffer) {
        let buffer = SharedBuffer::default();
        let console = Console::new(
            Box::new(buffer.clone()),
            Box::new(buffer.clone()),
            prompt,
            styled,
        );
        (console, buffer)
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, AssertUnwindSafe};

    use super::testing::{console, SharedBuffer};
    use super::*;

    #[test]
    fn prompt_drawn_after_each_scope() {
        let (mut console, buffer) = console("run", false);
        console.scope().line("first");
        console.scope().line("second");
        assert_eq!(buffer.visible(""), "first\nrun > second\nrun > ");
    }

    #[test]
    fn prompt_erased_before_writes() {
        let (mut console, buffer) = console("run", false);
        drop(console.scope());
        console.scope().line("out");
        let raw = buffer.raw();
        let erase = raw.find("\u{1b}[").expect("erase sequence");
        assert!(erase > raw.find("run > ").unwrap());
        assert!(erase < raw.find("out").unwrap());
    }

    #[test]
    fn prompt_not_erased_when_absent() {
        let (mut console, buffer) = console("", false);
        console.scope().line("plain");
        assert_eq!(buffer.raw(), "plain\n");
    }

    #[test]
    fn prompt_redrawn_when_body_panics() {
        let (mut console, buffer) = console("run", false);
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut out = console.scope();
            out.line("partial");
            panic!("write body failed");
        }));
        assert!(result.is_err());
        assert_eq!(buffer.visible(""), "partial\nrun > ");
    }

    #[test]
    fn one_prompt_per_scope_with_mixed_streams() {
        let (mut console, buffer) = console("run", false);
        {
            let mut out = console.scope();
            out.line("a");
            out.error_line("b");
        }
        assert_eq!(buffer.visible("").matches("run > ").count(), 1);
    }

    #[test]
    fn finish_leaves_prompt_on_its_own_line() {
        let (mut console, buffer) = console("run", false);
        drop(console.scope());
        console.finish();
        assert_eq!(buffer.visible(""), "run > \n");
    }

    #[test]
    fn process_line_layout() {
        let (mut console, buffer) = console("", true);
        console
            .scope()
            .process_line("web ", Color::Cyan, StreamKind::Stdout, "listening");
        assert_eq!(buffer.visible(""), "web  | listening\n");
        assert!(buffer.raw().contains('\u{1b}'));
    }

    struct ClosedSink;

    impl Write for ClosedSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn closed_stdout_is_survived() {
        let errors = SharedBuffer::default();
        let mut console = Console::new(Box::new(ClosedSink), Box::new(errors.clone()), "run", false);
        {
            let mut out = console.scope();
            out.line("lost");
            out.error_line("still here");
        }
        console.finish();
        assert_eq!(errors.raw(), "still here\n");
    }

    #[test]
    fn unstyled_console_emits_no_escapes() {
        let (mut console, buffer) = console("", false);
        console
            .scope()
            .process_line("web", Color::Cyan, StreamKind::Stderr, "oops");
        assert_eq!(buffer.raw(), "web | oops\n");
    }
}
