//! Reassembly of raw process output into lines.
//!
//! Pipes hand us chunks of arbitrary size. `LineBuffer` holds the unterminated tail of
//! one stream between chunks so that every emitted line is exactly one `\n`-terminated
//! record of the child's output.

/// Indicates the source stream of a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Standard Output.
    Stdout,
    /// Standard Error.
    Stderr,
}

/// Partial-line accumulator for a single stream of a single run.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    partial: Vec<u8>,
}

impl LineBuffer {
    /// Feeds a chunk and returns every line it completed, without terminators.
    ///
    /// Bytes after the last `\n` are kept until a later chunk terminates them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        let mut lines = Vec::new();
        let mut begin = 0;
        while let Some(offset) = chunk[begin..].iter().position(|b| *b == b'\n') {
            let end = begin + offset;
            let mut line = std::mem::take(&mut self.partial);
            line.extend_from_slice(&chunk[begin..end]);
            lines.push(line);
            begin = end + 1;
        }
        self.partial.extend_from_slice(&chunk[begin..]);
        lines
    }

    /// Takes the unterminated remainder, if any.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.partial.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.partial))
        }
    }

    pub fn clear(&mut self) {
        self.partial.clear();
    }
}

/// Decodes a line for display. Invalid UTF-8 is replaced, never dropped.
pub fn line_text(line: &[u8]) -> String {
    String::from_utf8_lossy(line).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: Vec<Vec<u8>>) -> Vec<String> {
        lines.iter().map(|l| line_text(l)).collect()
    }

    #[test]
    fn joins_fragment_across_chunks() {
        let mut buffer = LineBuffer::default();
        assert!(buffer.push(b"hel").is_empty());
        let lines = buffer.push(b"lo\nworld\n");
        assert_eq!(texts(lines), vec!["hello", "world"]);
        assert!(buffer.flush().is_none());
    }

    #[test]
    fn every_split_point_yields_same_lines() {
        let data = b"hello\nworld\n";
        for split in 0..=data.len() {
            let mut buffer = LineBuffer::default();
            let mut lines = buffer.push(&data[..split]);
            lines.extend(buffer.push(&data[split..]));
            assert_eq!(texts(lines), vec!["hello", "world"], "split at {}", split);
            assert!(buffer.flush().is_none());
        }
    }

    #[test]
    fn byte_at_a_time_delivery() {
        let mut buffer = LineBuffer::default();
        let mut lines = Vec::new();
        for byte in b"a\n\nbc\n" {
            lines.extend(buffer.push(std::slice::from_ref(byte)));
        }
        assert_eq!(texts(lines), vec!["a", "", "bc"]);
    }

    #[test]
    fn flush_returns_unterminated_tail_once() {
        let mut buffer = LineBuffer::default();
        let lines = buffer.push(b"done\nno newline");
        assert_eq!(texts(lines), vec!["done"]);
        assert_eq!(buffer.flush().as_deref(), Some(&b"no newline"[..]));
        assert!(buffer.flush().is_none());
    }

    #[test]
    fn clear_discards_previous_run() {
        let mut buffer = LineBuffer::default();
        buffer.push(b"stale");
        buffer.clear();
        assert_eq!(texts(buffer.push(b"fresh\n")), vec!["fresh"]);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        assert_eq!(line_text(&[b'o', 0xff, b'k']), "o\u{fffd}k");
    }
}
