//! Line input for the console.
//!
//! [`DumbLineEditor`] is the editor used over a WebSocket: the remote
//! terminal does its own echo, so the editor only prints the prompt,
//! collects bytes up to a newline and handles backspace and TAB.

use std::collections::VecDeque;
use std::io;
use std::sync::Arc;

use super::io::ConsoleIo;

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;
const TAB: u8 = b'\t';

/// Returns the candidates for a partially typed line.
pub type CompletionFn = Arc<dyn Fn(&str) -> Vec<String> + Send + Sync>;

/// Result of one [`LineEditor::read_line`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete line without its terminator. May be empty.
    Line(String),
    /// The stream reported end-of-stream; any partial line is dropped.
    EndOfStream,
}

/// Line editing collaborator of the console loop.
pub trait LineEditor: Send {
    /// Reads one line, printing `prompt` first if no line is in progress.
    ///
    /// A timed-out read keeps the partial line; calling again resumes it
    /// without repeating the prompt.
    ///
    /// # Errors
    ///
    /// Errors of the underlying stream, including
    /// [`io::ErrorKind::TimedOut`].
    fn read_line(&mut self, io: &mut dyn ConsoleIo, prompt: &str) -> io::Result<LineRead>;

    /// Records a dispatched line.
    fn history_add(&mut self, line: &str);
}

/// Line editor without cursor movement or echo.
pub struct DumbLineEditor {
    max_line_len: usize,
    history_len: usize,
    history: VecDeque<String>,
    line: Vec<u8>,
    /// Bytes read past the last newline.
    carry: VecDeque<u8>,
    prompted: bool,
    completion: Option<CompletionFn>,
}

impl DumbLineEditor {
    /// Creates an editor truncating lines at `max_line_len` bytes and
    /// keeping `history_len` lines.
    #[must_use]
    pub fn new(max_line_len: usize, history_len: usize) -> Self {
        Self {
            max_line_len: max_line_len.max(1),
            history_len,
            history: VecDeque::with_capacity(history_len),
            line: Vec::new(),
            carry: VecDeque::new(),
            prompted: false,
            completion: None,
        }
    }

    /// Installs the TAB completion callback.
    #[must_use]
    pub fn with_completion(mut self, completion: CompletionFn) -> Self {
        self.completion = Some(completion);
        self
    }

    /// Recorded lines, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }

    fn next_byte(&mut self, io: &mut dyn ConsoleIo) -> io::Result<Option<u8>> {
        if let Some(byte) = self.carry.pop_front() {
            return Ok(Some(byte));
        }
        let mut buf = [0_u8; 64];
        let n = io.read(&mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        self.carry.extend(buf.iter().take(n));
        Ok(self.carry.pop_front())
    }

    fn erase_char(&mut self) {
        while let Some(byte) = self.line.pop() {
            if byte & 0xC0 != 0x80 {
                break;
            }
        }
    }

    fn complete(&mut self, io: &mut dyn ConsoleIo, prompt: &str) -> io::Result<()> {
        let Some(completion) = self.completion.as_ref().map(Arc::clone) else {
            return Ok(());
        };
        let typed = String::from_utf8_lossy(&self.line).into_owned();
        let candidates = completion(&typed);
        match candidates.as_slice() {
            [] => Ok(()),
            [only] => {
                let mut completed = only.clone().into_bytes();
                completed.push(b' ');
                completed.truncate(self.max_line_len);
                self.line = completed;
                Ok(())
            }
            many => {
                writeln!(io)?;
                for candidate in many {
                    writeln!(io, "{candidate}")?;
                }
                io.write_all(prompt.as_bytes())?;
                io.write_all(&self.line)?;
                io.flush()
            }
        }
    }
}

impl LineEditor for DumbLineEditor {
    fn read_line(&mut self, io: &mut dyn ConsoleIo, prompt: &str) -> io::Result<LineRead> {
        if !self.prompted {
            io.write_all(prompt.as_bytes())?;
            io.flush()?;
            self.prompted = true;
        }
        loop {
            let Some(byte) = self.next_byte(io)? else {
                self.line.clear();
                self.prompted = false;
                return Ok(LineRead::EndOfStream);
            };
            match byte {
                b'\n' => {
                    self.prompted = false;
                    let line = String::from_utf8_lossy(&self.line).into_owned();
                    self.line.clear();
                    return Ok(LineRead::Line(line));
                }
                b'\r' => {}
                BACKSPACE | DELETE => self.erase_char(),
                TAB => self.complete(io, prompt)?,
                byte if self.line.len() < self.max_line_len => self.line.push(byte),
                _ => {}
            }
        }
    }

    fn history_add(&mut self, line: &str) {
        if line.trim().is_empty() || self.history_len == 0 {
            return;
        }
        if self.history.back().is_some_and(|last| last == line) {
            return;
        }
        if self.history.len() == self.history_len {
            self.history.pop_front();
        }
        self.history.push_back(line.to_string());
    }
}

impl std::fmt::Debug for DumbLineEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DumbLineEditor")
            .field("max_line_len", &self.max_line_len)
            .field("history", &self.history.len())
            .field("pending", &self.line.len())
            .field("completion", &self.completion.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::time::Duration;

    /// Scripted stream: each read returns the next chunk, then EOF.
    #[derive(Default)]
    struct Script {
        chunks: VecDeque<Vec<u8>>,
        written: Vec<u8>,
    }

    impl Script {
        fn new(chunks: &[&[u8]]) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                written: Vec::new(),
            }
        }
    }

    impl Read for Script {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            if let (Some(dst), Some(src)) = (buf.get_mut(..n), chunk.get(..n)) {
                dst.copy_from_slice(src);
            }
            Ok(n)
        }
    }

    impl Write for Script {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.written.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ConsoleIo for Script {
        fn wait_readable(&self, _timeout: Duration) -> bool {
            false
        }
    }

    fn line(editor: &mut DumbLineEditor, io: &mut Script) -> LineRead {
        let Ok(read) = editor.read_line(io, "> ") else {
            panic!("read_line failed");
        };
        read
    }

    #[test]
    fn reads_lines_and_keeps_leftover_bytes() {
        let mut io = Script::new(&[b"help\r\nver", b"sion\n"]);
        let mut editor = DumbLineEditor::new(64, 4);
        assert_eq!(line(&mut editor, &mut io), LineRead::Line("help".into()));
        assert_eq!(line(&mut editor, &mut io), LineRead::Line("version".into()));
        assert_eq!(line(&mut editor, &mut io), LineRead::EndOfStream);
        assert_eq!(io.written, b"> > > ");
    }

    #[test]
    fn backspace_and_truncation() {
        let mut io = Script::new(&[b"abx\x08c\x7f\x7fdefgh\n"]);
        let mut editor = DumbLineEditor::new(4, 4);
        assert_eq!(line(&mut editor, &mut io), LineRead::Line("adef".into()));
    }

    #[test]
    fn tab_completes_unique_command() {
        let completion: CompletionFn = Arc::new(|typed: &str| {
            ["help", "history"]
                .iter()
                .filter(|c| c.starts_with(typed))
                .map(|c| (*c).to_string())
                .collect()
        });
        let mut io = Script::new(&[b"he\t\n", b"h\t\n"]);
        let mut editor = DumbLineEditor::new(64, 4).with_completion(completion);
        assert_eq!(line(&mut editor, &mut io), LineRead::Line("help ".into()));
        assert_eq!(line(&mut editor, &mut io), LineRead::Line("h".into()));
        assert!(String::from_utf8_lossy(&io.written).contains("help\nhistory\n"));
    }

    #[test]
    fn history_is_bounded_and_skips_blank_lines() {
        let mut editor = DumbLineEditor::new(64, 2);
        editor.history_add("one");
        editor.history_add("");
        editor.history_add("two");
        editor.history_add("two");
        editor.history_add("three");
        assert_eq!(editor.history().collect::<Vec<_>>(), vec!["two", "three"]);
    }
}
