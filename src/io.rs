use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};

use crate::error::{ErrorKind, LispError, Result};

fn io_error(what: &str, e: io::Error) -> LispError {
    LispError::with_msg(ErrorKind::Io, None, None, format!("{}: {}", what, e))
}

/// One input frame: a byte buffer with a read position.
///
/// Files and strings are read eagerly. Stdin is refilled a line at a time
/// so the REPL can evaluate each expression as soon as its line is complete.
pub struct InFrame {
    buf: Vec<u8>,
    pos: usize,
    stdin: bool,
    eof: bool,
}

impl InFrame {
    pub fn stdin() -> Self {
        InFrame {
            buf: Vec::new(),
            pos: 0,
            stdin: true,
            eof: false,
        }
    }

    pub fn from_text(src: &str) -> Self {
        InFrame {
            buf: src.as_bytes().to_vec(),
            pos: 0,
            stdin: false,
            eof: false,
        }
    }

    pub fn open(path: &str) -> Result<Self> {
        let buf = std::fs::read(path).map_err(|e| io_error(&format!("cannot open '{}'", path), e))?;
        Ok(InFrame {
            buf,
            pos: 0,
            stdin: false,
            eof: false,
        })
    }

    /// The next byte without consuming it, or `None` at end of input.
    pub fn peek(&mut self) -> Result<Option<u8>> {
        if self.pos >= self.buf.len() && !self.refill()? {
            return Ok(None);
        }
        Ok(self.buf.get(self.pos).copied())
    }

    pub fn next_byte(&mut self) -> Result<Option<u8>> {
        let b = self.peek()?;
        if b.is_some() {
            self.pos += 1;
        }
        Ok(b)
    }

    /// Pull another line from stdin. False at end of input.
    fn refill(&mut self) -> Result<bool> {
        if !self.stdin || self.eof {
            return Ok(false);
        }
        self.buf.clear();
        self.pos = 0;
        let n = io::stdin()
            .lock()
            .read_until(b'\n', &mut self.buf)
            .map_err(|e| io_error("stdin", e))?;
        if n == 0 {
            self.eof = true;
        }
        Ok(n > 0)
    }
}

/// One output frame.
pub enum OutFrame {
    Stdout,
    File(BufWriter<File>),
    /// In-memory capture, used by embedders and tests.
    Buffer(Vec<u8>),
}

impl OutFrame {
    pub fn create(path: &str, append: bool) -> Result<Self> {
        let file = File::options()
            .write(true)
            .create(true)
            .append(append)
            .truncate(!append)
            .open(path)
            .map_err(|e| io_error(&format!("cannot create '{}'", path), e))?;
        Ok(OutFrame::File(BufWriter::new(file)))
    }

    pub fn write_str(&mut self, s: &str) -> Result<()> {
        self.write_all(s.as_bytes()).map_err(|e| io_error("write", e))
    }

    pub fn flush_frame(&mut self) -> Result<()> {
        self.flush().map_err(|e| io_error("flush", e))
    }

    /// Captured text of a buffer frame; empty for the others.
    pub fn into_text(self) -> String {
        match self {
            OutFrame::Buffer(v) => String::from_utf8_lossy(&v).into_owned(),
            _ => String::new(),
        }
    }
}

impl Write for OutFrame {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutFrame::Stdout => io::stdout().write(buf),
            OutFrame::File(w) => w.write(buf),
            OutFrame::Buffer(v) => v.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutFrame::Stdout => io::stdout().flush(),
            OutFrame::File(w) => w.flush(),
            OutFrame::Buffer(_) => Ok(()),
        }
    }
}
