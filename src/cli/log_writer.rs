//! Log sink that stays aligned while the terminal is in raw mode
//!
//! Raw mode turns off output post-processing, so a bare `\n` moves down
//! without returning to column 0. Log lines written then get `\r\n`.

use std::io::{self, Stderr, Write};
use std::sync::atomic::{AtomicBool, Ordering};

static RAW_MODE: AtomicBool = AtomicBool::new(false);

/// Record whether the terminal is currently in raw mode
pub fn set_raw_mode(on: bool) {
    RAW_MODE.store(on, Ordering::Relaxed);
}

pub fn raw_mode_active() -> bool {
    RAW_MODE.load(Ordering::Relaxed)
}

/// Writer that expands `\n` to `\r\n` when `raw` is set
pub struct LogWriter<W: Write> {
    inner: W,
    raw: bool,
}

impl<W: Write> LogWriter<W> {
    pub fn new(inner: W, raw: bool) -> Self {
        LogWriter { inner, raw }
    }
}

impl<W: Write> Write for LogWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.raw {
            return self.inner.write(buf);
        }
        let mut start = 0;
        for (i, &byte) in buf.iter().enumerate() {
            if byte == b'\n' && (i == 0 || buf[i - 1] != b'\r') {
                self.inner.write_all(&buf[start..i])?;
                self.inner.write_all(b"\r\n")?;
                start = i + 1;
            }
        }
        self.inner.write_all(&buf[start..])?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// `MakeWriter` for the tracing subscriber
pub fn stderr() -> LogWriter<Stderr> {
    LogWriter::new(io::stderr(), raw_mode_active())
}
