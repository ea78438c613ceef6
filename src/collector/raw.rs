//! Raw snapshot of one proc file, refreshed by the per-tick fast read.

use std::path::Path;

use nix::time::{ClockId, clock_gettime};

use crate::collector::traits::{ProcFile, ProcFs};
use crate::error::Error;

/// Proc files are bounded by one page.
pub const STAT_BUF_LEN: usize = 4096;

/// Monotonic clock, in nanoseconds.
pub fn monotonic_ns() -> u64 {
    // CLOCK_MONOTONIC is always available; the call cannot fail with a
    // valid clock id.
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64,
        Err(_) => 0,
    }
}

/// One open proc file plus the raw bytes and timestamps of its latest
/// fast read.
///
/// The fast read is a positional read at offset 0, timestamped before and
/// after, so decode work never sits between two reads of the same tick.
/// The handle is owned; dropping the `RawStats` closes it.
pub struct RawStats<P> {
    file: Option<P>,
    pending: bool,
    ts_start: u64,
    ts_end: u64,
    buf: Box<[u8; STAT_BUF_LEN]>,
    len: usize,
}

impl<P: ProcFile> RawStats<P> {
    pub fn closed() -> Self {
        Self {
            file: None,
            pending: false,
            ts_start: 0,
            ts_end: 0,
            buf: Box::new([0; STAT_BUF_LEN]),
            len: 0,
        }
    }

    pub fn open<F: ProcFs<File = P>>(&mut self, fs: &F, path: &Path) -> Result<(), Error> {
        if self.file.is_some() {
            return Err(Error::AlreadyOpen);
        }
        self.file = Some(fs.open(path)?);
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
        self.pending = false;
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// True when the buffer holds data read this tick.
    pub fn pending(&self) -> bool {
        self.pending
    }

    pub fn ts_start(&self) -> u64 {
        self.ts_start
    }

    pub fn ts_end(&self) -> u64 {
        self.ts_end
    }

    /// The fast read. On success the buffer holds the file content with
    /// the trailing newline trimmed and `pending` is set; a failed read
    /// clears `pending` and leaves the file open for the caller to decide.
    pub fn read(&mut self) -> Result<(), Error> {
        let Some(file) = &self.file else {
            self.pending = false;
            return Err(Error::NotOpen);
        };

        self.ts_start = monotonic_ns();
        let read = file.read_at_start(&mut self.buf[..]);
        self.ts_end = monotonic_ns();

        match read {
            Err(e) => {
                self.pending = false;
                Err(Error::Io(e))
            }
            Ok(mut n) => {
                if n > 0 && self.buf[n - 1] == b'\n' {
                    n -= 1;
                }
                self.len = n;
                self.pending = true;
                Ok(())
            }
        }
    }

    /// Content of the latest fast read.
    pub fn content(&self) -> Result<&str, Error> {
        std::str::from_utf8(&self.buf[..self.len]).map_err(|_| {
            Error::Parse(crate::collector::parser::ParseError::new(
                "proc file content is not valid utf-8",
            ))
        })
    }
}
