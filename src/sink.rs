//! Byte-oriented buffered output.
//!
//! Every serialized byte of the trace goes through a [`Sink`]. Output is
//! strictly append-only; there is no seek.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::Error;

/// Internal buffer size of [`FileSink`]. One flush unit.
pub const SINK_BUF_LEN: usize = 4096;

/// Append-only byte sink with an explicit flush.
pub trait Sink {
    /// Appends `bytes` to the destination, returning the number of bytes
    /// accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error>;

    /// Forces any buffered bytes out to the destination.
    fn flush(&mut self) -> Result<(), Error>;
}

/// File-backed sink with a bounded internal buffer, flushed when full and
/// on drop.
pub struct FileSink {
    file: File,
    buf: Vec<u8>,
}

impl FileSink {
    pub fn create(path: &Path) -> Result<Self, Error> {
        let file = File::create(path)?;
        Ok(Self {
            file,
            buf: Vec::with_capacity(SINK_BUF_LEN),
        })
    }
}

impl Sink for FileSink {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        let mut src = bytes;
        while !src.is_empty() {
            let room = SINK_BUF_LEN - self.buf.len();
            let take = src.len().min(room);
            self.buf.extend_from_slice(&src[..take]);
            src = &src[take..];

            if self.buf.len() == SINK_BUF_LEN {
                self.file.write_all(&self.buf)?;
                self.buf.clear();
            }
        }

        Ok(bytes.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        if !self.buf.is_empty() {
            self.file.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.file.flush()?;
        Ok(())
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        let _ = Sink::flush(self);
    }
}

/// In-memory sink, used by tests to inspect the emitted byte stream.
impl Sink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> Result<usize, Error> {
        self.extend_from_slice(bytes);
        Ok(bytes.len())
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_small_writes_stay_buffered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut sink = FileSink::create(&path).unwrap();
        sink.write(b"abc").unwrap();

        // Nothing flushed yet.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);

        sink.flush().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"abc");
    }

    #[test]
    fn test_full_buffer_is_flushed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let mut sink = FileSink::create(&path).unwrap();
        let chunk = vec![0x5au8; SINK_BUF_LEN + 10];
        assert_eq!(sink.write(&chunk).unwrap(), chunk.len());

        // The first buffer-full went to the file, the tail is still pending.
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            SINK_BUF_LEN as u64
        );

        sink.flush().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), chunk);
    }

    #[test]
    fn test_drop_flushes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.bin");

        {
            let mut sink = FileSink::create(&path).unwrap();
            sink.write(b"tail").unwrap();
        }

        assert_eq!(std::fs::read(&path).unwrap(), b"tail");
    }

    #[test]
    fn test_vec_sink() {
        let mut sink: Vec<u8> = Vec::new();
        Sink::write(&mut sink, b"xy").unwrap();
        Sink::write(&mut sink, b"z").unwrap();
        Sink::flush(&mut sink).unwrap();
        assert_eq!(sink, b"xyz");
    }
}
