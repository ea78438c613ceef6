//! Abstractions for proc filesystem access to enable testing and mocking.
//!
//! The collectors keep proc files open across ticks and re-read them with
//! a positional read at offset 0, so the abstraction hands out open file
//! handles rather than whole-file strings. `RealFs` reads the actual
//! `/proc`; the mock implementation lives in [`crate::collector::mock`].

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

/// An open proc-style file supporting the fast read.
pub trait ProcFile {
    /// Reads from offset 0 into `buf`, returning the number of bytes read.
    /// Proc files are bounded by one page, so one call reads the whole
    /// content.
    fn read_at_start(&self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Abstraction over the proc filesystem tree.
pub trait ProcFs: Clone {
    type File: ProcFile;

    /// Opens a file for repeated positional reads.
    fn open(&self, path: &Path) -> io::Result<Self::File>;

    /// Lists entries in a directory.
    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>>;
}

/// Real filesystem implementation that delegates to `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealFs;

impl RealFs {
    pub fn new() -> Self {
        Self
    }
}

impl ProcFile for File {
    fn read_at_start(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_at(buf, 0)
    }
}

impl ProcFs for RealFs {
    type File = File;

    fn open(&self, path: &Path) -> io::Result<File> {
        File::open(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(path)? {
            paths.push(entry?.path());
        }
        Ok(paths)
    }
}
