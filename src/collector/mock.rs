//! In-memory mock proc filesystem for testing collectors without a real
//! `/proc`.
//!
//! `MockFs` clones share one tree, so a test can hold a handle, mutate
//! file contents between ticks to advance counters, or remove files to
//! script a process or thread exiting. Reads through an already-open
//! handle fail once its file is removed, which is how a vanished task
//! behaves on the real proc filesystem.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::collector::traits::{ProcFile, ProcFs};

#[derive(Debug, Default)]
struct MockState {
    files: HashMap<PathBuf, String>,
    dirs: HashSet<PathBuf>,
}

/// In-memory proc filesystem tree.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    state: Rc<RefCell<MockState>>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a file; parent directories are created.
    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state.borrow_mut();

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                state.dirs.insert(p.to_path_buf());
            }
            parent = p.parent();
        }

        state.files.insert(path, content.into());
    }

    /// Adds an empty directory.
    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let path = path.as_ref().to_path_buf();
        let mut state = self.state.borrow_mut();

        let mut parent = path.parent();
        while let Some(p) = parent {
            if !p.as_os_str().is_empty() {
                state.dirs.insert(p.to_path_buf());
            }
            parent = p.parent();
        }

        state.dirs.insert(path);
    }

    /// Removes a file. Open handles to it start failing, like reading the
    /// stat file of a task that exited.
    pub fn remove_file(&self, path: impl AsRef<Path>) {
        self.state.borrow_mut().files.remove(path.as_ref());
    }

    /// Adds `/proc/<pid>/stat` plus the task directory for the process.
    pub fn add_process(&self, pid: u32, stat: &str) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        self.add_file(base.join("stat"), stat);
        self.add_dir(base.join("task"));
    }

    /// Adds `/proc/<pid>/task/<tid>/stat` for one thread of the process.
    pub fn add_task(&self, pid: u32, tid: u32, stat: &str) {
        let path = PathBuf::from(format!("/proc/{}/task/{}/stat", pid, tid));
        self.add_file(path, stat);
    }

    /// Removes every trace of the process, scripting its exit.
    pub fn remove_process(&self, pid: u32) {
        let base = PathBuf::from(format!("/proc/{}", pid));
        let mut state = self.state.borrow_mut();
        state.files.retain(|p, _| !p.starts_with(&base));
        state.dirs.retain(|p| !p.starts_with(&base));
    }
}

/// Handle to one file of a [`MockFs`] tree.
#[derive(Debug)]
pub struct MockFile {
    state: Rc<RefCell<MockState>>,
    path: PathBuf,
}

impl ProcFile for MockFile {
    fn read_at_start(&self, buf: &mut [u8]) -> io::Result<usize> {
        let state = self.state.borrow();
        let content = state.files.get(&self.path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("file gone: {:?}", self.path),
            )
        })?;

        let bytes = content.as_bytes();
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        Ok(n)
    }
}

impl ProcFs for MockFs {
    type File = MockFile;

    fn open(&self, path: &Path) -> io::Result<MockFile> {
        if !self.state.borrow().files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("file not found: {:?}", path),
            ));
        }
        Ok(MockFile {
            state: Rc::clone(&self.state),
            path: path.to_path_buf(),
        })
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let state = self.state.borrow();
        if !state.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("directory not found: {:?}", path),
            ));
        }

        let mut entries = HashSet::new();
        for candidate in state.files.keys().chain(state.dirs.iter()) {
            if candidate.parent() == Some(path) {
                entries.insert(candidate.clone());
            }
        }

        let mut entries: Vec<PathBuf> = entries.into_iter().collect();
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_and_read() {
        let fs = MockFs::new();
        fs.add_file("/proc/stat", "cpu 1 2 3");

        let file = fs.open(Path::new("/proc/stat")).unwrap();
        let mut buf = [0u8; 64];
        let n = file.read_at_start(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"cpu 1 2 3");
    }

    #[test]
    fn test_open_missing_file() {
        let fs = MockFs::new();
        assert!(fs.open(Path::new("/proc/nope")).is_err());
    }

    #[test]
    fn test_read_through_handle_fails_after_removal() {
        let fs = MockFs::new();
        fs.add_process(7, "7 (gone) S 1");

        let file = fs.open(Path::new("/proc/7/stat")).unwrap();
        fs.remove_process(7);

        let mut buf = [0u8; 16];
        assert!(file.read_at_start(&mut buf).is_err());
    }

    #[test]
    fn test_clones_share_the_tree() {
        let fs = MockFs::new();
        let alias = fs.clone();
        alias.add_file("/proc/meminfo", "MemTotal: 1 kB");
        assert!(fs.open(Path::new("/proc/meminfo")).is_ok());
    }

    #[test]
    fn test_read_dir_lists_immediate_children() {
        let fs = MockFs::new();
        fs.add_process(10, "x");
        fs.add_process(11, "y");
        fs.add_file("/proc/stat", "cpu");
        fs.add_task(10, 101, "t");

        let entries = fs.read_dir(Path::new("/proc")).unwrap();
        assert_eq!(
            entries,
            [
                PathBuf::from("/proc/10"),
                PathBuf::from("/proc/11"),
                PathBuf::from("/proc/stat"),
            ]
        );

        let tasks = fs.read_dir(Path::new("/proc/10/task")).unwrap();
        assert_eq!(tasks, [PathBuf::from("/proc/10/task/101")]);
    }
}
