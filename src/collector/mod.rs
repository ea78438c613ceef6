//! Acquirers for the Linux proc pseudo-filesystem.
//!
//! Each acquirer owns a family of open proc files and runs a two-phase
//! tick: a fast read of every descriptor first, decoding afterwards, so
//! the timing skew between counters stays bounded by a handful of reads
//! rather than by serialization cost.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Sampler                            │
//! │  ┌─────────────────────┐   ┌─────────────────────────────┐  │
//! │  │  SystemCollector    │   │  ProcessCollector (×n)      │  │
//! │  │  - /proc/stat       │   │  - /proc/<pid>/stat         │  │
//! │  │  - /proc/meminfo    │   │  - /proc/<pid>/task/*/stat  │  │
//! │  └──────────┬──────────┘   └──────────────┬──────────────┘  │
//! │             └──────────────┬──────────────┘                 │
//! │                     ┌──────▼──────┐                         │
//! │                     │   ProcFs    │ (trait)                 │
//! │                     └──────┬──────┘                         │
//! └────────────────────────────┼────────────────────────────────┘
//!                       ┌──────┴──────┐
//!                ┌──────▼──────┐ ┌────▼────────┐
//!                │   RealFs    │ │   MockFs    │
//!                │  (Linux)    │ │  (testing)  │
//!                └─────────────┘ └─────────────┘
//! ```

pub mod mock;
pub mod parser;
pub mod process;
pub mod raw;
pub mod system;
pub mod traits;

use std::path::{Path, PathBuf};

use crate::collector::raw::STAT_BUF_LEN;
use crate::collector::traits::{ProcFile, ProcFs};
use crate::error::Error;

pub use mock::MockFs;
pub use process::{AcqState, ProcessCollector};
pub use system::SystemCollector;
pub use traits::RealFs;

pub(crate) fn stat_path(proc_root: &Path, pid: u32) -> PathBuf {
    proc_root.join(pid.to_string()).join("stat")
}

pub(crate) fn task_dir_path(proc_root: &Path, pid: u32) -> PathBuf {
    proc_root.join(pid.to_string()).join("task")
}

pub(crate) fn task_stat_path(proc_root: &Path, pid: u32, tid: u32) -> PathBuf {
    proc_root
        .join(pid.to_string())
        .join("task")
        .join(tid.to_string())
        .join("stat")
}

/// Pids currently present under `proc_root`: every directory entry whose
/// name parses as a decimal number.
pub fn list_pids<F: ProcFs>(fs: &F, proc_root: &Path) -> Result<Vec<u32>, Error> {
    let mut pids: Vec<u32> = fs
        .read_dir(proc_root)?
        .iter()
        .filter_map(|entry| entry.file_name()?.to_str()?.parse().ok())
        .collect();
    pids.sort_unstable();
    Ok(pids)
}

/// Finds the first process whose comm equals `name`.
///
/// Entries that cannot be opened or read are skipped; processes come and
/// go while the scan runs.
pub fn find_process<F: ProcFs>(fs: &F, proc_root: &Path, name: &str) -> Result<u32, Error> {
    for pid in list_pids(fs, proc_root)? {
        let Ok(file) = fs.open(&stat_path(proc_root, pid)) else {
            continue;
        };

        let mut buf = [0u8; STAT_BUF_LEN];
        let Ok(n) = file.read_at_start(&mut buf) else {
            continue;
        };
        let Ok(content) = std::str::from_utf8(&buf[..n]) else {
            continue;
        };

        if parser::stat_line_name_matches(content, name) {
            return Ok(pid);
        }
    }

    Err(Error::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_pids_ignores_non_numeric_entries() {
        let fs = MockFs::new();
        fs.add_process(12, "x");
        fs.add_process(3, "y");
        fs.add_file("/proc/stat", "cpu");
        fs.add_file("/proc/meminfo", "MemTotal: 1 kB");

        let pids = list_pids(&fs, Path::new("/proc")).unwrap();
        assert_eq!(pids, [3, 12]);
    }

    #[test]
    fn test_find_process_first_match_wins() {
        let fs = MockFs::new();
        fs.add_process(5, "5 (bashful) S 1 2");
        fs.add_process(9, "9 (bash) S 1 2");
        fs.add_process(11, "11 (bash) S 1 2");

        assert_eq!(find_process(&fs, Path::new("/proc"), "bash").unwrap(), 9);
    }

    #[test]
    fn test_find_process_not_found() {
        let fs = MockFs::new();
        fs.add_process(5, "5 (other) S 1 2");
        assert!(matches!(
            find_process(&fs, Path::new("/proc"), "bash"),
            Err(Error::NotFound)
        ));
    }
}
