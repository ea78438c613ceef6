//! Per-process acquirer covering one process and its threads.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::collector::parser::{parse_process_stats, parse_thread_stats};
use crate::collector::raw::RawStats;
use crate::collector::traits::ProcFs;
use crate::collector::{find_process, stat_path, task_dir_path, task_stat_path};
use crate::error::Error;
use crate::model::{ProcessStats, ThreadStats, clamp_name};
use crate::sampler::Observer;

/// How the target process is identified.
///
/// A by-name target that vanishes goes back to discovery on later ticks; a
/// by-pid target that vanishes is gone for good, since a pid does not come
/// back.
enum Target {
    Name(String),
    Pid(u32),
}

/// Acquisition state of one process collector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcqState {
    /// Target not resolved yet; discovery runs each tick.
    Pending,
    /// Stat file open, samples flowing.
    Started,
    /// Terminal for a by-pid target.
    Failed,
}

struct ThreadInfo<P> {
    /// Display name `"<tid>-<comm>"`.
    name: String,
    raw: RawStats<P>,
}

/// Watches exactly one process, keeping its stat fd and every thread stat
/// fd open across ticks.
pub struct ProcessCollector<F: ProcFs> {
    fs: F,
    proc_root: PathBuf,
    target: Target,
    record_threads: bool,
    state: AcqState,
    pid: Option<u32>,
    name: String,
    raw: RawStats<F::File>,
    threads: BTreeMap<u32, ThreadInfo<F::File>>,
}

impl<F: ProcFs> ProcessCollector<F> {
    pub fn by_name(
        fs: F,
        proc_root: impl Into<PathBuf>,
        name: impl Into<String>,
        record_threads: bool,
    ) -> Self {
        Self {
            fs,
            proc_root: proc_root.into(),
            target: Target::Name(name.into()),
            record_threads,
            state: AcqState::Pending,
            pid: None,
            name: String::new(),
            raw: RawStats::closed(),
            threads: BTreeMap::new(),
        }
    }

    pub fn by_pid(
        fs: F,
        proc_root: impl Into<PathBuf>,
        pid: u32,
        record_threads: bool,
    ) -> Self {
        Self {
            fs,
            proc_root: proc_root.into(),
            target: Target::Pid(pid),
            record_threads,
            state: AcqState::Pending,
            pid: Some(pid),
            name: String::new(),
            raw: RawStats::closed(),
            threads: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> AcqState {
        self.state
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Resolves the target and opens its stat fd and thread fds.
    pub fn init(&mut self) -> Result<(), Error> {
        self.open_target()
    }

    fn open_target(&mut self) -> Result<(), Error> {
        let pid = match &self.target {
            // Discovery failure leaves the collector pending for the next
            // tick's retry.
            Target::Name(name) => find_process(&self.fs, &self.proc_root, name)?,
            Target::Pid(pid) => *pid,
        };
        self.pid = Some(pid);

        let path = stat_path(&self.proc_root, pid);
        if let Err(e) = self.raw.open(&self.fs, &path) {
            self.state = AcqState::Failed;
            return Err(e);
        }
        self.state = AcqState::Started;

        match &self.target {
            Target::Name(name) => debug!("Found process '{}': pid {}", name, pid),
            Target::Pid(_) => debug!("Found process {}", pid),
        }

        if self.record_threads {
            self.scan_threads()?;
        }

        Ok(())
    }

    /// Fast read of the process stat fd and every thread stat fd.
    ///
    /// A failed process read means the process exited: every fd is closed
    /// and the collector goes back to pending (by name) or terminal
    /// failure (by pid). Thread read failures only clear the thread's
    /// pending flag; the decode pass reaps it.
    pub fn read_raw(&mut self) {
        if !self.raw.is_open() {
            return;
        }

        if let Err(e) = self.raw.read() {
            let pid = self.pid.unwrap_or(0);
            if self.name.is_empty() {
                info!("Process {} has stopped ({})", pid, e);
            } else {
                info!("Process {}-{} has stopped ({})", pid, self.name, e);
            }
            self.clear();
            return;
        }

        if self.record_threads {
            for info in self.threads.values_mut() {
                let _ = info.raw.read();
            }
        }
    }

    /// Decodes this tick's buffers, emits the records and reconciles the
    /// thread set against the decoded thread count.
    pub fn decode(&mut self, observer: &mut dyn Observer) {
        if self.state == AcqState::Failed && matches!(self.target, Target::Pid(_)) {
            // The target vanished after the initial whole-system snapshot.
            return;
        }

        if !self.raw.pending() {
            // Nothing read this tick; (re)try to resolve the target so the
            // next tick has data.
            if let Err(e) = self.open_target() {
                debug!("Process lookup failed: {}", e);
            }
            return;
        }

        let mut stats = ProcessStats::default();
        let decoded = self
            .raw
            .content()
            .and_then(|c| parse_process_stats(c, &mut stats).map_err(Error::from));
        if let Err(e) = decoded {
            warn!("Failed to decode process stat: {}", e);
            return;
        }

        let Some(pid) = self.pid else {
            return;
        };

        if self.name.is_empty() {
            self.name = stats.name.clone();
            debug!("Process {} name found: {}", pid, self.name);
        }

        stats.ts_start = self.raw.ts_start();
        stats.ts_end = self.raw.ts_end();
        observer.process_stats(&stats);

        if self.record_threads {
            self.decode_threads(observer, pid);

            // A mismatch means threads were created or stopped since the
            // set was built.
            if self.threads.len() != usize::from(stats.thread_count)
                && let Err(e) = self.scan_threads()
            {
                warn!("Thread scan for pid {} failed: {}", pid, e);
            }
        }
    }

    fn decode_threads(&mut self, observer: &mut dyn Observer, pid: u32) {
        let mut dead = Vec::new();

        for (tid, info) in self.threads.iter() {
            if !info.raw.pending() {
                dead.push(*tid);
                continue;
            }

            let mut stats = ThreadStats::default();
            let decoded = info
                .raw
                .content()
                .and_then(|c| parse_thread_stats(c, &mut stats).map_err(Error::from));
            if let Err(e) = decoded {
                debug!("Dropping thread {}: {}", tid, e);
                dead.push(*tid);
                continue;
            }

            stats.ts_start = info.raw.ts_start();
            stats.ts_end = info.raw.ts_end();
            stats.pid = pid;
            stats.name = info.name.clone();
            observer.thread_stats(&stats);
        }

        for tid in dead {
            if self.threads.remove(&tid).is_some() {
                debug!("Thread {} of process {} removed", tid, pid);
            }
        }
    }

    /// Enumerates the task directory and adds any thread not yet known.
    fn scan_threads(&mut self) -> Result<(), Error> {
        let Some(pid) = self.pid else {
            return Ok(());
        };

        let task_dir = task_dir_path(&self.proc_root, pid);
        for entry in self.fs.read_dir(&task_dir)? {
            let Some(tid) = entry
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            else {
                continue;
            };

            if self.threads.contains_key(&tid) {
                continue;
            }
            if let Err(e) = self.add_thread(pid, tid) {
                warn!("Fail to add thread {}: {}", tid, e);
            }
        }

        Ok(())
    }

    /// Opens a thread stat fd and reads it once to learn the comm for the
    /// display name. The probe read is not emitted.
    fn add_thread(&mut self, pid: u32, tid: u32) -> Result<(), Error> {
        let path = task_stat_path(&self.proc_root, pid, tid);
        let mut raw = RawStats::closed();
        raw.open(&self.fs, &path)?;
        raw.read()?;

        let mut probe = ThreadStats::default();
        raw.content()
            .and_then(|c| parse_thread_stats(c, &mut probe).map_err(Error::from))?;

        let name = clamp_name(&format!("{}-{}", tid, probe.name));
        debug!("Found new thread {} for process {}", name, pid);

        self.threads.insert(tid, ThreadInfo { name, raw });
        Ok(())
    }

    fn clear(&mut self) {
        self.raw.close();
        self.threads.clear();
        match self.target {
            Target::Name(_) => {
                self.pid = None;
                self.state = AcqState::Pending;
            }
            Target::Pid(_) => {
                self.state = AcqState::Failed;
            }
        }
    }
}
