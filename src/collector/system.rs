//! System-wide acquirer reading `/proc/stat` and `/proc/meminfo`.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::collector::parser::{ParseError, parse_meminfo, parse_system_stats};
use crate::collector::raw::RawStats;
use crate::collector::traits::ProcFs;
use crate::error::Error;
use crate::model::SystemStats;
use crate::sampler::Observer;

/// Holds both system pseudo-files open across ticks and emits one
/// combined [`SystemStats`] per tick once both were read.
pub struct SystemCollector<F: ProcFs> {
    fs: F,
    proc_root: PathBuf,
    proc_stat: RawStats<F::File>,
    meminfo: RawStats<F::File>,
}

impl<F: ProcFs> SystemCollector<F> {
    pub fn new(fs: F, proc_root: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            proc_root: proc_root.into(),
            proc_stat: RawStats::closed(),
            meminfo: RawStats::closed(),
        }
    }

    fn stat_path(&self) -> PathBuf {
        self.proc_root.join("stat")
    }

    fn meminfo_path(&self) -> PathBuf {
        self.proc_root.join("meminfo")
    }

    /// Opens both pseudo-files. Failures are tolerated here; a closed file
    /// is reopened during decode and only costs that tick's emission.
    pub fn init(&mut self) {
        let path = self.stat_path();
        if let Err(e) = self.proc_stat.open(&self.fs, &path) {
            warn!("Fail to open {}: {}", path.display(), e);
        }
        let path = self.meminfo_path();
        if let Err(e) = self.meminfo.open(&self.fs, &path) {
            warn!("Fail to open {}: {}", path.display(), e);
        }
    }

    /// Fast read of every open pseudo-file.
    pub fn read_raw(&mut self) {
        if self.proc_stat.is_open()
            && let Err(e) = self.proc_stat.read()
        {
            warn!("Fast read of {} failed: {}", self.stat_path().display(), e);
        }
        if self.meminfo.is_open()
            && let Err(e) = self.meminfo.read()
        {
            warn!("Fast read of {} failed: {}", self.meminfo_path().display(), e);
        }
    }

    /// Decodes both buffers into one combined record.
    ///
    /// A file that is closed or was not read this tick suppresses the
    /// emission; a parse failure additionally closes the file so the next
    /// tick reopens it.
    pub fn decode(&mut self, observer: &mut dyn Observer) {
        let mut stats = SystemStats::default();
        let mut data_pending = false;

        let path = self.stat_path();
        match Self::decode_file(&mut self.proc_stat, &self.fs, &path, parse_system_stats, &mut stats)
        {
            Ok(()) => {}
            Err(Error::Transient) => data_pending = true,
            Err(e) => {
                warn!("Failed to decode {}: {}", path.display(), e);
                data_pending = true;
            }
        }

        let path = self.meminfo_path();
        match Self::decode_file(&mut self.meminfo, &self.fs, &path, parse_meminfo, &mut stats) {
            Ok(()) => {}
            Err(Error::Transient) => data_pending = true,
            Err(e) => {
                warn!("Failed to decode {}: {}", path.display(), e);
                data_pending = true;
            }
        }

        if !data_pending {
            stats.ts_start = self.proc_stat.ts_start();
            // The later read bounds the acquisition window from above.
            stats.ts_end = self.proc_stat.ts_end().max(self.meminfo.ts_end());
            observer.system_stats(&stats);
        }
    }

    fn decode_file(
        raw: &mut RawStats<F::File>,
        fs: &F,
        path: &Path,
        parse: fn(&str, &mut SystemStats) -> Result<(), ParseError>,
        stats: &mut SystemStats,
    ) -> Result<(), Error> {
        if !raw.is_open() {
            if let Err(e) = raw.open(fs, path) {
                debug!("Reopen of {} failed: {}", path.display(), e);
            }
            // Freshly opened or still closed; data arrives next tick.
            return Err(Error::Transient);
        }
        if !raw.pending() {
            return Err(Error::Transient);
        }

        match raw.content().and_then(|c| parse(c, stats).map_err(Error::from)) {
            Ok(()) => Ok(()),
            Err(e) => {
                raw.close();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::MockFs;

    const STAT: &str = "cpu  10 20 30 40 50 60 70 0 0 0\nintr 111 1 2\nsoftirq 222 1 2\nctxt 333\n";
    const MEMINFO: &str = "MemTotal: 1024 kB\nMemFree: 200 kB\nMemAvailable: 512 kB\n";

    #[derive(Default)]
    struct Capture {
        emitted: Vec<SystemStats>,
    }

    impl Observer for Capture {
        fn system_stats(&mut self, stats: &SystemStats) {
            self.emitted.push(stats.clone());
        }
    }

    fn system_fs() -> MockFs {
        let fs = MockFs::new();
        fs.add_file("/proc/stat", STAT);
        fs.add_file("/proc/meminfo", MEMINFO);
        fs
    }

    #[test]
    fn test_combined_emission() {
        let fs = system_fs();
        let mut collector = SystemCollector::new(fs, "/proc");
        collector.init();

        let mut capture = Capture::default();
        collector.read_raw();
        collector.decode(&mut capture);

        assert_eq!(capture.emitted.len(), 1);
        let stats = &capture.emitted[0];
        assert_eq!(stats.utime, 10);
        assert_eq!(stats.softirq, 70);
        assert_eq!(stats.irq_count, 111);
        assert_eq!(stats.softirq_count, 222);
        assert_eq!(stats.ctx_switch_count, 333);
        assert_eq!(stats.ram_total, 1_048_576);
        assert_eq!(stats.ram_available, 204_800);
        assert_eq!(stats.ram_free, 524_288);
        assert!(stats.ts_end >= stats.ts_start);
    }

    #[test]
    fn test_missing_file_skips_emission_until_reopened() {
        let fs = MockFs::new();
        fs.add_file("/proc/stat", STAT);
        // No meminfo yet.
        let mut collector = SystemCollector::new(fs.clone(), "/proc");
        collector.init();

        let mut capture = Capture::default();
        collector.read_raw();
        collector.decode(&mut capture);
        assert!(capture.emitted.is_empty());

        // The file appears; the decode pass reopens it, and the next tick
        // has full data.
        fs.add_file("/proc/meminfo", MEMINFO);
        collector.read_raw();
        collector.decode(&mut capture);
        assert!(capture.emitted.is_empty());

        collector.read_raw();
        collector.decode(&mut capture);
        assert_eq!(capture.emitted.len(), 1);
    }

    #[test]
    fn test_parse_failure_closes_and_recovers() {
        let fs = system_fs();
        fs.add_file("/proc/meminfo", "MemTotal garbage");

        let mut collector = SystemCollector::new(fs.clone(), "/proc");
        collector.init();

        let mut capture = Capture::default();
        collector.read_raw();
        collector.decode(&mut capture);
        assert!(capture.emitted.is_empty());

        // Content is healthy again; reopen happens on the next decode,
        // data on the tick after.
        fs.add_file("/proc/meminfo", MEMINFO);
        collector.read_raw();
        collector.decode(&mut capture);
        collector.read_raw();
        collector.decode(&mut capture);
        assert_eq!(capture.emitted.len(), 1);
    }
}
