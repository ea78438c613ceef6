//! Record types carried by the trace.
//!
//! All counters are the kernel's absolute monotonic counters, copied
//! verbatim from the proc files; rate computation belongs to the offline
//! reader. Timestamps are monotonic-clock nanoseconds taken around each
//! fast read.

use crate::error::Error;
use crate::trace::Registry;

/// Capacity of the fixed-size task name fields.
pub const NAME_CAP: usize = 64;

/// Truncates `s` to at most [`NAME_CAP`] bytes on a character boundary.
pub fn clamp_name(s: &str) -> String {
    if s.len() <= NAME_CAP {
        return s.to_string();
    }
    let mut end = NAME_CAP;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// The recorded command line of this recorder itself, written once right
/// after the header so a trace identifies how it was produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgramParameters {
    pub params: String,
}

crate::record!(ProgramParameters, "programparameters", {
    "params" => params: str,
});

/// System calibration constants, recorded once at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemConfig {
    /// Clock ticks per second (USER_HZ); divisor for all *time counters.
    pub clktck: i32,
    /// Page size in bytes; multiplier for rss.
    pub pagesize: i32,
}

impl SystemConfig {
    /// Reads the running kernel's calibration.
    pub fn detect() -> Self {
        // sysconf has no failure mode for these two names on Linux.
        let clktck = unsafe { libc::sysconf(libc::_SC_CLK_TCK) } as i32;
        let pagesize = unsafe { libc::sysconf(libc::_SC_PAGESIZE) } as i32;
        Self { clktck, pagesize }
    }
}

crate::record!(SystemConfig, "systemconfig", {
    "clktck" => clktck: i32,
    "pagesize" => pagesize: i32,
});

/// System-wide counters, one per tick.
///
/// Sources: the `cpu`, `intr`, `softirq` and `ctxt` lines of `/proc/stat`
/// and the `MemTotal`, `MemFree` and `MemAvailable` lines of
/// `/proc/meminfo`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemStats {
    /// Start of the `/proc/stat` fast read (monotonic ns).
    pub ts_start: u64,
    /// End of the later of the two fast reads (monotonic ns).
    pub ts_end: u64,

    // Durations, in clock ticks.
    pub utime: u64,
    pub nice: u64,
    pub stime: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,

    // Occurrence counts.
    pub irq_count: u64,
    pub softirq_count: u64,
    pub ctx_switch_count: u64,

    // Ram usage, in bytes.
    pub ram_total: u64,
    pub ram_available: u64,
    pub ram_free: u64,
}

crate::record!(SystemStats, "systemstats", {
    "ts" => ts_start: u64,
    "acqend" => ts_end: u64,
    "utime" => utime: u64,
    "nice" => nice: u64,
    "stime" => stime: u64,
    "idle" => idle: u64,
    "iowait" => iowait: u64,
    "irq" => irq: u64,
    "softirq" => softirq: u64,
    "irqcount" => irq_count: u64,
    "softirqcount" => softirq_count: u64,
    "ctxswitchcount" => ctx_switch_count: u64,
    "ramtotal" => ram_total: u64,
    "ramavailable" => ram_available: u64,
    "ramfree" => ram_free: u64,
});

/// Per-process counters, one per tick per watched process.
///
/// Source: `/proc/<pid>/stat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessStats {
    pub ts_start: u64,
    pub ts_end: u64,

    pub pid: u32,
    /// comm from the stat line, parentheses stripped, at most
    /// [`NAME_CAP`] bytes.
    pub name: String,
    /// Virtual memory size in bytes, as the kernel reports it.
    pub vsize: u32,
    /// Resident set size in pages.
    pub rss: u32,
    pub thread_count: u16,

    /// User-mode time in clock ticks.
    pub utime: u64,
    /// Kernel-mode time in clock ticks.
    pub stime: u64,
}

crate::record!(ProcessStats, "processstats", {
    "ts" => ts_start: u64,
    "acqend" => ts_end: u64,
    "pid" => pid: u32,
    "name" => name: str,
    "vsize" => vsize: u32,
    "rss" => rss: u32,
    "threadcount" => thread_count: u16,
    "utime" => utime: u64,
    "stime" => stime: u64,
});

/// Per-thread counters, one per tick per watched thread.
///
/// Source: `/proc/<pid>/task/<tid>/stat`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadStats {
    pub ts_start: u64,
    pub ts_end: u64,

    /// Pid of the owning process, never the tid.
    pub pid: u32,
    pub tid: u32,
    /// Display name `"<tid>-<comm>"`, at most [`NAME_CAP`] bytes.
    pub name: String,

    pub utime: u64,
    pub stime: u64,
}

crate::record!(ThreadStats, "threadstats", {
    "ts" => ts_start: u64,
    "acqend" => ts_end: u64,
    "pid" => pid: u32,
    "tid" => tid: u32,
    "name" => name: str,
    "utime" => utime: u64,
    "stime" => stime: u64,
});

/// Bounds of the fast-read burst of one tick, measured around the read
/// phase only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionDuration {
    /// Monotonic ns.
    pub start: u64,
    /// Monotonic ns, `end >= start`.
    pub end: u64,
}

crate::record!(AcquisitionDuration, "acqduration", {
    "start" => start: u64,
    "end" => end: u64,
});

/// Registers every record type this crate emits, in wire-id order.
pub fn register_records(registry: &mut Registry) -> Result<(), Error> {
    registry.register::<ProgramParameters>()?;
    registry.register::<SystemConfig>()?;
    registry.register::<SystemStats>()?;
    registry.register::<ProcessStats>()?;
    registry.register::<ThreadStats>()?;
    registry.register::<AcquisitionDuration>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_records_assigns_stable_ids() {
        let mut registry = Registry::new();
        register_records(&mut registry).unwrap();

        let names: Vec<&str> = registry.entries().iter().map(|e| e.name).collect();
        assert_eq!(
            names,
            [
                "programparameters",
                "systemconfig",
                "systemstats",
                "processstats",
                "threadstats",
                "acqduration",
            ]
        );
        let ids: Vec<u8> = registry.entries().iter().map(|e| e.id).collect();
        assert_eq!(ids, [0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_register_records_twice_fails() {
        let mut registry = Registry::new();
        register_records(&mut registry).unwrap();
        assert!(register_records(&mut registry).is_err());
    }

    #[test]
    fn test_clamp_name() {
        assert_eq!(clamp_name("short"), "short");
        let long = "a".repeat(100);
        assert_eq!(clamp_name(&long).len(), NAME_CAP);
    }

    #[test]
    fn test_clamp_name_respects_char_boundary() {
        // 2-byte characters; byte 64 falls in the middle of one.
        let s = "é".repeat(40);
        let clamped = clamp_name(&s);
        assert!(clamped.len() <= NAME_CAP);
        assert!(s.starts_with(&clamped));
    }
}
