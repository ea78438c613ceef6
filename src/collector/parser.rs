//! Parsers for the proc pseudo-file formats.
//!
//! Pure functions over `&str`, designed to be testable with string
//! fixtures. Two grammars live here: the single-line per-task stat format
//! and the `Name: value [unit]` meminfo format, plus the line dispatch for
//! the system-wide stat file.

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::model::{ProcessStats, SystemStats, ThreadStats, clamp_name};

/// Error type for parsing failures.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
}

impl ParseError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self {
            message: msg.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error: {}", self.message)
    }
}

impl std::error::Error for ParseError {}

// Field indexes of the task stat line consumed by this crate.
const STAT_IDX_PID: usize = 0;
const STAT_IDX_NAME: usize = 1;
const STAT_IDX_UTIME: usize = 13;
const STAT_IDX_STIME: usize = 14;
const STAT_IDX_THREAD_COUNT: usize = 19;
const STAT_IDX_VSIZE: usize = 22;
const STAT_IDX_RSS: usize = 23;

// Field indexes within the matched lines of the system stat file.
const CPU_IDX_USER: usize = 1;
const CPU_IDX_NICE: usize = 2;
const CPU_IDX_SYSTEM: usize = 3;
const CPU_IDX_IDLE: usize = 4;
const CPU_IDX_IOWAIT: usize = 5;
const CPU_IDX_IRQ: usize = 6;
const CPU_IDX_SOFTIRQ: usize = 7;
const COUNTER_IDX_TOTAL: usize = 1;

/// Splits a task stat line into indexed fields.
///
/// Fields are space-separated except the command name, which is wrapped in
/// literal parentheses and may itself contain spaces and parentheses; it is
/// delivered as one field, parentheses included. The consumer returns
/// `false` to stop once its last field of interest is filled, so a line is
/// never scanned past what the caller needs.
pub fn tokenize_stat_line<C>(line: &str, mut consume: C)
where
    C: FnMut(usize, &str) -> bool,
{
    enum State {
        Idle,
        Int,
        Str,
    }

    let mut state = State::Idle;
    let mut start = 0;
    let mut idx = 0;

    for (i, b) in line.bytes().enumerate() {
        match state {
            State::Idle => {
                if b == b'(' {
                    state = State::Str;
                    start = i;
                } else if b != b' ' {
                    state = State::Int;
                    start = i;
                }
            }
            State::Int => {
                if b == b' ' {
                    if !consume(idx, &line[start..i]) {
                        return;
                    }
                    state = State::Idle;
                    idx += 1;
                }
            }
            State::Str => {
                if b == b')' {
                    if !consume(idx, &line[start..=i]) {
                        return;
                    }
                    state = State::Idle;
                    idx += 1;
                }
            }
        }
    }

    // Flush the field pending at end of line.
    match state {
        State::Int | State::Str => {
            consume(idx, &line[start..]);
        }
        State::Idle => {}
    }
}

/// Drops the parentheses wrapping a comm field.
fn strip_comm(token: &str) -> &str {
    let token = token.strip_prefix('(').unwrap_or(token);
    token.strip_suffix(')').unwrap_or(token)
}

fn parse_num<T: FromStr>(token: &str, what: &str) -> Result<T, ParseError> {
    token
        .parse()
        .map_err(|_| ParseError::new(format!("invalid {}: '{}'", what, token)))
}

/// Populates `stats` from a `/proc/<pid>/stat` line.
///
/// Consumes pid, comm, utime, stime, thread count, vsize and rss, halting
/// at the rss field.
pub fn parse_process_stats(line: &str, stats: &mut ProcessStats) -> Result<(), ParseError> {
    let mut err = None;
    let mut complete = false;

    tokenize_stat_line(line, |idx, token| {
        let step = (|| -> Result<bool, ParseError> {
            match idx {
                STAT_IDX_PID => stats.pid = parse_num(token, "pid")?,
                STAT_IDX_NAME => stats.name = clamp_name(strip_comm(token)),
                STAT_IDX_UTIME => stats.utime = parse_num(token, "utime")?,
                STAT_IDX_STIME => stats.stime = parse_num(token, "stime")?,
                STAT_IDX_THREAD_COUNT => {
                    stats.thread_count = parse_num(token, "thread count")?
                }
                // The wire fields are 32-bit; wider kernel values wrap.
                STAT_IDX_VSIZE => stats.vsize = parse_num::<u64>(token, "vsize")? as u32,
                STAT_IDX_RSS => {
                    stats.rss = parse_num::<i64>(token, "rss")?.max(0) as u32;
                    complete = true;
                    return Ok(false);
                }
                _ => {}
            }
            Ok(true)
        })();

        match step {
            Ok(keep_going) => keep_going,
            Err(e) => {
                err = Some(e);
                false
            }
        }
    });

    if let Some(e) = err {
        return Err(e);
    }
    if !complete {
        return Err(ParseError::new("truncated process stat line"));
    }
    Ok(())
}

/// Populates `stats` from a `/proc/<pid>/task/<tid>/stat` line.
///
/// Consumes tid, comm, utime and stime, halting at the stime field. The
/// comm lands in `stats.name`; callers owning a richer display name
/// overwrite it.
pub fn parse_thread_stats(line: &str, stats: &mut ThreadStats) -> Result<(), ParseError> {
    let mut err = None;
    let mut complete = false;

    tokenize_stat_line(line, |idx, token| {
        let step = (|| -> Result<bool, ParseError> {
            match idx {
                STAT_IDX_PID => stats.tid = parse_num(token, "tid")?,
                STAT_IDX_NAME => stats.name = clamp_name(strip_comm(token)),
                STAT_IDX_UTIME => stats.utime = parse_num(token, "utime")?,
                STAT_IDX_STIME => {
                    stats.stime = parse_num(token, "stime")?;
                    complete = true;
                    return Ok(false);
                }
                _ => {}
            }
            Ok(true)
        })();

        match step {
            Ok(keep_going) => keep_going,
            Err(e) => {
                err = Some(e);
                false
            }
        }
    });

    if let Some(e) = err {
        return Err(e);
    }
    if !complete {
        return Err(ParseError::new("truncated thread stat line"));
    }
    Ok(())
}

/// Compares the comm of a task stat line against `name`, halting right
/// after the comm field. Exact comparison, parentheses stripped.
pub fn stat_line_name_matches(line: &str, name: &str) -> bool {
    let mut matched = false;
    tokenize_stat_line(line, |idx, token| {
        if idx == STAT_IDX_NAME {
            matched = strip_comm(token) == name;
            return false;
        }
        true
    });
    matched
}

/// Populates `stats` from the content of `/proc/stat`.
///
/// Dispatches on the first token of each line: `cpu` (aggregate line
/// only), `intr`, `softirq` and `ctxt`. Any other line is ignored, so the
/// per-cpu `cpuN` lines fall through.
pub fn parse_system_stats(content: &str, stats: &mut SystemStats) -> Result<(), ParseError> {
    for line in content.lines() {
        let Some(first) = line.split_whitespace().next() else {
            continue;
        };

        match first {
            "cpu" => parse_cpu_line(line, stats)?,
            "intr" => stats.irq_count = parse_counter_line(line, "intr")?,
            "softirq" => stats.softirq_count = parse_counter_line(line, "softirq")?,
            "ctxt" => stats.ctx_switch_count = parse_counter_line(line, "ctxt")?,
            _ => {}
        }
    }
    Ok(())
}

fn parse_cpu_line(line: &str, stats: &mut SystemStats) -> Result<(), ParseError> {
    let mut err = None;
    let mut complete = false;

    tokenize_stat_line(line, |idx, token| {
        let step = (|| -> Result<bool, ParseError> {
            match idx {
                CPU_IDX_USER => stats.utime = parse_num(token, "cpu user")?,
                CPU_IDX_NICE => stats.nice = parse_num(token, "cpu nice")?,
                CPU_IDX_SYSTEM => stats.stime = parse_num(token, "cpu system")?,
                CPU_IDX_IDLE => stats.idle = parse_num(token, "cpu idle")?,
                CPU_IDX_IOWAIT => stats.iowait = parse_num(token, "cpu iowait")?,
                CPU_IDX_IRQ => stats.irq = parse_num(token, "cpu irq")?,
                CPU_IDX_SOFTIRQ => {
                    stats.softirq = parse_num(token, "cpu softirq")?;
                    complete = true;
                    return Ok(false);
                }
                _ => {}
            }
            Ok(true)
        })();

        match step {
            Ok(keep_going) => keep_going,
            Err(e) => {
                err = Some(e);
                false
            }
        }
    });

    if let Some(e) = err {
        return Err(e);
    }
    if !complete {
        return Err(ParseError::new("truncated cpu line"));
    }
    Ok(())
}

/// Parses the running total that follows the line label, ignoring the
/// per-source breakdown behind it.
fn parse_counter_line(line: &str, what: &str) -> Result<u64, ParseError> {
    let mut err = None;
    let mut value = None;

    tokenize_stat_line(line, |idx, token| {
        if idx == COUNTER_IDX_TOTAL {
            match parse_num(token, what) {
                Ok(v) => value = Some(v),
                Err(e) => err = Some(e),
            }
            return false;
        }
        true
    });

    if let Some(e) = err {
        return Err(e);
    }
    value.ok_or_else(|| ParseError::new(format!("truncated {} line", what)))
}

/// Populates the ram fields of `stats` from the content of
/// `/proc/meminfo` and stops once the three names of interest were seen.
///
/// The historical trace format wires `MemFree` to `ramavailable` and
/// `MemAvailable` to `ramfree`. Readers depend on that wiring, so it is
/// kept despite what the names suggest.
pub fn parse_meminfo(content: &str, stats: &mut SystemStats) -> Result<(), ParseError> {
    let mut seen_total = false;
    let mut seen_free = false;
    let mut seen_available = false;

    for line in content.lines() {
        if seen_total && seen_free && seen_available {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let (name, value) = parse_meminfo_line(line)?;
        match name {
            "MemTotal" => {
                if seen_total {
                    warn!("Parameter 'MemTotal' already fetched");
                } else {
                    stats.ram_total = value;
                    seen_total = true;
                }
            }
            "MemFree" => {
                if seen_free {
                    warn!("Parameter 'MemFree' already fetched");
                } else {
                    stats.ram_available = value;
                    seen_free = true;
                }
            }
            "MemAvailable" => {
                if seen_available {
                    warn!("Parameter 'MemAvailable' already fetched");
                } else {
                    stats.ram_free = value;
                    seen_available = true;
                }
            }
            _ => {}
        }
    }

    if !(seen_total && seen_free && seen_available) {
        return Err(ParseError::new(
            "meminfo missing MemTotal, MemFree or MemAvailable",
        ));
    }
    Ok(())
}

/// Parses one `Name: value [unit]` line into the name and the value scaled
/// to bytes. A unit must be preceded by exactly one space and must come
/// from the unit table; no unit means scale 1.
fn parse_meminfo_line(line: &str) -> Result<(&str, u64), ParseError> {
    let (name, rest) = line
        .split_once(':')
        .ok_or_else(|| ParseError::new(format!("meminfo line without ':': '{}'", line)))?;

    let rest = rest.trim_start_matches(' ');
    let num_end = rest
        .find(|c: char| !(c.is_ascii_digit() || c == '-'))
        .unwrap_or(rest.len());
    let (num, tail) = rest.split_at(num_end);

    let v: i64 = num
        .parse()
        .map_err(|_| ParseError::new(format!("invalid meminfo value: '{}'", line)))?;

    let value = if tail.is_empty() {
        v
    } else {
        let unit = tail.strip_prefix(' ').ok_or_else(|| {
            ParseError::new(format!("unit not separated by a single space: '{}'", line))
        })?;
        let scale = unit_scale(unit)
            .ok_or_else(|| ParseError::new(format!("unsupported unit '{}'", unit)))?;
        v * scale
    };

    Ok((name, value as u64))
}

fn unit_scale(unit: &str) -> Option<i64> {
    match unit {
        "kB" => Some(1024),
        _ => None,
    }
}
