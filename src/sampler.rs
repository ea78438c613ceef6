//! The periodic sampler driving every acquirer.
//!
//! On each tick the sampler fast-reads every open proc descriptor in one
//! tight burst, timestamps the burst, and only then decodes the buffers
//! and hands typed records to the observer. The split keeps the relative
//! skew between counters bounded by the cost of the reads, not by
//! serialization.

use std::path::PathBuf;
use std::time::Duration;

use mio::Token;
use tracing::{debug, warn};

use crate::collector::raw::monotonic_ns;
use crate::collector::traits::ProcFs;
use crate::collector::{ProcessCollector, SystemCollector, list_pids};
use crate::error::Error;
use crate::event_loop::{AbortHandle, EventLoop};
use crate::model::{AcquisitionDuration, ProcessStats, SystemConfig, SystemStats, ThreadStats};
use crate::timer::Timer;

const TICK_TOKEN: Token = Token(1);
const DEADLINE_TOKEN: Token = Token(2);

/// Receiver of the records decoded during one tick.
///
/// Every method has a no-op default, so an observer only implements the
/// records it cares about. Within a tick the calls arrive in a fixed
/// order: `results_begin`, the system stats, then each process followed by
/// its threads in insertion order, then `results_end`.
pub trait Observer {
    fn system_stats(&mut self, _stats: &SystemStats) {}
    fn process_stats(&mut self, _stats: &ProcessStats) {}
    fn thread_stats(&mut self, _stats: &ThreadStats) {}
    fn results_begin(&mut self, _duration: &AcquisitionDuration) {}
    fn results_end(&mut self) {}
}

/// Sampler configuration, fixed at construction apart from the period.
#[derive(Debug, Clone)]
pub struct SamplerConfig {
    /// Acquisition period in seconds. Must be positive.
    pub period_secs: u32,
    /// Record per-thread stats next to each process.
    pub record_threads: bool,
    /// Base path of the proc filesystem.
    pub proc_root: PathBuf,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            period_secs: 1,
            record_threads: true,
            proc_root: PathBuf::from("/proc"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Stopped,
    Started,
}

/// Owner of the reactor, the acquisition period and every acquirer.
pub struct Sampler<F: ProcFs> {
    state: State,
    event_loop: EventLoop,
    config: SamplerConfig,
    sys_config: SystemConfig,
    fs: F,
    system: SystemCollector<F>,
    processes: Vec<ProcessCollector<F>>,
    tick_timer: Timer,
    deadline_timer: Timer,
}

impl<F: ProcFs> Sampler<F> {
    pub fn new(event_loop: EventLoop, config: SamplerConfig, fs: F) -> Result<Self, Error> {
        if config.period_secs == 0 {
            return Err(Error::InvalidArgument("period must be positive"));
        }

        let system = SystemCollector::new(fs.clone(), config.proc_root.clone());
        Ok(Self {
            state: State::Stopped,
            event_loop,
            config,
            sys_config: SystemConfig::detect(),
            fs,
            system,
            processes: Vec::new(),
            tick_timer: Timer::new(),
            deadline_timer: Timer::new(),
        })
    }

    /// Calibration constants of the running system.
    pub fn system_config(&self) -> &SystemConfig {
        &self.sys_config
    }

    /// Handle that stops [`Sampler::run`] from any thread.
    pub fn abort_handle(&self) -> AbortHandle {
        self.event_loop.abort_handle()
    }

    /// Adds a by-name watch. Only legal while stopped.
    pub fn add_process_by_name(&mut self, name: &str) -> Result<(), Error> {
        if self.state == State::Started {
            return Err(Error::InvalidArgument(
                "processes must be added while stopped",
            ));
        }

        self.processes.push(ProcessCollector::by_name(
            self.fs.clone(),
            self.config.proc_root.clone(),
            name,
            self.config.record_threads,
        ));
        Ok(())
    }

    /// Initializes the watch set. With no process added yet, one by-pid
    /// collector is created per pid currently present, then every
    /// collector resolves and opens its target. Per-process failures are
    /// logged and localized.
    pub fn load_processes(&mut self) -> Result<(), Error> {
        if self.processes.is_empty() {
            for pid in list_pids(&self.fs, &self.config.proc_root)? {
                self.processes.push(ProcessCollector::by_pid(
                    self.fs.clone(),
                    self.config.proc_root.clone(),
                    pid,
                    self.config.record_threads,
                ));
            }
        }

        for process in &mut self.processes {
            if let Err(e) = process.init() {
                debug!("Process init failed: {}", e);
            }
        }

        Ok(())
    }

    /// Updates the acquisition period, re-arming the timer when started.
    pub fn set_period(&mut self, period_secs: u32) -> Result<(), Error> {
        if period_secs == 0 {
            return Err(Error::InvalidArgument("period must be positive"));
        }

        self.config.period_secs = period_secs;
        if self.state == State::Started {
            self.arm_tick_timer()?;
        }
        Ok(())
    }

    fn arm_tick_timer(&mut self) -> Result<(), Error> {
        self.tick_timer.arm_periodic(
            &self.event_loop,
            TICK_TOKEN,
            Duration::from_secs(u64::from(self.config.period_secs)),
        )
    }

    /// Starts acquisition: opens the system pseudo-files, arms the
    /// periodic timer and performs one immediate tick.
    pub fn start(&mut self, observer: &mut dyn Observer) -> Result<(), Error> {
        if self.state == State::Started {
            return Err(Error::AlreadyOpen);
        }

        self.system.init();
        self.arm_tick_timer()?;
        self.tick(observer);
        self.state = State::Started;
        Ok(())
    }

    /// Disarms the timer and leaves acquisition.
    pub fn stop(&mut self) -> Result<(), Error> {
        if self.state == State::Stopped {
            return Err(Error::NotOpen);
        }

        self.tick_timer.disarm()?;
        self.state = State::Stopped;
        Ok(())
    }

    /// Runs until aborted or, when `duration` is given, until it elapses.
    pub fn run(
        &mut self,
        observer: &mut dyn Observer,
        duration: Option<Duration>,
    ) -> Result<(), Error> {
        self.start(observer)?;

        if let Some(duration) = duration {
            self.deadline_timer
                .arm_oneshot(&self.event_loop, DEADLINE_TOKEN, duration)?;
        }

        'poll: while !self.event_loop.aborted() {
            let tokens = self.event_loop.wait(None)?;
            for token in tokens {
                match token {
                    TICK_TOKEN => {
                        debug!("Start new acquisition");
                        self.tick_timer.drain();
                        self.tick(observer);
                    }
                    DEADLINE_TOKEN => {
                        self.deadline_timer.drain();
                        debug!("Recording duration elapsed");
                        break 'poll;
                    }
                    other => warn!("Unexpected readiness token {:?}", other),
                }
            }
        }

        self.stop()
    }

    /// One acquisition: the fast-read burst, timestamped, then decode and
    /// emission. A tick is never interrupted between its steps.
    fn tick(&mut self, observer: &mut dyn Observer) {
        let start = monotonic_ns();

        self.system.read_raw();
        for process in &mut self.processes {
            process.read_raw();
        }

        let end = monotonic_ns();
        let duration = AcquisitionDuration { start, end };

        observer.results_begin(&duration);

        self.system.decode(observer);
        for process in &mut self.processes {
            process.decode(observer);
        }

        observer.results_end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::AcqState;
    use crate::collector::mock::MockFs;

    const STAT: &str = "cpu  10 20 30 40 50 60 70 0 0 0\nintr 111 1\nsoftirq 222 1\nctxt 333\n";
    const MEMINFO: &str = "MemTotal: 1024 kB\nMemFree: 200 kB\nMemAvailable: 512 kB\n";

    /// Records the emission order as flat event labels.
    #[derive(Default)]
    struct EventLog {
        events: Vec<String>,
    }

    impl Observer for EventLog {
        fn system_stats(&mut self, _stats: &SystemStats) {
            self.events.push("system".to_string());
        }
        fn process_stats(&mut self, stats: &ProcessStats) {
            self.events.push(format!("process {}", stats.pid));
        }
        fn thread_stats(&mut self, stats: &ThreadStats) {
            self.events.push(format!("thread {}", stats.tid));
        }
        fn results_begin(&mut self, duration: &AcquisitionDuration) {
            assert!(duration.end >= duration.start);
            self.events.push("duration".to_string());
        }
        fn results_end(&mut self) {
            self.events.push("end".to_string());
        }
    }

    fn scripted_fs() -> MockFs {
        let fs = MockFs::new();
        fs.add_file("/proc/stat", STAT);
        fs.add_file("/proc/meminfo", MEMINFO);
        fs.add_process(
            42,
            "42 (svc) S 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 2 7 8 1000 10 0",
        );
        fs.add_task(42, 42, "42 (svc) S 1 2 3 4 5 6 7 8 9 0 1 2");
        fs.add_task(42, 43, "43 (svc-w) S 1 2 3 4 5 6 7 8 9 0 1 2");
        fs
    }

    fn new_sampler(fs: MockFs) -> Sampler<MockFs> {
        Sampler::new(
            EventLoop::new().unwrap(),
            SamplerConfig::default(),
            fs,
        )
        .unwrap()
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = SamplerConfig {
            period_secs: 0,
            ..SamplerConfig::default()
        };
        assert!(Sampler::new(EventLoop::new().unwrap(), config, MockFs::new()).is_err());
    }

    #[test]
    fn test_tick_emission_order() {
        let fs = scripted_fs();
        let mut sampler = new_sampler(fs);
        sampler.add_process_by_name("svc").unwrap();
        sampler.load_processes().unwrap();

        let mut log = EventLog::default();
        sampler.start(&mut log).unwrap();

        assert_eq!(
            log.events,
            [
                "duration",
                "system",
                "process 42",
                "thread 42",
                "thread 43",
                "end",
            ]
        );

        sampler.stop().unwrap();
    }

    #[test]
    fn test_load_processes_covers_all_pids() {
        let fs = scripted_fs();
        fs.add_process(
            50,
            "50 (other) S 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 1 7 8 2000 20 0",
        );
        fs.add_task(50, 50, "50 (other) S 1 2 3 4 5 6 7 8 9 0 1 2");

        let mut sampler = new_sampler(fs);
        sampler.load_processes().unwrap();
        assert_eq!(sampler.processes.len(), 2);

        let mut log = EventLog::default();
        sampler.start(&mut log).unwrap();

        assert!(log.events.contains(&"process 42".to_string()));
        assert!(log.events.contains(&"process 50".to_string()));
    }

    #[test]
    fn test_vanished_by_pid_still_emits_system_stats() {
        let fs = scripted_fs();
        let mut sampler = new_sampler(fs.clone());
        sampler.load_processes().unwrap();

        // The process dies between init and the first tick.
        fs.remove_process(42);

        let mut log = EventLog::default();
        sampler.start(&mut log).unwrap();

        assert_eq!(log.events, ["duration", "system", "end"]);
        assert_eq!(sampler.processes[0].state(), AcqState::Failed);

        // A further tick does not resurrect it.
        log.events.clear();
        sampler.tick(&mut log);
        assert_eq!(log.events, ["duration", "system", "end"]);
    }

    #[test]
    fn test_add_process_while_started_is_rejected() {
        let fs = scripted_fs();
        let mut sampler = new_sampler(fs);
        sampler.load_processes().unwrap();

        let mut log = EventLog::default();
        sampler.start(&mut log).unwrap();
        assert!(sampler.add_process_by_name("late").is_err());
        sampler.stop().unwrap();
        sampler.add_process_by_name("late").unwrap();
    }

    #[test]
    fn test_set_period_in_both_states() {
        let fs = scripted_fs();
        let mut sampler = new_sampler(fs);
        sampler.load_processes().unwrap();

        sampler.set_period(5).unwrap();
        assert!(sampler.set_period(0).is_err());

        let mut log = EventLog::default();
        sampler.start(&mut log).unwrap();
        sampler.set_period(2).unwrap();
        sampler.stop().unwrap();
    }

    #[test]
    fn test_double_start_and_stop_rejected() {
        let fs = scripted_fs();
        let mut sampler = new_sampler(fs);
        sampler.load_processes().unwrap();

        let mut log = EventLog::default();
        sampler.start(&mut log).unwrap();
        assert!(matches!(sampler.start(&mut log), Err(Error::AlreadyOpen)));
        sampler.stop().unwrap();
        assert!(matches!(sampler.stop(), Err(Error::NotOpen)));
    }

    #[test]
    fn test_run_stops_after_duration() {
        let fs = scripted_fs();
        let mut sampler = new_sampler(fs);
        sampler.load_processes().unwrap();

        let mut log = EventLog::default();
        sampler
            .run(&mut log, Some(Duration::from_millis(30)))
            .unwrap();

        // At least the immediate tick ran, and the loop came back.
        assert!(log.events.iter().filter(|e| *e == "duration").count() >= 1);
    }

    #[test]
    fn test_run_stops_on_abort() {
        let fs = scripted_fs();
        let mut sampler = new_sampler(fs);
        sampler.load_processes().unwrap();

        let abort = sampler.abort_handle();
        let aborter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            abort.abort();
        });

        let mut log = EventLog::default();
        sampler.run(&mut log, None).unwrap();
        aborter.join().unwrap();

        assert!(log.events.iter().any(|e| e == "system"));
    }
}
