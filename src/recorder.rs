//! Trace recorder: writes the self-describing header and appends one
//! record per observed sample.

use std::path::{Path, PathBuf};

use tracing::error;

use crate::error::Error;
use crate::model::{AcquisitionDuration, ProcessStats, SystemStats, ThreadStats};
use crate::sampler::Observer;
use crate::sink::{FileSink, Sink};
use crate::trace::{FORMAT_VERSION, Record, RecordBuf, Registry};

/// Picks the first free `<base>-NN.log`, NN running 00 to 99.
pub fn pick_output_path(base: &str) -> Result<PathBuf, Error> {
    for n in 0..100 {
        let path = PathBuf::from(format!("{}-{:02}.log", base, n));
        if !path.exists() {
            return Ok(path);
        }
    }
    Err(Error::NotFound)
}

/// Writes records of registered types into a sink.
///
/// Creating the recorder writes the trace header, so every record type
/// must be registered before that. Each record is serialized into a
/// scratch buffer and handed to the sink in a single write; a failed
/// record aborts that record only and the trace stays structurally
/// sound, merely truncated.
pub struct Recorder<S: Sink> {
    sink: S,
    registry: Registry,
    scratch: Vec<u8>,
}

impl<S: Sink> Recorder<S> {
    pub fn new(sink: S, registry: Registry) -> Result<Self, Error> {
        let mut recorder = Self {
            sink,
            registry,
            scratch: Vec::with_capacity(256),
        };
        recorder.write_header()?;
        Ok(recorder)
    }

    fn write_header(&mut self) -> Result<(), Error> {
        self.scratch.clear();
        let mut buf = RecordBuf::new(&mut self.scratch);

        buf.put_u8(FORMAT_VERSION);
        // Compression is reserved and always off.
        buf.put_u8(0);
        buf.put_u8(self.registry.len() as u8);

        for entry in self.registry.entries() {
            buf.put_u8(entry.id);
            buf.put_str(entry.name)?;
            entry.desc.write_desc(&mut buf)?;
        }

        self.sink.write(&self.scratch)?;
        Ok(())
    }

    /// Appends one record: the type id byte, then the fields in
    /// descriptor order.
    pub fn record<T: Record>(&mut self, value: &T) -> Result<(), Error> {
        let id = self.registry.id_of::<T>()?;

        self.scratch.clear();
        let mut buf = RecordBuf::new(&mut self.scratch);
        buf.put_u8(id);
        value.encode(&mut buf)?;

        self.sink.write(&self.scratch)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        self.sink.flush()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl Recorder<FileSink> {
    /// Opens `path` and writes the header.
    pub fn create(path: &Path, registry: Registry) -> Result<Self, Error> {
        Self::new(FileSink::create(path)?, registry)
    }
}

/// The recorder is the conventional observer: every sample becomes one
/// record, in the delivery order of the tick. Failures are reported and
/// the tick proceeds with the remaining records.
impl<S: Sink> Observer for Recorder<S> {
    fn system_stats(&mut self, stats: &SystemStats) {
        if let Err(e) = self.record(stats) {
            error!("record() failed: {}", e);
        }
    }

    fn process_stats(&mut self, stats: &ProcessStats) {
        if let Err(e) = self.record(stats) {
            error!("record() failed: {}", e);
        }
    }

    fn thread_stats(&mut self, stats: &ThreadStats) {
        if let Err(e) = self.record(stats) {
            error!("record() failed: {}", e);
        }
    }

    fn results_begin(&mut self, duration: &AcquisitionDuration) {
        if let Err(e) = self.record(duration) {
            error!("record() failed: {}", e);
        }
    }
}
