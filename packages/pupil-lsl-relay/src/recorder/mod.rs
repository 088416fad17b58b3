// Per-stream recorder
//
// A recorder owns one inlet and one sink. It never spawns work of its own:
// the host calls `record_available_data` once per tick, which re-measures the
// clock offset and drains every buffered chunk into the sink.

pub mod audio;
pub mod csv;

use crate::clock::{ClockSync, HostClock};
use crate::config::AudioSettings;
use crate::error::{RelayError, RelayResult};
use crate::transport::{Inlet, Transport};
use crate::types::{Chunk, StreamDescriptor};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub use self::audio::{AudioEncoder, AudioFrame, AudioSink, WavEncoder};
pub use self::csv::CsvSink;

/// Lifecycle of a recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecorderState {
    Connecting,
    Streaming,
    Closing,
    Closed,
}

/// Destination of drained samples
pub trait SampleSink: Send {
    /// Write every sample of `chunk`, shifting timestamps by `offset`.
    /// Returns the number of samples consumed.
    fn write_chunk(&mut self, chunk: &Chunk, offset: f64) -> RelayResult<usize>;

    /// Flush and release the output. Safe to call more than once.
    fn close(&mut self) -> RelayResult<SinkSummary>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SinkSummary {
    pub files: Vec<PathBuf>,
    /// Rows or audio frames written
    pub written: usize,
    /// Audio frames dropped by the encode pipeline
    pub dropped: usize,
}

/// Sink strategy chosen per recorded stream
#[derive(Debug, Clone, PartialEq)]
pub enum SinkKind {
    Csv,
    Audio(AudioSettings),
}

impl SinkKind {
    pub fn open(&self, dir: &Path, descriptor: &StreamDescriptor) -> RelayResult<Box<dyn SampleSink>> {
        match self {
            SinkKind::Csv => Ok(Box::new(CsvSink::create(dir, descriptor)?)),
            SinkKind::Audio(settings) => Ok(Box::new(AudioSink::create(dir, descriptor, settings)?)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecorderStats {
    pub samples_written: usize,
    pub ticks: usize,
    pub lost_connection: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecorderSummary {
    pub label: String,
    pub samples_written: usize,
    pub ticks: usize,
    pub lost_connection: bool,
    pub sink: SinkSummary,
}

pub struct StreamRecorder {
    descriptor: StreamDescriptor,
    label: String,
    transport: Arc<dyn Transport>,
    host_clock: HostClock,
    inlet: Box<dyn Inlet>,
    sink: Box<dyn SampleSink>,
    clock: ClockSync,
    state: RecorderState,
    stats: RecorderStats,
    summary: Option<RecorderSummary>,
}

impl StreamRecorder {
    /// Connect to `descriptor` and start recording into `dir`.
    ///
    /// Fails with `ConnectTimeout` when the source does not answer within
    /// `timeout` seconds. On success one drain has already been performed.
    pub fn open(
        transport: Arc<dyn Transport>,
        descriptor: &StreamDescriptor,
        dir: &Path,
        kind: &SinkKind,
        host_clock: HostClock,
        timeout: f64,
    ) -> RelayResult<Self> {
        let label = descriptor.label();
        log::debug!("Connecting to {} ({:?})", label, RecorderState::Connecting);

        let mut inlet = transport.open_inlet(descriptor, timeout)?;
        let full_descriptor = inlet.info(timeout)?;
        match inlet.time_correction(timeout) {
            Ok(correction) => log::debug!("Initial time correction for {}: {}", label, correction),
            Err(e) if e.is_transient() => log::warn!("{}", e),
            Err(e) => return Err(e),
        }
        inlet.open_stream(timeout)?;

        let sink = match kind.open(dir, &full_descriptor) {
            Ok(sink) => sink,
            Err(e) => {
                inlet.close_stream();
                return Err(e);
            }
        };

        log::info!(
            "Recording {} with {} channels",
            label,
            full_descriptor.channel_count
        );

        let mut recorder = Self {
            descriptor: full_descriptor,
            label,
            transport,
            host_clock,
            inlet,
            sink,
            clock: ClockSync::new(timeout),
            state: RecorderState::Streaming,
            stats: RecorderStats::default(),
            summary: None,
        };
        recorder.record_available_data();
        Ok(recorder)
    }

    /// Drain everything currently buffered. Returns the number of samples
    /// written during this tick.
    ///
    /// A lost connection closes the recorder instead of failing.
    pub fn record_available_data(&mut self) -> usize {
        if self.state != RecorderState::Streaming {
            return 0;
        }
        let written = self.drain();
        if self.stats.lost_connection {
            if let Err(e) = self.close() {
                log::error!("Failed to close recorder of {}: {}", self.label, e);
            }
        }
        written
    }

    fn drain(&mut self) -> usize {
        self.stats.ticks += 1;

        let host_now = (self.host_clock)();
        let bus_now = self.transport.local_clock();
        let offset = match self.clock.resync(host_now, bus_now, self.inlet.as_mut()) {
            Ok(offset) => offset,
            Err(e) => {
                self.handle_inlet_error(e);
                return 0;
            }
        };

        let mut written = 0;
        loop {
            let chunk = match self.inlet.pull_chunk() {
                Ok(chunk) if chunk.is_empty() => break,
                Ok(chunk) => chunk,
                Err(e) => {
                    self.handle_inlet_error(e);
                    break;
                }
            };
            match self.sink.write_chunk(&chunk, offset) {
                Ok(count) => written += count,
                Err(e) => log::error!("Failed to write chunk of {}: {}", self.label, e),
            }
        }

        self.stats.samples_written += written;
        written
    }

    fn handle_inlet_error(&mut self, error: RelayError) {
        if error.is_stream_loss() {
            log::warn!("Lost connection to {}", self.label);
            self.stats.lost_connection = true;
        } else {
            log::warn!("{}: {}", self.label, error);
        }
    }

    /// Final drain, then release the inlet and close the sink.
    ///
    /// Closing an already closed recorder returns the first summary again.
    pub fn close(&mut self) -> RelayResult<RecorderSummary> {
        match self.state {
            RecorderState::Closed => {
                return self.summary.clone().ok_or_else(|| {
                    RelayError::InvalidState(format!("{} failed to close", self.label))
                })
            }
            RecorderState::Closing => {
                return Err(RelayError::InvalidState(format!(
                    "{} is already closing",
                    self.label
                )))
            }
            RecorderState::Connecting | RecorderState::Streaming => {}
        }

        self.state = RecorderState::Closing;
        if !self.stats.lost_connection {
            self.drain();
        }
        self.inlet.close_stream();
        let sink = self.sink.close();
        self.state = RecorderState::Closed;

        let summary = RecorderSummary {
            label: self.label.clone(),
            samples_written: self.stats.samples_written,
            ticks: self.stats.ticks,
            lost_connection: self.stats.lost_connection,
            sink: sink?,
        };
        log::info!(
            "Stopped recording {}: {} samples",
            self.label,
            summary.samples_written
        );
        self.summary = Some(summary.clone());
        Ok(summary)
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state == RecorderState::Closed
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    pub fn stats(&self) -> RecorderStats {
        self.stats
    }

    pub fn last_offset(&self) -> Option<f64> {
        self.clock.last_offset()
    }
}
