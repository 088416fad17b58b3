// In-process stream bus
//
// Sources are registered by hand and fed with queued chunks; every pull hands
// out the next queued chunk, or an empty one once the queue is exhausted.
// Outlets created on the bus become sources themselves, so relayed samples can
// be read back by an inlet or inspected directly.

use super::{Inlet, OutletHandle, ResolveFilter, StreamResolver, Transport};
use crate::error::{RelayError, RelayResult};
use crate::types::{Chunk, StreamDescriptor};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

#[derive(Debug, Default)]
struct SourceState {
    descriptor: Option<StreamDescriptor>,
    pending: VecDeque<Chunk>,
    time_correction: f64,
    refuse_connections: bool,
    correction_timeouts: usize,
    lost: bool,
    opened_streams: usize,
    closed_streams: usize,
    pushed: Vec<(Vec<f64>, f64)>,
}

#[derive(Debug, Default)]
struct BusState {
    clock: f64,
    sources: BTreeMap<String, SourceState>,
}

impl BusState {
    fn source(&mut self, source_id: &str) -> &mut SourceState {
        self.sources.entry(source_id.to_string()).or_default()
    }
}

/// Deterministic in-memory [`Transport`]
#[derive(Debug, Clone, Default)]
pub struct MemoryBus {
    state: Arc<Mutex<BusState>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_clock(&self, now: f64) {
        self.state.lock().clock = now;
    }

    /// Make a source visible to resolvers
    pub fn add_source(&self, descriptor: StreamDescriptor) {
        let mut state = self.state.lock();
        let source = state.source(&descriptor.source_id);
        source.descriptor = Some(descriptor);
        source.lost = false;
    }

    /// Hide a source. Open inlets report the connection as lost.
    pub fn remove_source(&self, source_id: &str) {
        let mut state = self.state.lock();
        let source = state.source(source_id);
        source.descriptor = None;
        source.lost = true;
    }

    /// Queue the result of one future pull
    pub fn queue_chunk(&self, source_id: &str, chunk: Chunk) {
        self.state.lock().source(source_id).pending.push_back(chunk);
    }

    pub fn set_time_correction(&self, source_id: &str, correction: f64) {
        self.state.lock().source(source_id).time_correction = correction;
    }

    /// Connection attempts to the source time out while set
    pub fn refuse_connections(&self, source_id: &str, refuse: bool) {
        self.state.lock().source(source_id).refuse_connections = refuse;
    }

    /// The next `count` time correction probes time out
    pub fn time_out_corrections(&self, source_id: &str, count: usize) {
        self.state.lock().source(source_id).correction_timeouts = count;
    }

    /// Drop the connection without hiding the source
    pub fn lose_connection(&self, source_id: &str) {
        self.state.lock().source(source_id).lost = true;
    }

    /// Samples pushed to the outlet announced with `source_id`
    pub fn pushed_samples(&self, source_id: &str) -> Vec<(Vec<f64>, f64)> {
        self.state
            .lock()
            .sources
            .get(source_id)
            .map(|s| s.pushed.clone())
            .unwrap_or_default()
    }

    /// Number of chunks still queued for the source
    pub fn pending_chunks(&self, source_id: &str) -> usize {
        self.state
            .lock()
            .sources
            .get(source_id)
            .map_or(0, |s| s.pending.len())
    }

    pub fn opened_streams(&self, source_id: &str) -> usize {
        self.state
            .lock()
            .sources
            .get(source_id)
            .map_or(0, |s| s.opened_streams)
    }

    pub fn closed_streams(&self, source_id: &str) -> usize {
        self.state
            .lock()
            .sources
            .get(source_id)
            .map_or(0, |s| s.closed_streams)
    }
}

impl Transport for MemoryBus {
    fn local_clock(&self) -> f64 {
        self.state.lock().clock
    }

    fn resolver(&self, filter: ResolveFilter) -> Box<dyn StreamResolver> {
        Box::new(MemoryResolver {
            state: Arc::clone(&self.state),
            filter,
        })
    }

    fn open_inlet(
        &self,
        descriptor: &StreamDescriptor,
        timeout: f64,
    ) -> RelayResult<Box<dyn Inlet>> {
        let mut state = self.state.lock();
        let source = state.source(&descriptor.source_id);
        if source.refuse_connections || source.descriptor.is_none() {
            return Err(RelayError::ConnectTimeout {
                label: descriptor.label(),
                timeout_secs: timeout,
            });
        }
        Ok(Box::new(MemoryInlet {
            state: Arc::clone(&self.state),
            source_id: descriptor.source_id.clone(),
            label: descriptor.label(),
            open: false,
        }))
    }

    fn create_outlet(&self, descriptor: &StreamDescriptor) -> RelayResult<Box<dyn OutletHandle>> {
        self.add_source(descriptor.clone());
        Ok(Box::new(MemoryOutlet {
            state: Arc::clone(&self.state),
            descriptor: descriptor.clone(),
        }))
    }
}

struct MemoryResolver {
    state: Arc<Mutex<BusState>>,
    filter: ResolveFilter,
}

impl StreamResolver for MemoryResolver {
    fn results(&mut self) -> Vec<StreamDescriptor> {
        self.state
            .lock()
            .sources
            .values()
            .filter_map(|s| s.descriptor.as_ref())
            .filter(|d| self.filter.matches(d))
            .cloned()
            .collect()
    }
}

struct MemoryInlet {
    state: Arc<Mutex<BusState>>,
    source_id: String,
    label: String,
    open: bool,
}

impl MemoryInlet {
    fn lost(&self) -> RelayError {
        RelayError::ConnectionLost(self.label.clone())
    }
}

impl Inlet for MemoryInlet {
    fn info(&mut self, _timeout: f64) -> RelayResult<StreamDescriptor> {
        let mut state = self.state.lock();
        let source = state.source(&self.source_id);
        match (&source.descriptor, source.lost) {
            (Some(descriptor), false) => Ok(descriptor.clone()),
            _ => Err(self.lost()),
        }
    }

    fn time_correction(&mut self, timeout: f64) -> RelayResult<f64> {
        let mut state = self.state.lock();
        let source = state.source(&self.source_id);
        if source.lost {
            return Err(self.lost());
        }
        if source.correction_timeouts > 0 {
            source.correction_timeouts -= 1;
            return Err(RelayError::CorrectionTimeout {
                label: self.label.clone(),
                timeout_secs: timeout,
            });
        }
        Ok(source.time_correction)
    }

    fn open_stream(&mut self, timeout: f64) -> RelayResult<()> {
        let mut state = self.state.lock();
        let source = state.source(&self.source_id);
        if source.refuse_connections {
            return Err(RelayError::ConnectTimeout {
                label: self.label.clone(),
                timeout_secs: timeout,
            });
        }
        source.opened_streams += 1;
        self.open = true;
        Ok(())
    }

    fn pull_chunk(&mut self) -> RelayResult<Chunk> {
        let mut state = self.state.lock();
        let source = state.source(&self.source_id);
        if source.lost {
            return Err(self.lost());
        }
        Ok(source.pending.pop_front().unwrap_or_else(Chunk::empty))
    }

    fn close_stream(&mut self) {
        if self.open {
            self.open = false;
            self.state.lock().source(&self.source_id).closed_streams += 1;
        }
    }
}

struct MemoryOutlet {
    state: Arc<Mutex<BusState>>,
    descriptor: StreamDescriptor,
}

impl OutletHandle for MemoryOutlet {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    fn push_sample(&mut self, sample: &[f64], timestamp: f64) -> RelayResult<()> {
        if sample.len() != self.descriptor.channel_count {
            return Err(RelayError::Transport(format!(
                "{} expects {} channels, got {}",
                self.descriptor.name,
                self.descriptor.channel_count,
                sample.len()
            )));
        }
        let mut state = self.state.lock();
        let source = state.source(&self.descriptor.source_id);
        source.pushed.push((sample.to_vec(), timestamp));
        source
            .pending
            .push_back(Chunk::numeric(vec![sample.to_vec()], vec![timestamp]));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChannelFormat;

    fn eeg() -> StreamDescriptor {
        StreamDescriptor::new("eeg-1", "eeg", "EEG", "lab-pc", 2, 250.0, ChannelFormat::Float32)
    }

    #[test]
    fn test_pull_hands_out_queued_chunks_then_empty() {
        let bus = MemoryBus::new();
        bus.add_source(eeg());
        bus.queue_chunk("eeg-1", Chunk::numeric(vec![vec![1.0, 2.0]], vec![0.5]));

        let mut inlet = bus.open_inlet(&eeg(), 1.0).unwrap();
        inlet.open_stream(1.0).unwrap();
        assert_eq!(inlet.pull_chunk().unwrap().len(), 1);
        assert!(inlet.pull_chunk().unwrap().is_empty());

        inlet.close_stream();
        inlet.close_stream();
        assert_eq!(bus.closed_streams("eeg-1"), 1);
    }

    #[test]
    fn test_refused_connection_times_out() {
        let bus = MemoryBus::new();
        bus.add_source(eeg());
        bus.refuse_connections("eeg-1", true);

        let err = bus.open_inlet(&eeg(), 1.5).err().unwrap();
        assert!(matches!(err, RelayError::ConnectTimeout { timeout_secs, .. } if timeout_secs == 1.5));
    }

    #[test]
    fn test_removed_source_disappears_and_loses_inlets() {
        let bus = MemoryBus::new();
        bus.add_source(eeg());
        let mut resolver = bus.resolver(ResolveFilter::All);
        let mut inlet = bus.open_inlet(&eeg(), 1.0).unwrap();
        assert_eq!(resolver.results().len(), 1);

        bus.remove_source("eeg-1");
        assert!(resolver.results().is_empty());
        assert!(inlet.pull_chunk().unwrap_err().is_stream_loss());
    }

    #[test]
    fn test_outlet_samples_are_readable() {
        let bus = MemoryBus::new();
        let descriptor =
            StreamDescriptor::new("uuid-1", "pupil_capture", "Gaze", "lab-pc", 2, 0.0, ChannelFormat::Double64);
        let mut outlet = bus.create_outlet(&descriptor).unwrap();
        outlet.push_sample(&[0.1, 0.2], 3.0).unwrap();
        assert!(outlet.push_sample(&[0.1], 3.1).is_err());

        assert_eq!(bus.pushed_samples("uuid-1"), vec![(vec![0.1, 0.2], 3.0)]);
        assert_eq!(bus.pending_chunks("uuid-1"), 1);
        let found = bus.resolver(ResolveFilter::Type("Gaze".into())).results();
        assert_eq!(found[0].name, "pupil_capture");
    }
}
