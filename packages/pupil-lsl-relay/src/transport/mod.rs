// Stream transport boundary
//
// The recorder, relay and discovery code only talk to the network bus through
// the traits in this module. Two implementations ship with the crate:
// - `memory::MemoryBus`, an in-process bus for hosts without LSL and for tests
// - `lsl::LslTransport`, the Lab Streaming Layer binding (feature `lsl-support`)
//
// Timeouts are given in seconds, as LSL does.

use crate::error::RelayResult;
use crate::types::{Chunk, StreamDescriptor};

pub mod memory;

#[cfg(feature = "lsl-support")]
pub mod lsl;

/// Selects which streams a resolver reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveFilter {
    All,
    /// Only streams of the given content type, e.g. `Audio`
    Type(String),
}

impl ResolveFilter {
    pub fn matches(&self, descriptor: &StreamDescriptor) -> bool {
        match self {
            ResolveFilter::All => true,
            ResolveFilter::Type(stream_type) => &descriptor.stream_type == stream_type,
        }
    }
}

/// Access to a stream bus
pub trait Transport: Send + Sync {
    /// The bus reference clock in seconds
    fn local_clock(&self) -> f64;

    /// Continuous resolver for streams matching `filter`
    fn resolver(&self, filter: ResolveFilter) -> Box<dyn StreamResolver>;

    /// Connect to a source. Fails with `ConnectTimeout` when the source does
    /// not answer within `timeout`.
    fn open_inlet(&self, descriptor: &StreamDescriptor, timeout: f64)
        -> RelayResult<Box<dyn Inlet>>;

    /// Announce a new stream
    fn create_outlet(&self, descriptor: &StreamDescriptor) -> RelayResult<Box<dyn OutletHandle>>;
}

/// Snapshot source of currently visible streams
pub trait StreamResolver: Send {
    /// Streams visible right now. An unreachable bus yields an empty list.
    fn results(&mut self) -> Vec<StreamDescriptor>;
}

/// Pull connection to one source
pub trait Inlet: Send {
    /// Full stream description, including channel metadata
    fn info(&mut self, timeout: f64) -> RelayResult<StreamDescriptor>;

    /// Estimated offset to add to source timestamps to map them to the
    /// local bus clock
    fn time_correction(&mut self, timeout: f64) -> RelayResult<f64>;

    fn open_stream(&mut self, timeout: f64) -> RelayResult<()>;

    /// All samples buffered since the last pull. Never blocks; an empty chunk
    /// means nothing is buffered.
    fn pull_chunk(&mut self) -> RelayResult<Chunk>;

    fn close_stream(&mut self);
}

/// Push side of an announced stream
pub trait OutletHandle: Send {
    fn descriptor(&self) -> &StreamDescriptor;

    fn push_sample(&mut self, sample: &[f64], timestamp: f64) -> RelayResult<()>;
}
