// Lab Streaming Layer transport
//
// Binds the transport traits to liblsl through the `lsl` crate. Stream
// descriptions are translated in both directions, including the
// `<desc><channels>` block that carries per-channel metadata.

use super::{Inlet, OutletHandle, ResolveFilter, StreamResolver, Transport};
use crate::error::{RelayError, RelayResult};
use crate::types::{ChannelFormat, ChannelMetadata, Chunk, StreamDescriptor};
use lsl::{ContinuousResolver, ExPushable, Pullable, StreamInfo, StreamInlet, StreamOutlet};
use std::collections::BTreeMap;

/// Seconds after which the continuous resolver forgets a silent stream
const FORGET_AFTER: f64 = 5.0;
const MAX_BUFFER_SECS: i32 = 360;

#[derive(Debug, Clone, Copy, Default)]
pub struct LslTransport;

impl LslTransport {
    pub fn new() -> Self {
        Self
    }
}

impl Transport for LslTransport {
    fn local_clock(&self) -> f64 {
        lsl::local_clock()
    }

    fn resolver(&self, filter: ResolveFilter) -> Box<dyn StreamResolver> {
        let resolver = match &filter {
            ResolveFilter::All => ContinuousResolver::new(FORGET_AFTER),
            ResolveFilter::Type(stream_type) => {
                ContinuousResolver::new_with_prop("type", stream_type, FORGET_AFTER)
            }
        };
        match resolver {
            Ok(resolver) => Box::new(LslResolver {
                inner: Some(resolver),
            }),
            Err(e) => {
                log::warn!("Failed to create LSL resolver: {:?}", e);
                Box::new(LslResolver { inner: None })
            }
        }
    }

    fn open_inlet(
        &self,
        descriptor: &StreamDescriptor,
        timeout: f64,
    ) -> RelayResult<Box<dyn Inlet>> {
        let label = descriptor.label();
        let candidates = lsl::resolve_bypred(
            &format!("source_id='{}'", descriptor.source_id),
            1,
            timeout,
        )
        .map_err(|e| RelayError::Transport(format!("{:?}", e)))?;
        let info = candidates.into_iter().next().ok_or(RelayError::ConnectTimeout {
            label: label.clone(),
            timeout_secs: timeout,
        })?;
        let inlet = StreamInlet::new(&info, MAX_BUFFER_SECS, 0, true)
            .map_err(|e| RelayError::Transport(format!("Failed to create inlet: {:?}", e)))?;
        Ok(Box::new(LslInlet {
            inner: inlet,
            label,
            string_samples: descriptor.channel_format == ChannelFormat::String,
        }))
    }

    fn create_outlet(&self, descriptor: &StreamDescriptor) -> RelayResult<Box<dyn OutletHandle>> {
        let info = to_stream_info(descriptor)?;
        let outlet = StreamOutlet::new(&info, 0, MAX_BUFFER_SECS)
            .map_err(|e| RelayError::Transport(format!("Failed to create outlet: {:?}", e)))?;
        Ok(Box::new(LslOutlet {
            inner: outlet,
            descriptor: descriptor.clone(),
        }))
    }
}

struct LslResolver {
    inner: Option<ContinuousResolver>,
}

impl StreamResolver for LslResolver {
    fn results(&mut self) -> Vec<StreamDescriptor> {
        let Some(resolver) = self.inner.as_ref() else {
            return Vec::new();
        };
        match resolver.results() {
            Ok(found) => found.iter().map(to_descriptor).collect(),
            Err(e) => {
                log::debug!("LSL resolver unavailable: {:?}", e);
                Vec::new()
            }
        }
    }
}

struct LslInlet {
    inner: StreamInlet,
    label: String,
    string_samples: bool,
}

impl LslInlet {
    fn classify(&self, error: lsl::Error, timeout: f64, probing_clock: bool) -> RelayError {
        match error {
            lsl::Error::StreamLost => RelayError::ConnectionLost(self.label.clone()),
            lsl::Error::Timeout if probing_clock => RelayError::CorrectionTimeout {
                label: self.label.clone(),
                timeout_secs: timeout,
            },
            lsl::Error::Timeout => RelayError::ConnectTimeout {
                label: self.label.clone(),
                timeout_secs: timeout,
            },
            other => RelayError::Transport(format!("{}: {:?}", self.label, other)),
        }
    }
}

impl Inlet for LslInlet {
    fn info(&mut self, timeout: f64) -> RelayResult<StreamDescriptor> {
        self.inner
            .info(timeout)
            .map(|info| to_descriptor(&info))
            .map_err(|e| self.classify(e, timeout, false))
    }

    fn time_correction(&mut self, timeout: f64) -> RelayResult<f64> {
        self.inner
            .time_correction(timeout)
            .map_err(|e| self.classify(e, timeout, true))
    }

    fn open_stream(&mut self, timeout: f64) -> RelayResult<()> {
        self.inner
            .open_stream(timeout)
            .map_err(|e| self.classify(e, timeout, false))
    }

    fn pull_chunk(&mut self) -> RelayResult<Chunk> {
        if self.string_samples {
            let pulled: Result<(Vec<Vec<String>>, Vec<f64>), lsl::Error> = self.inner.pull_chunk();
            let (samples, timestamps) = pulled.map_err(|e| self.classify(e, 0.0, false))?;
            Ok(Chunk::text(samples, timestamps))
        } else {
            let pulled: Result<(Vec<Vec<f64>>, Vec<f64>), lsl::Error> = self.inner.pull_chunk();
            let (samples, timestamps) = pulled.map_err(|e| self.classify(e, 0.0, false))?;
            Ok(Chunk::numeric(samples, timestamps))
        }
    }

    fn close_stream(&mut self) {
        self.inner.close_stream();
    }
}

struct LslOutlet {
    inner: StreamOutlet,
    descriptor: StreamDescriptor,
}

impl OutletHandle for LslOutlet {
    fn descriptor(&self) -> &StreamDescriptor {
        &self.descriptor
    }

    fn push_sample(&mut self, sample: &[f64], timestamp: f64) -> RelayResult<()> {
        self.inner
            .push_sample_ex(&sample.to_vec(), timestamp, true)
            .map_err(|e| RelayError::Transport(format!("{}: {:?}", self.descriptor.name, e)))
    }
}

fn to_lsl_format(format: ChannelFormat) -> lsl::ChannelFormat {
    match format {
        ChannelFormat::Float32 => lsl::ChannelFormat::Float32,
        ChannelFormat::Double64 => lsl::ChannelFormat::Double64,
        ChannelFormat::String => lsl::ChannelFormat::String,
        ChannelFormat::Int32 => lsl::ChannelFormat::Int32,
        ChannelFormat::Int16 => lsl::ChannelFormat::Int16,
        ChannelFormat::Int8 => lsl::ChannelFormat::Int8,
        ChannelFormat::Int64 => lsl::ChannelFormat::Int64,
        ChannelFormat::Undefined => lsl::ChannelFormat::Undefined,
    }
}

fn from_lsl_format(format: lsl::ChannelFormat) -> ChannelFormat {
    match format {
        lsl::ChannelFormat::Float32 => ChannelFormat::Float32,
        lsl::ChannelFormat::Double64 => ChannelFormat::Double64,
        lsl::ChannelFormat::String => ChannelFormat::String,
        lsl::ChannelFormat::Int32 => ChannelFormat::Int32,
        lsl::ChannelFormat::Int16 => ChannelFormat::Int16,
        lsl::ChannelFormat::Int8 => ChannelFormat::Int8,
        lsl::ChannelFormat::Int64 => ChannelFormat::Int64,
        _ => ChannelFormat::Undefined,
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

fn to_descriptor(info: &StreamInfo) -> StreamDescriptor {
    let mut channels = Vec::new();
    let mut channel = info.desc().child("channels").child("channel");
    while channel.is_valid() {
        channels.push(ChannelMetadata {
            label: channel.child_value_named("label"),
            eye: non_empty(channel.child_value_named("eye")),
            kind: non_empty(channel.child_value_named("type")),
            unit: non_empty(channel.child_value_named("unit")),
            coordinate_system: non_empty(channel.child_value_named("coordinate_system")),
        });
        channel = channel.next_sibling_named("channel");
    }

    StreamDescriptor {
        source_id: info.source_id(),
        name: info.stream_name(),
        stream_type: info.stream_type(),
        hostname: info.hostname(),
        channel_count: info.channel_count().max(0) as usize,
        nominal_srate: info.nominal_srate(),
        channel_format: from_lsl_format(info.channel_format()),
        channels,
        properties: BTreeMap::new(),
    }
}

fn to_stream_info(descriptor: &StreamDescriptor) -> RelayResult<StreamInfo> {
    let info = StreamInfo::new(
        &descriptor.name,
        &descriptor.stream_type,
        descriptor.channel_count as u32,
        descriptor.nominal_srate,
        to_lsl_format(descriptor.channel_format),
        &descriptor.source_id,
    )
    .map_err(|e| RelayError::Transport(format!("Invalid stream info: {:?}", e)))?;

    let mut desc = info.desc();
    for (key, value) in &descriptor.properties {
        desc.append_child_value(key, value);
    }
    let mut channels = desc.append_child("channels");
    for metadata in &descriptor.channels {
        let mut channel = channels.append_child("channel");
        channel.append_child_value("label", &metadata.label);
        let optional = [
            ("eye", &metadata.eye),
            ("type", &metadata.kind),
            ("unit", &metadata.unit),
            ("coordinate_system", &metadata.coordinate_system),
        ];
        for (tag, value) in optional {
            if let Some(value) = value {
                channel.append_child_value(tag, value);
            }
        }
    }
    Ok(info)
}
