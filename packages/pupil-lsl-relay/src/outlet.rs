// Announced output streams built from channel schemas

use crate::channel::{
    confidence_channel, diameter_2d_channels, diameter_3d_channels, eye_center_channels,
    fixation_dispersion_channel, fixation_duration_channel, fixation_id_channel,
    fixation_method_channel, gaze_normal_channels, gaze_point_3d_channels,
    invisible_gaze_channels, invisible_timestamp_channel, norm_pos_channels, ChannelSchema,
};
use crate::clock::OutletClock;
use crate::config::OutletRecord;
use crate::error::{RelayError, RelayResult};
use crate::event::{EventKey, PupilEvent};
use crate::transport::{OutletHandle, Transport};
use crate::types::{ChannelFormat, StreamDescriptor};
use serde::Serialize;

pub const RELAY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Every outlet the relay can announce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum OutletKind {
    SceneCameraGaze,
    SceneCameraFixations,
    EyeCameraPupillometry,
    InvisibleGaze,
}

impl OutletKind {
    pub const ALL: [OutletKind; 4] = [
        OutletKind::SceneCameraGaze,
        OutletKind::SceneCameraFixations,
        OutletKind::EyeCameraPupillometry,
        OutletKind::InvisibleGaze,
    ];

    /// Outlets relayed from Pupil Capture
    pub const CAPTURE: [OutletKind; 3] = [
        OutletKind::SceneCameraGaze,
        OutletKind::SceneCameraFixations,
        OutletKind::EyeCameraPupillometry,
    ];

    /// Name persisted in the config's `previous_outlets`
    pub fn type_name(&self) -> &'static str {
        match self {
            OutletKind::SceneCameraGaze => "SceneCameraGaze",
            OutletKind::SceneCameraFixations => "SceneCameraFixations",
            OutletKind::EyeCameraPupillometry => "EyeCameraPupillometry",
            OutletKind::InvisibleGaze => "InvisibleGaze",
        }
    }

    pub fn from_type_name(name: &str) -> RelayResult<Self> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.type_name() == name)
            .ok_or_else(|| RelayError::UnknownOutletType(name.to_string()))
    }

    pub fn stream_name(&self) -> &'static str {
        match self {
            OutletKind::SceneCameraGaze => "pupil_capture",
            OutletKind::SceneCameraFixations => "pupil_capture_fixations",
            OutletKind::EyeCameraPupillometry => "pupil_capture_pupillometry_only",
            OutletKind::InvisibleGaze => "pupil_invisible",
        }
    }

    pub fn stream_type(&self) -> &'static str {
        match self {
            OutletKind::SceneCameraFixations => "Fixations",
            _ => "Gaze",
        }
    }

    /// Events this outlet consumes
    pub fn event_key(&self) -> EventKey {
        match self {
            OutletKind::SceneCameraFixations => EventKey::Fixations,
            OutletKind::EyeCameraPupillometry => EventKey::Pupil,
            OutletKind::SceneCameraGaze | OutletKind::InvisibleGaze => EventKey::Gaze,
        }
    }

    fn version_key(&self) -> &'static str {
        match self {
            OutletKind::InvisibleGaze => "pupil_invisible_lsl_relay_version",
            _ => "pupil_lsl_relay_version",
        }
    }

    pub fn schema(&self) -> ChannelSchema {
        let mut channels = Vec::new();
        match self {
            OutletKind::SceneCameraGaze => {
                channels.push(confidence_channel());
                channels.extend(norm_pos_channels("world"));
                channels.extend(gaze_point_3d_channels());
                channels.extend(eye_center_channels());
                channels.extend(gaze_normal_channels());
                channels.extend(diameter_2d_channels());
                channels.extend(diameter_3d_channels());
            }
            OutletKind::SceneCameraFixations => {
                channels.push(fixation_id_channel());
                channels.push(confidence_channel());
                channels.extend(norm_pos_channels("world"));
                channels.push(fixation_dispersion_channel());
                channels.push(fixation_duration_channel());
                channels.push(fixation_method_channel());
            }
            OutletKind::EyeCameraPupillometry => {
                channels.push(confidence_channel());
                channels.extend(norm_pos_channels("eye"));
                channels.extend(diameter_2d_channels());
                channels.extend(diameter_3d_channels());
            }
            OutletKind::InvisibleGaze => {
                channels.extend(invisible_gaze_channels());
                channels.push(invisible_timestamp_channel());
            }
        }
        ChannelSchema::new(channels)
    }

    /// Irregular-rate double stream identified by `uuid`
    pub fn descriptor(&self, uuid: &str, hostname: &str) -> StreamDescriptor {
        let schema = self.schema();
        StreamDescriptor::new(
            uuid,
            self.stream_name(),
            self.stream_type(),
            hostname,
            schema.len(),
            0.0,
            ChannelFormat::Double64,
        )
        .with_property(self.version_key(), RELAY_VERSION)
        .with_channels(schema.channel_metadata())
    }
}

impl std::fmt::Display for OutletKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Best effort name of this machine
pub fn local_hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.is_empty()))
        .unwrap_or_else(|| "localhost".to_string())
}

/// One announced stream and the schema that fills it
pub struct Outlet {
    kind: OutletKind,
    uuid: String,
    schema: ChannelSchema,
    handle: Box<dyn OutletHandle>,
    clock: OutletClock,
    pushed: usize,
    dropped: usize,
}

impl Outlet {
    /// Announce `kind`, reusing `uuid` when given
    pub fn announce(
        transport: &dyn Transport,
        kind: OutletKind,
        uuid: Option<String>,
        clock: OutletClock,
    ) -> RelayResult<Self> {
        let uuid = uuid.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let descriptor = kind.descriptor(&uuid, &local_hostname());
        log::debug!(
            "Creating {} outlet with stream info:\n{}",
            kind.stream_name(),
            descriptor.to_xml()?
        );
        let handle = transport.create_outlet(&descriptor)?;
        Ok(Self {
            kind,
            uuid,
            schema: kind.schema(),
            handle,
            clock,
            pushed: 0,
            dropped: 0,
        })
    }

    /// Extract and push one sample. Failures drop the sample and are logged.
    pub fn push(&mut self, event: &PupilEvent) -> bool {
        let sample = match self.schema.extract(event) {
            Ok(sample) => sample,
            Err(e) => {
                log::error!("Error extracting {} sample: {}", self.kind.stream_name(), e);
                log::debug!("Offending event: {:?}", event);
                self.dropped += 1;
                return false;
            }
        };
        let timestamp = self.clock.to_bus_time(event.timestamp());
        match self.handle.push_sample(&sample, timestamp) {
            Ok(()) => {
                self.pushed += 1;
                true
            }
            Err(e) => {
                log::error!("Error pushing {} sample: {}", self.kind.stream_name(), e);
                self.dropped += 1;
                false
            }
        }
    }

    pub fn kind(&self) -> OutletKind {
        self.kind
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn descriptor(&self) -> &StreamDescriptor {
        self.handle.descriptor()
    }

    pub fn schema(&self) -> &ChannelSchema {
        &self.schema
    }

    pub fn record(&self) -> OutletRecord {
        OutletRecord {
            type_name: self.kind.type_name().to_string(),
            uuid: self.uuid.clone(),
        }
    }

    pub fn pushed(&self) -> usize {
        self.pushed
    }

    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
