// Common types for stream descriptions and sample chunks

use crate::error::RelayResult;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value format of every channel in a stream
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelFormat {
    Float32,
    Double64,
    String,
    Int32,
    Int16,
    Int8,
    Int64,
    Undefined,
}

impl ChannelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelFormat::Float32 => "float32",
            ChannelFormat::Double64 => "double64",
            ChannelFormat::String => "string",
            ChannelFormat::Int32 => "int32",
            ChannelFormat::Int16 => "int16",
            ChannelFormat::Int8 => "int8",
            ChannelFormat::Int64 => "int64",
            ChannelFormat::Undefined => "undefined",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ChannelFormat::String | ChannelFormat::Undefined)
    }
}

/// Per-channel metadata announced in a stream description
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChannelMetadata {
    pub label: String,
    #[serde(default)]
    pub eye: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub coordinate_system: Option<String>,
}

impl ChannelMetadata {
    pub fn labelled(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Default::default()
        }
    }
}

/// Description of a discovered or announced stream
///
/// Identity is `source_id`. The human readable [`label`](Self::label) is what
/// user preferences are keyed on, since a source may come back with a new id
/// after a process restart.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamDescriptor {
    pub source_id: String,
    pub name: String,
    pub stream_type: String,
    pub hostname: String,
    pub channel_count: usize,
    /// Nominal sampling rate in Hz, 0.0 for irregular streams
    pub nominal_srate: f64,
    pub channel_format: ChannelFormat,
    /// Declared channel metadata, empty when the source declares none
    #[serde(default)]
    pub channels: Vec<ChannelMetadata>,
    /// Additional key/value entries of the description block
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl StreamDescriptor {
    pub fn new(
        source_id: impl Into<String>,
        name: impl Into<String>,
        stream_type: impl Into<String>,
        hostname: impl Into<String>,
        channel_count: usize,
        nominal_srate: f64,
        channel_format: ChannelFormat,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            name: name.into(),
            stream_type: stream_type.into(),
            hostname: hostname.into(),
            channel_count,
            nominal_srate,
            channel_format,
            channels: Vec::new(),
            properties: BTreeMap::new(),
        }
    }

    pub fn with_channels(mut self, channels: Vec<ChannelMetadata>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// `"{name} ({hostname})"`
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.hostname)
    }

    /// Declared channel labels, `None` when the source declares no channels
    pub fn channel_labels(&self) -> Option<Vec<String>> {
        if self.channels.is_empty() {
            None
        } else {
            Some(self.channels.iter().map(|c| c.label.clone()).collect())
        }
    }

    /// Render the stream description as XML
    pub fn to_xml(&self) -> RelayResult<String> {
        let mut buffer = Vec::new();
        let mut xml = Writer::new_with_indent(&mut buffer, b' ', 2);

        xml.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        xml.write_event(Event::Start(BytesStart::new("info")))?;

        write_value(&mut xml, "name", &self.name)?;
        write_value(&mut xml, "type", &self.stream_type)?;
        write_value(&mut xml, "channel_count", &self.channel_count.to_string())?;
        write_value(&mut xml, "nominal_srate", &self.nominal_srate.to_string())?;
        write_value(&mut xml, "channel_format", self.channel_format.as_str())?;
        write_value(&mut xml, "source_id", &self.source_id)?;
        write_value(&mut xml, "hostname", &self.hostname)?;

        xml.write_event(Event::Start(BytesStart::new("desc")))?;
        for (key, value) in &self.properties {
            write_value(&mut xml, key, value)?;
        }
        if !self.channels.is_empty() {
            xml.write_event(Event::Start(BytesStart::new("channels")))?;
            for channel in &self.channels {
                xml.write_event(Event::Start(BytesStart::new("channel")))?;
                write_value(&mut xml, "label", &channel.label)?;
                let optional = [
                    ("eye", &channel.eye),
                    ("type", &channel.kind),
                    ("unit", &channel.unit),
                    ("coordinate_system", &channel.coordinate_system),
                ];
                for (tag, value) in optional {
                    if let Some(value) = value {
                        write_value(&mut xml, tag, value)?;
                    }
                }
                xml.write_event(Event::End(BytesEnd::new("channel")))?;
            }
            xml.write_event(Event::End(BytesEnd::new("channels")))?;
        }
        xml.write_event(Event::End(BytesEnd::new("desc")))?;

        xml.write_event(Event::End(BytesEnd::new("info")))?;

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

fn write_value<W: std::io::Write>(xml: &mut Writer<W>, tag: &str, value: &str) -> RelayResult<()> {
    xml.write_event(Event::Start(BytesStart::new(tag)))?;
    xml.write_event(Event::Text(BytesText::new(value)))?;
    xml.write_event(Event::End(BytesEnd::new(tag)))?;
    Ok(())
}

/// Sample values of one pulled chunk, sample-major: `values[sample][channel]`
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkData {
    Numeric(Vec<Vec<f64>>),
    /// Marker streams carry strings
    Text(Vec<Vec<String>>),
}

/// A batch of samples available from a source at one poll
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Source-clock timestamp of every sample
    pub timestamps: Vec<f64>,
    pub data: ChunkData,
}

impl Chunk {
    pub fn empty() -> Self {
        Self {
            timestamps: Vec::new(),
            data: ChunkData::Numeric(Vec::new()),
        }
    }

    pub fn numeric(samples: Vec<Vec<f64>>, timestamps: Vec<f64>) -> Self {
        Self {
            timestamps,
            data: ChunkData::Numeric(samples),
        }
    }

    pub fn text(samples: Vec<Vec<String>>, timestamps: Vec<f64>) -> Self {
        Self {
            timestamps,
            data: ChunkData::Text(samples),
        }
    }

    /// Number of samples in this chunk
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaze_descriptor() -> StreamDescriptor {
        StreamDescriptor::new(
            "abc-123",
            "pupil_capture",
            "Gaze",
            "lab-pc",
            2,
            0.0,
            ChannelFormat::Double64,
        )
    }

    #[test]
    fn test_label_uses_name_and_host() {
        assert_eq!(gaze_descriptor().label(), "pupil_capture (lab-pc)");
    }

    #[test]
    fn test_channel_labels_absent_without_metadata() {
        let descriptor = gaze_descriptor();
        assert!(descriptor.channel_labels().is_none());

        let descriptor = descriptor.with_channels(vec![
            ChannelMetadata::labelled("norm_pos_x"),
            ChannelMetadata::labelled("norm_pos_y"),
        ]);
        assert_eq!(
            descriptor.channel_labels().unwrap(),
            vec!["norm_pos_x".to_string(), "norm_pos_y".to_string()]
        );
    }

    #[test]
    fn test_xml_contains_channel_metadata() {
        let descriptor = gaze_descriptor()
            .with_property("pupil_lsl_relay_version", "2.1")
            .with_channels(vec![ChannelMetadata {
                label: "confidence".into(),
                eye: Some("both".into()),
                kind: Some("Confidence".into()),
                unit: Some("normalized".into()),
                coordinate_system: None,
            }]);

        let xml = descriptor.to_xml().unwrap();
        assert!(xml.contains("<label>confidence</label>"));
        assert!(xml.contains("<eye>both</eye>"));
        assert!(xml.contains("<pupil_lsl_relay_version>2.1</pupil_lsl_relay_version>"));
        assert!(xml.contains("<channel_format>double64</channel_format>"));
        assert!(!xml.contains("coordinate_system"));
    }

    #[test]
    fn test_chunk_len() {
        let chunk = Chunk::numeric(vec![vec![1.0, 2.0], vec![3.0, 4.0]], vec![0.1, 0.2]);
        assert_eq!(chunk.len(), 2);
        assert!(!chunk.is_empty());
        assert!(Chunk::empty().is_empty());
    }
}
