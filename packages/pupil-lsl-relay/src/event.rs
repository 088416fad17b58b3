// Typed representation of the host's gaze, pupil and fixation events

use crate::error::{RelayError, RelayResult};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub type Vec2 = [f64; 2];
pub type Vec3 = [f64; 3];

/// Event category used to route events to outlets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKey {
    Gaze,
    Fixations,
    Pupil,
}

impl EventKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKey::Gaze => "gaze",
            EventKey::Fixations => "fixations",
            EventKey::Pupil => "pupil",
        }
    }
}

/// Single-eye pupil detection result, also carried as `base_data` of gaze
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PupilDatum {
    /// Eye index, 0 = right, 1 = left
    pub id: usize,
    pub timestamp: f64,
    pub confidence: f64,
    pub norm_pos: Vec2,
    /// Apparent diameter in eye image pixels
    #[serde(default)]
    pub diameter: Option<f64>,
    /// Physical diameter in mm, only produced by 3d detection
    #[serde(default)]
    pub diameter_3d: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gaze2d {
    pub timestamp: f64,
    pub confidence: f64,
    pub norm_pos: Vec2,
    pub base_data: Vec<PupilDatum>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gaze3dMonocular {
    pub eye: usize,
    pub timestamp: f64,
    pub confidence: f64,
    pub norm_pos: Vec2,
    pub gaze_point_3d: Option<Vec3>,
    pub eye_center_3d: Vec3,
    pub gaze_normal_3d: Vec3,
    pub base_data: Vec<PupilDatum>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gaze3dBinocular {
    pub timestamp: f64,
    pub confidence: f64,
    pub norm_pos: Vec2,
    pub gaze_point_3d: Option<Vec3>,
    /// Indexed by eye id
    pub eye_centers_3d: [Vec3; 2],
    pub gaze_normals_3d: [Vec3; 2],
    pub base_data: Vec<PupilDatum>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixationMethod {
    Pupil2d,
    Gaze3d,
}

impl FixationMethod {
    /// Numeric channel value: 0 for 2d pupil, 1 for 3d gaze
    pub fn as_f64(&self) -> f64 {
        match self {
            FixationMethod::Pupil2d => 0.0,
            FixationMethod::Gaze3d => 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fixation {
    pub id: u64,
    pub timestamp: f64,
    pub confidence: f64,
    pub norm_pos: Vec2,
    /// Degrees
    pub dispersion: f64,
    /// Milliseconds
    pub duration: f64,
    pub method: FixationMethod,
}

/// Gaze sample from a Pupil Invisible companion device
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InvisibleGaze {
    /// Scene camera pixels
    pub x: f64,
    pub y: f64,
    /// Device clock, seconds
    pub timestamp: f64,
}

/// Every event kind the outlets understand
#[derive(Debug, Clone, PartialEq)]
pub enum PupilEvent {
    Gaze2d(Gaze2d),
    Gaze3dMonocular(Gaze3dMonocular),
    Gaze3dBinocular(Gaze3dBinocular),
    Fixation(Fixation),
    Pupil(PupilDatum),
    InvisibleGaze(InvisibleGaze),
}

impl PupilEvent {
    pub fn timestamp(&self) -> f64 {
        match self {
            PupilEvent::Gaze2d(g) => g.timestamp,
            PupilEvent::Gaze3dMonocular(g) => g.timestamp,
            PupilEvent::Gaze3dBinocular(g) => g.timestamp,
            PupilEvent::Fixation(f) => f.timestamp,
            PupilEvent::Pupil(p) => p.timestamp,
            PupilEvent::InvisibleGaze(g) => g.timestamp,
        }
    }

    pub fn key(&self) -> EventKey {
        match self {
            PupilEvent::Fixation(_) => EventKey::Fixations,
            PupilEvent::Pupil(_) => EventKey::Pupil,
            _ => EventKey::Gaze,
        }
    }

    /// Short name used in diagnostics
    pub fn kind_name(&self) -> &'static str {
        match self {
            PupilEvent::Gaze2d(_) => "gaze 2d",
            PupilEvent::Gaze3dMonocular(_) => "gaze 3d monocular",
            PupilEvent::Gaze3dBinocular(_) => "gaze 3d binocular",
            PupilEvent::Fixation(_) => "fixation",
            PupilEvent::Pupil(_) => "pupil",
            PupilEvent::InvisibleGaze(_) => "invisible gaze",
        }
    }

    pub fn confidence(&self) -> Option<f64> {
        match self {
            PupilEvent::Gaze2d(g) => Some(g.confidence),
            PupilEvent::Gaze3dMonocular(g) => Some(g.confidence),
            PupilEvent::Gaze3dBinocular(g) => Some(g.confidence),
            PupilEvent::Fixation(f) => Some(f.confidence),
            PupilEvent::Pupil(p) => Some(p.confidence),
            PupilEvent::InvisibleGaze(_) => None,
        }
    }

    pub fn norm_pos(&self) -> Option<Vec2> {
        match self {
            PupilEvent::Gaze2d(g) => Some(g.norm_pos),
            PupilEvent::Gaze3dMonocular(g) => Some(g.norm_pos),
            PupilEvent::Gaze3dBinocular(g) => Some(g.norm_pos),
            PupilEvent::Fixation(f) => Some(f.norm_pos),
            PupilEvent::Pupil(p) => Some(p.norm_pos),
            PupilEvent::InvisibleGaze(_) => None,
        }
    }

    /// Pupil data the event was derived from. A pupil event is its own base.
    pub fn base_data(&self) -> &[PupilDatum] {
        match self {
            PupilEvent::Gaze2d(g) => &g.base_data,
            PupilEvent::Gaze3dMonocular(g) => &g.base_data,
            PupilEvent::Gaze3dBinocular(g) => &g.base_data,
            PupilEvent::Pupil(p) => std::slice::from_ref(p),
            PupilEvent::Fixation(_) | PupilEvent::InvisibleGaze(_) => &[],
        }
    }

    /// Convert an untyped host event into its typed form.
    ///
    /// The variant is chosen from the `topic` field:
    /// - `gaze.3d.01.` binocular 3d gaze
    /// - `gaze.3d.0.` / `gaze.3d.1.` monocular 3d gaze
    /// - any other `gaze*` topic, 2d gaze
    /// - `fixations*`
    /// - `pupil*`
    ///
    /// Events without a topic but with `x`, `y` and `timestamp` are Pupil
    /// Invisible gaze samples.
    pub fn from_json(value: &Value) -> RelayResult<Self> {
        let topic = match value.get("topic") {
            Some(Value::String(topic)) => topic.as_str(),
            Some(other) => {
                return Err(RelayError::MalformedEvent(format!(
                    "topic is not a string: {}",
                    other
                )))
            }
            None => {
                return parse::<InvisibleGaze>(value, "invisible gaze")
                    .map(PupilEvent::InvisibleGaze)
            }
        };

        if topic.starts_with("gaze") {
            let raw: RawGaze = parse(value, topic)?;
            if topic.ends_with("3d.01.") {
                raw.into_binocular(topic).map(PupilEvent::Gaze3dBinocular)
            } else if let Some(eye) = monocular_eye(topic) {
                raw.into_monocular(topic, eye)
                    .map(PupilEvent::Gaze3dMonocular)
            } else {
                Ok(PupilEvent::Gaze2d(Gaze2d {
                    timestamp: raw.timestamp,
                    confidence: raw.confidence,
                    norm_pos: raw.norm_pos,
                    base_data: raw.base_data,
                }))
            }
        } else if topic.starts_with("fixations") {
            let raw: RawFixation = parse(value, topic)?;
            Ok(PupilEvent::Fixation(Fixation {
                id: raw.id,
                timestamp: raw.timestamp,
                confidence: raw.confidence,
                norm_pos: raw.norm_pos,
                dispersion: raw.dispersion,
                duration: raw.duration,
                method: raw.method.resolve(),
            }))
        } else if topic.starts_with("pupil") {
            parse::<PupilDatum>(value, topic).map(PupilEvent::Pupil)
        } else {
            Err(RelayError::MalformedEvent(format!(
                "unsupported topic `{}`",
                topic
            )))
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(value: &Value, context: &str) -> RelayResult<T> {
    T::deserialize(value)
        .map_err(|e| RelayError::MalformedEvent(format!("{}: {}", context, e)))
}

fn monocular_eye(topic: &str) -> Option<usize> {
    if topic.ends_with("3d.0.") {
        Some(0)
    } else if topic.ends_with("3d.1.") {
        Some(1)
    } else {
        None
    }
}

#[derive(Deserialize)]
struct RawGaze {
    timestamp: f64,
    confidence: f64,
    norm_pos: Vec2,
    #[serde(default)]
    gaze_point_3d: Option<Vec3>,
    #[serde(default)]
    eye_center_3d: Option<Vec3>,
    #[serde(default)]
    gaze_normal_3d: Option<Vec3>,
    #[serde(default)]
    eye_centers_3d: Option<PerEye>,
    #[serde(default)]
    gaze_normals_3d: Option<PerEye>,
    #[serde(default)]
    base_data: Vec<PupilDatum>,
}

impl RawGaze {
    fn into_monocular(self, topic: &str, eye: usize) -> RelayResult<Gaze3dMonocular> {
        Ok(Gaze3dMonocular {
            eye,
            timestamp: self.timestamp,
            confidence: self.confidence,
            norm_pos: self.norm_pos,
            gaze_point_3d: self.gaze_point_3d,
            eye_center_3d: required(self.eye_center_3d, topic, "eye_center_3d")?,
            gaze_normal_3d: required(self.gaze_normal_3d, topic, "gaze_normal_3d")?,
            base_data: self.base_data,
        })
    }

    fn into_binocular(self, topic: &str) -> RelayResult<Gaze3dBinocular> {
        let eye_centers = required(self.eye_centers_3d, topic, "eye_centers_3d")?;
        let gaze_normals = required(self.gaze_normals_3d, topic, "gaze_normals_3d")?;
        Ok(Gaze3dBinocular {
            timestamp: self.timestamp,
            confidence: self.confidence,
            norm_pos: self.norm_pos,
            gaze_point_3d: self.gaze_point_3d,
            eye_centers_3d: eye_centers.pair(topic, "eye_centers_3d")?,
            gaze_normals_3d: gaze_normals.pair(topic, "gaze_normals_3d")?,
            base_data: self.base_data,
        })
    }
}

fn required<T>(value: Option<T>, topic: &str, field: &str) -> RelayResult<T> {
    value.ok_or_else(|| RelayError::MalformedEvent(format!("{}: missing field `{}`", topic, field)))
}

/// Per-eye vectors keyed by eye id. Serialized maps carry the id as a string
/// key; some producers emit a two element list instead.
#[derive(Deserialize)]
#[serde(untagged)]
enum PerEye {
    Map(BTreeMap<String, Vec3>),
    List(Vec<Vec3>),
}

impl PerEye {
    fn pair(self, topic: &str, field: &str) -> RelayResult<[Vec3; 2]> {
        let lookup = |eye: usize| -> RelayResult<Vec3> {
            let found = match &self {
                PerEye::Map(map) => map.get(&eye.to_string()).copied(),
                PerEye::List(list) => list.get(eye).copied(),
            };
            found.ok_or_else(|| {
                RelayError::MalformedEvent(format!(
                    "{}: expected eye `{}` in `{}`",
                    topic, eye, field
                ))
            })
        };
        Ok([lookup(0)?, lookup(1)?])
    }
}

#[derive(Deserialize)]
struct RawFixation {
    id: u64,
    timestamp: f64,
    confidence: f64,
    norm_pos: Vec2,
    dispersion: f64,
    duration: f64,
    method: RawMethod,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMethod {
    Name(String),
    Code(f64),
}

impl RawMethod {
    fn resolve(self) -> FixationMethod {
        match self {
            RawMethod::Name(name) if name.contains("3d") => FixationMethod::Gaze3d,
            RawMethod::Code(code) if code >= 1.0 => FixationMethod::Gaze3d,
            _ => FixationMethod::Pupil2d,
        }
    }
}
