// Declarative channel definitions and their value extractors

use crate::error::ExtractError;
use crate::event::PupilEvent;
use crate::types::ChannelMetadata;

/// Pure value extractor, total over every event variant it can be applied to.
pub type Extractor = fn(&PupilEvent) -> Result<f64, ExtractError>;

const AXES: [char; 3] = ['x', 'y', 'z'];
const AXES_UPPER: [char; 3] = ['X', 'Y', 'Z'];

/// Which eye a channel describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeTag {
    Right,
    Left,
    Both,
}

impl EyeTag {
    /// Eye 0 is the right eye, eye 1 the left one.
    pub fn from_index(eye: usize) -> Self {
        if eye == 0 {
            EyeTag::Right
        } else {
            EyeTag::Left
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EyeTag::Right => "right",
            EyeTag::Left => "left",
            EyeTag::Both => "both",
        }
    }
}

/// One column of an announced stream
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub label: String,
    pub eye: EyeTag,
    pub kind: String,
    pub unit: Option<String>,
    pub coordinate_system: Option<String>,
    pub extract: Extractor,
}

impl ChannelSpec {
    pub fn new(
        label: impl Into<String>,
        eye: EyeTag,
        kind: impl Into<String>,
        unit: &str,
        extract: Extractor,
    ) -> Self {
        Self {
            label: label.into(),
            eye,
            kind: kind.into(),
            unit: Some(unit.to_string()),
            coordinate_system: None,
            extract,
        }
    }

    pub fn in_coordinates(mut self, coordinate_system: impl Into<String>) -> Self {
        self.coordinate_system = Some(coordinate_system.into());
        self
    }

    pub fn metadata(&self) -> ChannelMetadata {
        ChannelMetadata {
            label: self.label.clone(),
            eye: Some(self.eye.as_str().to_string()),
            kind: Some(self.kind.clone()),
            unit: self.unit.clone(),
            coordinate_system: self.coordinate_system.clone(),
        }
    }
}

/// Ordered channel list. The order is the sample vector order.
#[derive(Debug, Clone, Default)]
pub struct ChannelSchema {
    channels: Vec<ChannelSpec>,
}

impl ChannelSchema {
    pub fn new(channels: Vec<ChannelSpec>) -> Self {
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelSpec> {
        self.channels.iter()
    }

    pub fn labels(&self) -> Vec<String> {
        self.channels.iter().map(|c| c.label.clone()).collect()
    }

    /// Extract one sample; fails as a whole if any channel fails
    pub fn extract(&self, event: &PupilEvent) -> Result<Vec<f64>, ExtractError> {
        self.channels.iter().map(|c| (c.extract)(event)).collect()
    }

    pub fn channel_metadata(&self) -> Vec<ChannelMetadata> {
        self.channels.iter().map(ChannelSpec::metadata).collect()
    }
}

impl FromIterator<ChannelSpec> for ChannelSchema {
    fn from_iter<I: IntoIterator<Item = ChannelSpec>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

// Channel builders

pub fn confidence_channel() -> ChannelSpec {
    ChannelSpec::new(
        "confidence",
        EyeTag::Both,
        "Confidence",
        "normalized",
        confidence,
    )
}

pub fn norm_pos_channels(coordinate_system: &str) -> Vec<ChannelSpec> {
    let extractors: [Extractor; 2] = [norm_pos::<0>, norm_pos::<1>];
    extractors
        .into_iter()
        .enumerate()
        .map(|(dim, extract)| {
            ChannelSpec::new(
                format!("norm_pos_{}", AXES[dim]),
                EyeTag::Both,
                format!("Screen{}", AXES_UPPER[dim]),
                "normalized",
                extract,
            )
            .in_coordinates(coordinate_system)
        })
        .collect()
}

pub fn gaze_point_3d_channels() -> Vec<ChannelSpec> {
    let extractors: [Extractor; 3] = [
        gaze_point_3d::<0>,
        gaze_point_3d::<1>,
        gaze_point_3d::<2>,
    ];
    extractors
        .into_iter()
        .enumerate()
        .map(|(dim, extract)| {
            ChannelSpec::new(
                format!("gaze_point_3d_{}", AXES[dim]),
                EyeTag::Both,
                format!("Direction{}", AXES_UPPER[dim]),
                "mm",
                extract,
            )
            .in_coordinates("world")
        })
        .collect()
}

pub fn eye_center_channels() -> Vec<ChannelSpec> {
    let extractors: [[Extractor; 3]; 2] = [
        [eye_center::<0, 0>, eye_center::<0, 1>, eye_center::<0, 2>],
        [eye_center::<1, 0>, eye_center::<1, 1>, eye_center::<1, 2>],
    ];
    per_eye_vector_channels("eye_center{eye}_3d_{axis}", extractors)
}

pub fn gaze_normal_channels() -> Vec<ChannelSpec> {
    let extractors: [[Extractor; 3]; 2] = [
        [gaze_normal::<0, 0>, gaze_normal::<0, 1>, gaze_normal::<0, 2>],
        [gaze_normal::<1, 0>, gaze_normal::<1, 1>, gaze_normal::<1, 2>],
    ];
    per_eye_vector_channels("gaze_normal{eye}_{axis}", extractors)
}

fn per_eye_vector_channels(pattern: &str, extractors: [[Extractor; 3]; 2]) -> Vec<ChannelSpec> {
    let mut channels = Vec::with_capacity(6);
    for (eye, per_axis) in extractors.into_iter().enumerate() {
        for (dim, extract) in per_axis.into_iter().enumerate() {
            let label = pattern
                .replace("{eye}", &eye.to_string())
                .replace("{axis}", &AXES[dim].to_string());
            channels.push(
                ChannelSpec::new(
                    label,
                    EyeTag::from_index(eye),
                    format!("Position{}", AXES_UPPER[dim]),
                    "mm",
                    extract,
                )
                .in_coordinates("world"),
            );
        }
    }
    channels
}

pub fn diameter_2d_channels() -> Vec<ChannelSpec> {
    let extractors: [Extractor; 2] = [diameter_2d::<0>, diameter_2d::<1>];
    diameter_channels("2d", "pixels", extractors)
}

pub fn diameter_3d_channels() -> Vec<ChannelSpec> {
    let extractors: [Extractor; 2] = [diameter_3d::<0>, diameter_3d::<1>];
    diameter_channels("3d", "mm", extractors)
}

fn diameter_channels(mode: &str, unit: &str, extractors: [Extractor; 2]) -> Vec<ChannelSpec> {
    extractors
        .into_iter()
        .enumerate()
        .map(|(eye, extract)| {
            ChannelSpec::new(
                format!("diameter{}_{}", eye, mode),
                EyeTag::from_index(eye),
                "Diameter",
                unit,
                extract,
            )
            .in_coordinates(format!("eye{}", eye))
        })
        .collect()
}

pub fn fixation_id_channel() -> ChannelSpec {
    ChannelSpec::new("id", EyeTag::Both, "FixationId", "index", fixation_id)
}

pub fn fixation_dispersion_channel() -> ChannelSpec {
    ChannelSpec::new(
        "dispersion",
        EyeTag::Both,
        "Dispersion",
        "deg",
        fixation_dispersion,
    )
}

pub fn fixation_duration_channel() -> ChannelSpec {
    ChannelSpec::new(
        "duration",
        EyeTag::Both,
        "Duration",
        "ms",
        fixation_duration,
    )
}

pub fn fixation_method_channel() -> ChannelSpec {
    ChannelSpec::new(
        "method",
        EyeTag::Both,
        "FixationMethod",
        "0=2d pupil, 1=3d gaze",
        fixation_method,
    )
}

pub fn invisible_gaze_channels() -> Vec<ChannelSpec> {
    let extractors: [Extractor; 2] = [invisible_x, invisible_y];
    extractors
        .into_iter()
        .enumerate()
        .map(|(dim, extract)| {
            ChannelSpec::new(
                AXES[dim].to_string(),
                EyeTag::Both,
                format!("Screen{}", AXES_UPPER[dim]),
                "pixels",
                extract,
            )
            .in_coordinates("world")
        })
        .collect()
}

pub fn invisible_timestamp_channel() -> ChannelSpec {
    ChannelSpec::new(
        "pi_timestamp",
        EyeTag::Both,
        "PupilInvisibleTimestamp",
        "seconds",
        invisible_timestamp,
    )
}

// Extractors

fn missing(field: &'static str, event: &PupilEvent) -> ExtractError {
    ExtractError::MissingField {
        field,
        event: event.kind_name(),
    }
}

fn confidence(event: &PupilEvent) -> Result<f64, ExtractError> {
    event
        .confidence()
        .ok_or_else(|| missing("confidence", event))
}

fn norm_pos<const DIM: usize>(event: &PupilEvent) -> Result<f64, ExtractError> {
    event
        .norm_pos()
        .map(|pos| pos[DIM])
        .ok_or_else(|| missing("norm_pos", event))
}

fn gaze_point_3d<const DIM: usize>(event: &PupilEvent) -> Result<f64, ExtractError> {
    let point = match event {
        PupilEvent::Gaze3dMonocular(gaze) => gaze.gaze_point_3d,
        PupilEvent::Gaze3dBinocular(gaze) => gaze.gaze_point_3d,
        _ => None,
    };
    Ok(point.map_or(f64::NAN, |p| p[DIM]))
}

fn eye_center<const EYE: usize, const DIM: usize>(
    event: &PupilEvent,
) -> Result<f64, ExtractError> {
    Ok(match event {
        PupilEvent::Gaze3dBinocular(gaze) => gaze.eye_centers_3d[EYE][DIM],
        PupilEvent::Gaze3dMonocular(gaze) if gaze.eye == EYE => gaze.eye_center_3d[DIM],
        _ => f64::NAN,
    })
}

fn gaze_normal<const EYE: usize, const DIM: usize>(
    event: &PupilEvent,
) -> Result<f64, ExtractError> {
    Ok(match event {
        PupilEvent::Gaze3dBinocular(gaze) => gaze.gaze_normals_3d[EYE][DIM],
        PupilEvent::Gaze3dMonocular(gaze) if gaze.eye == EYE => gaze.gaze_normal_3d[DIM],
        _ => f64::NAN,
    })
}

fn diameter_2d<const EYE: usize>(event: &PupilEvent) -> Result<f64, ExtractError> {
    Ok(event
        .base_data()
        .iter()
        .find(|pupil| pupil.id == EYE)
        .and_then(|pupil| pupil.diameter)
        .unwrap_or(f64::NAN))
}

fn diameter_3d<const EYE: usize>(event: &PupilEvent) -> Result<f64, ExtractError> {
    Ok(event
        .base_data()
        .iter()
        .find(|pupil| pupil.id == EYE && pupil.diameter_3d.is_some())
        .and_then(|pupil| pupil.diameter_3d)
        .unwrap_or(f64::NAN))
}

fn fixation_id(event: &PupilEvent) -> Result<f64, ExtractError> {
    match event {
        PupilEvent::Fixation(f) => Ok(f.id as f64),
        _ => Err(missing("id", event)),
    }
}

fn fixation_dispersion(event: &PupilEvent) -> Result<f64, ExtractError> {
    match event {
        PupilEvent::Fixation(f) => Ok(f.dispersion),
        _ => Err(missing("dispersion", event)),
    }
}

fn fixation_duration(event: &PupilEvent) -> Result<f64, ExtractError> {
    match event {
        PupilEvent::Fixation(f) => Ok(f.duration),
        _ => Err(missing("duration", event)),
    }
}

fn fixation_method(event: &PupilEvent) -> Result<f64, ExtractError> {
    match event {
        PupilEvent::Fixation(f) => Ok(f.method.as_f64()),
        _ => Err(missing("method", event)),
    }
}

fn invisible_x(event: &PupilEvent) -> Result<f64, ExtractError> {
    match event {
        PupilEvent::InvisibleGaze(g) => Ok(g.x),
        _ => Err(missing("x", event)),
    }
}

fn invisible_y(event: &PupilEvent) -> Result<f64, ExtractError> {
    match event {
        PupilEvent::InvisibleGaze(g) => Ok(g.y),
        _ => Err(missing("y", event)),
    }
}

fn invisible_timestamp(event: &PupilEvent) -> Result<f64, ExtractError> {
    match event {
        PupilEvent::InvisibleGaze(g) => Ok(g.timestamp),
        _ => Err(missing("pi_timestamp", event)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::fixtures::*;
    use crate::event::{Gaze2d, PupilEvent};

    fn gaze_schema() -> ChannelSchema {
        let mut channels = vec![confidence_channel()];
        channels.extend(norm_pos_channels("world"));
        channels.extend(gaze_point_3d_channels());
        channels.extend(eye_center_channels());
        channels.extend(gaze_normal_channels());
        channels.extend(diameter_2d_channels());
        channels.extend(diameter_3d_channels());
        ChannelSchema::new(channels)
    }

    fn value_of(schema: &ChannelSchema, sample: &[f64], label: &str) -> f64 {
        let index = schema
            .labels()
            .iter()
            .position(|l| l == label)
            .unwrap_or_else(|| panic!("no channel {}", label));
        sample[index]
    }

    #[test]
    fn test_gaze_schema_labels_in_order() {
        let labels = gaze_schema().labels();
        assert_eq!(labels.len(), 22);
        assert_eq!(&labels[..3], ["confidence", "norm_pos_x", "norm_pos_y"]);
        assert_eq!(labels[6], "eye_center0_3d_x");
        assert_eq!(labels[11], "eye_center1_3d_z");
        assert_eq!(labels[12], "gaze_normal0_x");
        assert_eq!(&labels[18..], ["diameter0_2d", "diameter1_2d", "diameter0_3d", "diameter1_3d"]);
    }

    #[test]
    fn test_minimal_2d_event_yields_numbers_or_nan() {
        let schema = gaze_schema();
        let event = PupilEvent::Gaze2d(Gaze2d {
            timestamp: 1.0,
            confidence: 0.5,
            norm_pos: [0.1, 0.2],
            base_data: Vec::new(),
        });

        let sample = schema.extract(&event).unwrap();
        assert_eq!(sample.len(), schema.len());
        assert_eq!(sample[0], 0.5);
        assert_eq!(sample[1], 0.1);
        assert!(sample[3..].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_monocular_fills_only_own_eye() {
        let schema = gaze_schema();
        let event = PupilEvent::from_json(&gaze_3d_monocular_json(1)).unwrap();
        let sample = schema.extract(&event).unwrap();

        assert_eq!(value_of(&schema, &sample, "gaze_point_3d_z"), 300.0);
        assert_eq!(value_of(&schema, &sample, "eye_center1_3d_x"), 20.0);
        assert!(value_of(&schema, &sample, "eye_center0_3d_x").is_nan());
        assert_eq!(value_of(&schema, &sample, "gaze_normal1_z"), 0.99);
        assert!(value_of(&schema, &sample, "gaze_normal0_z").is_nan());
        assert_eq!(value_of(&schema, &sample, "diameter1_2d"), 31.0);
        assert_eq!(value_of(&schema, &sample, "diameter1_3d"), 4.5);
        assert!(value_of(&schema, &sample, "diameter0_2d").is_nan());
    }

    #[test]
    fn test_binocular_fills_both_eyes() {
        let schema = gaze_schema();
        let event = PupilEvent::from_json(&gaze_3d_binocular_json()).unwrap();
        let sample = schema.extract(&event).unwrap();

        assert_eq!(value_of(&schema, &sample, "eye_center0_3d_x"), 30.0);
        assert_eq!(value_of(&schema, &sample, "eye_center1_3d_x"), -30.0);
        assert_eq!(value_of(&schema, &sample, "gaze_normal1_x"), -0.1);
        assert_eq!(value_of(&schema, &sample, "diameter0_3d"), 3.5);
    }

    #[test]
    fn test_2d_base_data_has_no_3d_diameter() {
        let schema = gaze_schema();
        let event = PupilEvent::from_json(&gaze_2d_json()).unwrap();
        let sample = schema.extract(&event).unwrap();
        assert_eq!(value_of(&schema, &sample, "diameter0_2d"), 30.0);
        assert!(value_of(&schema, &sample, "diameter0_3d").is_nan());
    }

    #[test]
    fn test_fixation_channel_on_gaze_event_fails() {
        let schema = ChannelSchema::new(vec![confidence_channel(), fixation_dispersion_channel()]);
        let event = PupilEvent::from_json(&gaze_2d_json()).unwrap();
        assert_eq!(
            schema.extract(&event),
            Err(ExtractError::MissingField {
                field: "dispersion",
                event: "gaze 2d",
            })
        );

        let fixation = PupilEvent::from_json(&fixation_json()).unwrap();
        assert_eq!(schema.extract(&fixation).unwrap(), vec![0.7, 1.2]);
    }

    #[test]
    fn test_metadata_matches_channel_definitions() {
        let metadata = ChannelSchema::new(diameter_2d_channels()).channel_metadata();
        assert_eq!(metadata[1].label, "diameter1_2d");
        assert_eq!(metadata[1].eye.as_deref(), Some("left"));
        assert_eq!(metadata[1].kind.as_deref(), Some("Diameter"));
        assert_eq!(metadata[1].unit.as_deref(), Some("pixels"));
        assert_eq!(metadata[1].coordinate_system.as_deref(), Some("eye1"));

        let norm_pos = ChannelSchema::new(norm_pos_channels("eye")).channel_metadata();
        assert_eq!(norm_pos[0].coordinate_system.as_deref(), Some("eye"));
        assert_eq!(norm_pos[1].kind.as_deref(), Some("ScreenY"));
    }
}
