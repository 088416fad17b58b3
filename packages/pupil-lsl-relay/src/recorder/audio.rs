// Audio sink: stereo mapping, resampling, encoding and frame timestamps
//
// Every non-empty chunk (or, when resampling, every resampler block) becomes
// one audio frame. A frame's presentation timestamp is measured in target-rate
// samples from the first recorded sample of the session. The corrected
// timestamp of every encoded frame is written to `audio_timestamps.npy`.

use super::{SampleSink, SinkSummary};
use crate::config::{AudioSettings, SampleFormat};
use crate::error::{RelayError, RelayResult};
use crate::types::{ChannelFormat, Chunk, ChunkData, StreamDescriptor};
use byteorder::{LittleEndian, WriteBytesExt};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const AUDIO_FILE_NAME: &str = "audio.wav";
pub const TIMESTAMPS_FILE_NAME: &str = "audio_timestamps.npy";

const RESAMPLER_CHUNK_FRAMES: usize = 1024;

/// Planar stereo audio block
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Presentation timestamp in target-rate samples
    pub pts: i64,
    /// Corrected timestamp of the first sample, seconds
    pub timestamp: f64,
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl AudioFrame {
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }
}

/// Consumer of stereo frames
pub trait AudioEncoder: Send {
    /// Encode one frame, returning the number of packets produced
    fn encode(&mut self, frame: &AudioFrame) -> RelayResult<usize>;

    /// Flush buffered data and finalize the container
    fn finish(&mut self) -> RelayResult<usize>;
}

/// Scale raw sample values of `format` into `[-1.0, 1.0]`
pub fn normalize(value: f64, format: ChannelFormat) -> f32 {
    let scaled = match format {
        ChannelFormat::Int8 => value / 128.0,
        ChannelFormat::Int16 => value / 32_768.0,
        ChannelFormat::Int32 => value / 2_147_483_648.0,
        ChannelFormat::Int64 => value / 9_223_372_036_854_775_808.0,
        _ => value,
    };
    scaled as f32
}

/// Inverse of int16 [`normalize`], saturating at the type bounds
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32_768.0)
        .round()
        .clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Reduce or widen planar channels to stereo.
///
/// Fewer than two channels duplicate channel 0, more than two keep the first
/// two.
pub fn map_to_stereo(mut planes: Vec<Vec<f32>>) -> [Vec<f32>; 2] {
    match planes.len() {
        0 => [Vec::new(), Vec::new()],
        1 => {
            let mono = planes.remove(0);
            [mono.clone(), mono]
        }
        _ => {
            planes.truncate(2);
            let right = planes.remove(1);
            let left = planes.remove(0);
            [left, right]
        }
    }
}

fn to_planes(samples: &[Vec<f64>], channel_count: usize, format: ChannelFormat) -> Vec<Vec<f32>> {
    (0..channel_count)
        .map(|channel| {
            samples
                .iter()
                .map(|sample| normalize(sample.get(channel).copied().unwrap_or(0.0), format))
                .collect()
        })
        .collect()
}

/// Fixed-ratio stereo resampler fed with arbitrarily sized input
struct StereoResampler {
    inner: SincFixedIn<f32>,
    pending: [Vec<f32>; 2],
    pending_timestamps: Vec<f64>,
    /// Filter delay of the output, in seconds
    delay_secs: f64,
}

type ResampledBlock = (f64, Vec<Vec<f32>>);

impl StereoResampler {
    fn new(source_rate: u32, target_rate: u32) -> RelayResult<Self> {
        let params = SincInterpolationParameters {
            sinc_len: 128,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 128,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = target_rate as f64 / source_rate as f64;
        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLER_CHUNK_FRAMES, 2)
            .map_err(|e| RelayError::Resampling(format!("Failed to create resampler: {}", e)))?;
        let delay_secs = inner.output_delay() as f64 / target_rate as f64;
        Ok(Self {
            inner,
            pending: [Vec::new(), Vec::new()],
            pending_timestamps: Vec::new(),
            delay_secs,
        })
    }

    /// Buffer input and resample every complete block
    fn push(&mut self, stereo: [Vec<f32>; 2], timestamps: &[f64]) -> Vec<RelayResult<ResampledBlock>> {
        let [left, right] = stereo;
        self.pending[0].extend(left);
        self.pending[1].extend(right);
        self.pending_timestamps.extend_from_slice(timestamps);

        let mut blocks = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending_timestamps.len() < needed {
                break;
            }
            let block: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|plane| plane.drain(..needed).collect())
                .collect();
            let first_timestamp = self.pending_timestamps[0] - self.delay_secs;
            self.pending_timestamps.drain(..needed);

            let result = self
                .inner
                .process(&block, None)
                .map(|output| (first_timestamp, output))
                .map_err(|e| RelayError::Resampling(e.to_string()));
            blocks.push(result);
        }
        blocks
    }

    /// Resample whatever is left in the input buffer
    fn flush(&mut self) -> Option<RelayResult<ResampledBlock>> {
        let first_timestamp = *self.pending_timestamps.first()? - self.delay_secs;
        let result = self
            .inner
            .process_partial(Some(&self.pending[..]), None)
            .map(|output| (first_timestamp, output))
            .map_err(|e| RelayError::Resampling(e.to_string()));
        self.pending = [Vec::new(), Vec::new()];
        self.pending_timestamps.clear();
        Some(result)
    }
}

/// WAV container encoder
pub struct WavEncoder {
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    format: SampleFormat,
    last_pts: Option<i64>,
}

impl WavEncoder {
    pub fn create(path: &Path, sample_rate: u32, format: SampleFormat) -> RelayResult<Self> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate,
            bits_per_sample: match format {
                SampleFormat::I16 => 16,
                SampleFormat::F32 => 32,
            },
            sample_format: match format {
                SampleFormat::I16 => hound::SampleFormat::Int,
                SampleFormat::F32 => hound::SampleFormat::Float,
            },
        };
        let writer = hound::WavWriter::create(path, spec)?;
        Ok(Self {
            writer: Some(writer),
            format,
            last_pts: None,
        })
    }
}

impl AudioEncoder for WavEncoder {
    fn encode(&mut self, frame: &AudioFrame) -> RelayResult<usize> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| RelayError::Encoding("encoder already finished".to_string()))?;
        if let Some(last) = self.last_pts {
            if frame.pts < last {
                return Err(RelayError::Encoding(format!(
                    "pts {} precedes previous pts {}",
                    frame.pts, last
                )));
            }
        }

        for (left, right) in frame.left.iter().zip(&frame.right) {
            for sample in [*left, *right] {
                match self.format {
                    SampleFormat::I16 => writer.write_sample(to_i16(sample))?,
                    SampleFormat::F32 => writer.write_sample(sample)?,
                }
            }
        }
        self.last_pts = Some(frame.pts);
        Ok(1)
    }

    fn finish(&mut self) -> RelayResult<usize> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(0)
    }
}

/// Write a one-dimensional little-endian f64 NPY (v1.0) array
pub fn write_npy_f64(path: &Path, values: &[f64]) -> RelayResult<()> {
    let mut header = format!(
        "{{'descr': '<f8', 'fortran_order': False, 'shape': ({},), }}",
        values.len()
    );
    // magic (6) + version (2) + header length (2) + header, padded to 64 bytes
    let unpadded = 10 + header.len() + 1;
    let padding = (64 - unpadded % 64) % 64;
    header.push_str(&" ".repeat(padding));
    header.push('\n');

    let mut out = BufWriter::new(File::create(path)?);
    out.write_all(b"\x93NUMPY")?;
    out.write_all(&[1, 0])?;
    out.write_u16::<LittleEndian>(header.len() as u16)?;
    out.write_all(header.as_bytes())?;
    for value in values {
        out.write_f64::<LittleEndian>(*value)?;
    }
    out.flush()?;
    Ok(())
}

/// Sink encoding one audio stream to `audio.wav` + `audio_timestamps.npy`
pub struct AudioSink {
    label: String,
    audio_path: PathBuf,
    timestamps_path: PathBuf,
    format: ChannelFormat,
    channel_count: usize,
    target_rate: u32,
    resampler: Option<StereoResampler>,
    encoder: Box<dyn AudioEncoder>,
    start_timestamp: Option<f64>,
    frame_timestamps: Vec<f64>,
    recorded: usize,
    dropped: usize,
    closed: bool,
}

impl AudioSink {
    pub fn create(
        dir: &Path,
        descriptor: &StreamDescriptor,
        settings: &AudioSettings,
    ) -> RelayResult<Self> {
        let audio_path = dir.join(AUDIO_FILE_NAME);
        let (_, target_rate) = Self::rates(descriptor, settings)?;
        let encoder = WavEncoder::create(&audio_path, target_rate, settings.sample_format)?;
        Self::with_encoder(dir, descriptor, settings, Box::new(encoder))
    }

    /// Build the sink around a custom encoder
    pub fn with_encoder(
        dir: &Path,
        descriptor: &StreamDescriptor,
        settings: &AudioSettings,
        encoder: Box<dyn AudioEncoder>,
    ) -> RelayResult<Self> {
        let (source_rate, target_rate) = Self::rates(descriptor, settings)?;
        let resampler = if source_rate == target_rate {
            None
        } else {
            log::debug!(
                "Resampling {} from {} Hz to {} Hz",
                descriptor.label(),
                source_rate,
                target_rate
            );
            Some(StereoResampler::new(source_rate, target_rate)?)
        };

        Ok(Self {
            label: descriptor.label(),
            audio_path: dir.join(AUDIO_FILE_NAME),
            timestamps_path: dir.join(TIMESTAMPS_FILE_NAME),
            format: descriptor.channel_format,
            channel_count: descriptor.channel_count,
            target_rate,
            resampler,
            encoder,
            start_timestamp: None,
            frame_timestamps: Vec::new(),
            recorded: 0,
            dropped: 0,
            closed: false,
        })
    }

    fn rates(descriptor: &StreamDescriptor, settings: &AudioSettings) -> RelayResult<(u32, u32)> {
        if !descriptor.channel_format.is_numeric() {
            return Err(RelayError::UnsupportedFormat(format!(
                "{} carries {} samples, audio needs numeric samples",
                descriptor.label(),
                descriptor.channel_format.as_str()
            )));
        }
        if descriptor.channel_count == 0 {
            return Err(RelayError::UnsupportedFormat(format!(
                "{} declares no channels",
                descriptor.label()
            )));
        }
        let source_rate = descriptor.nominal_srate.round();
        if source_rate < 1.0 {
            return Err(RelayError::UnsupportedFormat(format!(
                "{} has an irregular sampling rate",
                descriptor.label()
            )));
        }
        let source_rate = source_rate as u32;
        Ok((source_rate, settings.target_sample_rate.unwrap_or(source_rate)))
    }

    pub fn frames_recorded(&self) -> usize {
        self.recorded
    }

    pub fn frames_dropped(&self) -> usize {
        self.dropped
    }

    fn emit(&mut self, timestamp: f64, left: Vec<f32>, right: Vec<f32>) {
        if left.is_empty() {
            return;
        }
        let start = *self.start_timestamp.get_or_insert(timestamp);
        let frame = AudioFrame {
            pts: ((timestamp - start) * self.target_rate as f64).round() as i64,
            timestamp,
            left,
            right,
        };
        match self.encoder.encode(&frame) {
            Ok(_) => {
                self.recorded += 1;
                self.frame_timestamps.push(frame.timestamp);
            }
            Err(e) => {
                self.dropped += 1;
                log::debug!("Dropped audio frame of {}: {}", self.label, e);
            }
        }
    }

    fn emit_block(&mut self, block: RelayResult<ResampledBlock>) {
        match block {
            Ok((timestamp, mut planes)) => {
                let right = planes.pop().unwrap_or_default();
                let left = planes.pop().unwrap_or_default();
                self.emit(timestamp, left, right);
            }
            Err(e) => {
                self.dropped += 1;
                log::debug!("Dropped audio frame of {}: {}", self.label, e);
            }
        }
    }
}

impl SampleSink for AudioSink {
    fn write_chunk(&mut self, chunk: &Chunk, offset: f64) -> RelayResult<usize> {
        if self.closed || chunk.is_empty() {
            return Ok(0);
        }
        let samples = match &chunk.data {
            ChunkData::Numeric(samples) => samples,
            ChunkData::Text(_) => {
                return Err(RelayError::UnsupportedFormat(format!(
                    "{} delivered text samples",
                    self.label
                )))
            }
        };

        let timestamps: Vec<f64> = chunk.timestamps.iter().map(|ts| ts + offset).collect();
        let [left, right] = map_to_stereo(to_planes(samples, self.channel_count, self.format));

        match self.resampler.as_mut() {
            None => self.emit(timestamps[0], left, right),
            Some(resampler) => {
                let blocks = resampler.push([left, right], &timestamps);
                for block in blocks {
                    self.emit_block(block);
                }
            }
        }
        Ok(chunk.len())
    }

    fn close(&mut self) -> RelayResult<SinkSummary> {
        if !self.closed {
            self.closed = true;
            if let Some(block) = self.resampler.as_mut().and_then(StereoResampler::flush) {
                self.emit_block(block);
            }
            self.encoder.finish()?;
            write_npy_f64(&self.timestamps_path, &self.frame_timestamps)?;
            log::info!(
                "{} audio frames recorded. {} audio frames dropped.",
                self.recorded,
                self.dropped
            );
        }
        Ok(SinkSummary {
            files: vec![self.audio_path.clone(), self.timestamps_path.clone()],
            written: self.recorded,
            dropped: self.dropped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Captured {
        frames: Vec<AudioFrame>,
        finished: bool,
    }

    struct CapturingEncoder(Arc<Mutex<Captured>>);

    impl AudioEncoder for CapturingEncoder {
        fn encode(&mut self, frame: &AudioFrame) -> RelayResult<usize> {
            let mut captured = self.0.lock().unwrap();
            if captured.frames.last().is_some_and(|last| frame.pts < last.pts) {
                return Err(RelayError::Encoding("backwards".into()));
            }
            captured.frames.push(frame.clone());
            Ok(1)
        }

        fn finish(&mut self) -> RelayResult<usize> {
            self.0.lock().unwrap().finished = true;
            Ok(0)
        }
    }

    fn mic(channels: usize, rate: f64) -> StreamDescriptor {
        StreamDescriptor::new("mic-1", "mic", "Audio", "lab-pc", channels, rate, ChannelFormat::Int16)
    }

    fn capture_sink(dir: &Path, descriptor: &StreamDescriptor) -> (AudioSink, Arc<Mutex<Captured>>) {
        let captured = Arc::new(Mutex::new(Captured::default()));
        let sink = AudioSink::with_encoder(
            dir,
            descriptor,
            &AudioSettings::default(),
            Box::new(CapturingEncoder(Arc::clone(&captured))),
        )
        .unwrap();
        (sink, captured)
    }

    #[test]
    fn test_mono_is_duplicated() {
        let [left, right] = map_to_stereo(vec![vec![0.1, 0.2, 0.3]]);
        assert_eq!(left, vec![0.1, 0.2, 0.3]);
        assert_eq!(right, left);
    }

    #[test]
    fn test_extra_channels_are_dropped() {
        let planes = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        let [left, right] = map_to_stereo(planes);
        assert_eq!(left, vec![1.0]);
        assert_eq!(right, vec![2.0]);
    }

    #[test]
    fn test_int16_normalization() {
        assert_eq!(normalize(-32_768.0, ChannelFormat::Int16), -1.0);
        assert_eq!(normalize(16_384.0, ChannelFormat::Int16), 0.5);
        assert_eq!(normalize(0.25, ChannelFormat::Float32), 0.25);
    }

    #[test]
    fn test_int16_output_matches_input_scale() {
        for raw in [-32_768.0, -1.0, 0.0, 16_384.0, 32_767.0] {
            assert_eq!(to_i16(normalize(raw, ChannelFormat::Int16)) as f64, raw);
        }
        assert_eq!(to_i16(1.0), i16::MAX);
        assert_eq!(to_i16(-1.5), i16::MIN);
    }

    #[test]
    fn test_resampled_blocks_compensate_filter_delay() {
        let mut resampler = StereoResampler::new(8_000, 16_000).unwrap();
        let delay = resampler.inner.output_delay() as f64 / 16_000.0;
        assert!(delay > 0.0);

        let frames = resampler.inner.input_frames_next();
        let timestamps: Vec<f64> = (0..frames).map(|i| 10.0 + i as f64 / 8_000.0).collect();
        let blocks = resampler.push([vec![0.0; frames], vec![0.0; frames]], &timestamps);

        assert_eq!(blocks.len(), 1);
        let (timestamp, planes) = blocks.into_iter().next().unwrap().unwrap();
        assert_eq!(planes.len(), 2);
        assert!((timestamp - (10.0 - delay)).abs() < 1e-12);
    }

    #[test]
    fn test_irregular_rate_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let result = AudioSink::create(dir.path(), &mic(1, 0.0), &AudioSettings::default());
        assert!(matches!(result, Err(RelayError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_pts_relative_to_first_chunk() {
        let dir = TempDir::new().unwrap();
        let (mut sink, captured) = capture_sink(dir.path(), &mic(1, 100.0));

        sink.write_chunk(&Chunk::numeric(vec![vec![0.0]; 10], vec![5.0; 10]), 1.0)
            .unwrap();
        sink.write_chunk(&Chunk::numeric(vec![vec![0.0]; 10], vec![5.1; 10]), 1.0)
            .unwrap();
        let summary = sink.close().unwrap();

        let captured = captured.lock().unwrap();
        let pts: Vec<i64> = captured.frames.iter().map(|f| f.pts).collect();
        assert_eq!(pts, vec![0, 10]);
        assert_eq!(captured.frames[1].timestamp, 6.1);
        assert!(captured.finished);
        assert_eq!(summary.written, 2);
        assert_eq!(summary.dropped, 0);
    }

    #[test]
    fn test_backwards_frame_is_dropped() {
        let dir = TempDir::new().unwrap();
        let (mut sink, _captured) = capture_sink(dir.path(), &mic(2, 100.0));

        sink.write_chunk(&Chunk::numeric(vec![vec![0.0, 0.0]; 4], vec![2.0; 4]), 0.0)
            .unwrap();
        sink.write_chunk(&Chunk::numeric(vec![vec![0.0, 0.0]; 4], vec![1.0; 4]), 0.0)
            .unwrap();
        sink.write_chunk(&Chunk::numeric(vec![vec![0.0, 0.0]; 4], vec![3.0; 4]), 0.0)
            .unwrap();

        assert_eq!(sink.frames_recorded(), 2);
        assert_eq!(sink.frames_dropped(), 1);
    }

    #[test]
    fn test_timestamps_sidecar_layout() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ts.npy");
        write_npy_f64(&path, &[1.5, 2.5]).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..6], b"\x93NUMPY");
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        assert_eq!((10 + header_len) % 64, 0);
        let header = std::str::from_utf8(&bytes[10..10 + header_len]).unwrap();
        assert!(header.contains("'shape': (2,)"));
        assert!(header.ends_with('\n'));
        let data = &bytes[10 + header_len..];
        assert_eq!(data.len(), 16);
        assert_eq!(f64::from_le_bytes(data[8..16].try_into().unwrap()), 2.5);
    }

    #[test]
    fn test_wav_output_with_resampling() {
        let dir = TempDir::new().unwrap();
        let settings = AudioSettings {
            target_sample_rate: Some(16_000),
            ..Default::default()
        };
        let mut sink = AudioSink::create(dir.path(), &mic(1, 8_000.0), &settings).unwrap();

        let samples: Vec<Vec<f64>> = (0..3_000).map(|i| vec![(i % 200) as f64 * 100.0]).collect();
        let timestamps: Vec<f64> = (0..3_000).map(|i| i as f64 / 8_000.0).collect();
        sink.write_chunk(&Chunk::numeric(samples, timestamps), 0.0).unwrap();
        let summary = sink.close().unwrap();

        assert!(summary.written >= 2);
        assert_eq!(summary.dropped, 0);
        let reader = hound::WavReader::open(dir.path().join(AUDIO_FILE_NAME)).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 2);

        let bytes = std::fs::read(dir.path().join(TIMESTAMPS_FILE_NAME)).unwrap();
        let header_len = u16::from_le_bytes([bytes[8], bytes[9]]) as usize;
        let data = &bytes[10 + header_len..];
        let first = f64::from_le_bytes(data[..8].try_into().unwrap());
        assert!(first < 0.0);
    }

    #[test]
    fn test_int16_wav_samples_read_back_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut sink = AudioSink::create(dir.path(), &mic(1, 8_000.0), &AudioSettings::default()).unwrap();
        sink.write_chunk(
            &Chunk::numeric(vec![vec![-32_768.0], vec![16_384.0], vec![32_767.0]], vec![0.0, 0.000125, 0.00025]),
            0.0,
        )
        .unwrap();
        sink.close().unwrap();

        let mut reader = hound::WavReader::open(dir.path().join(AUDIO_FILE_NAME)).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![-32_768, -32_768, 16_384, 16_384, 32_767, 32_767]);
    }
}
