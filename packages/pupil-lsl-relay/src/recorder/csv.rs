// Tabular sink: one CSV file per recorded stream

use super::{SampleSink, SinkSummary};
use crate::error::RelayResult;
use crate::types::{Chunk, ChunkData, StreamDescriptor};
use std::fs::File;
use std::path::{Path, PathBuf};

/// Writes `[timestamp + offset, raw values...]` rows
pub struct CsvSink {
    path: PathBuf,
    writer: Option<::csv::Writer<File>>,
    rows: usize,
}

impl CsvSink {
    /// `lsl_{name}_{hostname}_{source_id}.csv`
    pub fn file_name(descriptor: &StreamDescriptor) -> String {
        format!(
            "lsl_{}_{}_{}.csv",
            sanitize(&descriptor.name),
            sanitize(&descriptor.hostname),
            sanitize(&descriptor.source_id)
        )
    }

    /// `timestamp` followed by the declared channel labels. Positions without
    /// a declared label are named `channel_{i}`.
    pub fn header(descriptor: &StreamDescriptor) -> Vec<String> {
        let mut declared = descriptor.channel_labels().unwrap_or_default();
        if declared.len() > descriptor.channel_count {
            log::debug!(
                "{} declares {} labels for {} channels",
                descriptor.label(),
                declared.len(),
                descriptor.channel_count
            );
            declared.truncate(descriptor.channel_count);
        }
        let missing = (declared.len()..descriptor.channel_count).map(|i| format!("channel_{}", i));
        std::iter::once("timestamp".to_string())
            .chain(declared)
            .chain(missing)
            .collect()
    }

    pub fn create(dir: &Path, descriptor: &StreamDescriptor) -> RelayResult<Self> {
        let path = dir.join(Self::file_name(descriptor));
        let mut writer = ::csv::Writer::from_path(&path)?;
        writer.write_record(Self::header(descriptor))?;
        log::debug!("Writing {} to {:?}", descriptor.label(), path);
        Ok(Self {
            path,
            writer: Some(writer),
            rows: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SampleSink for CsvSink {
    fn write_chunk(&mut self, chunk: &Chunk, offset: f64) -> RelayResult<usize> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(0);
        };

        match &chunk.data {
            ChunkData::Numeric(samples) => {
                for (timestamp, sample) in chunk.timestamps.iter().zip(samples) {
                    let row = std::iter::once(timestamp + offset)
                        .chain(sample.iter().copied())
                        .map(|v| v.to_string());
                    writer.write_record(row)?;
                }
            }
            ChunkData::Text(samples) => {
                for (timestamp, sample) in chunk.timestamps.iter().zip(samples) {
                    let row = std::iter::once((timestamp + offset).to_string())
                        .chain(sample.iter().cloned());
                    writer.write_record(row)?;
                }
            }
        }

        self.rows += chunk.len();
        Ok(chunk.len())
    }

    fn close(&mut self) -> RelayResult<SinkSummary> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
        }
        Ok(SinkSummary {
            files: vec![self.path.clone()],
            written: self.rows,
            dropped: 0,
        })
    }
}

/// Keep file name components inside the session directory
fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}
