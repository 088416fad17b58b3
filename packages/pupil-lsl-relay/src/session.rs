// Recording session driven by host notifications

use crate::clock::HostClock;
use crate::config::RecorderSettings;
use crate::error::RelayResult;
use crate::recorder::{RecorderSummary, SinkKind, StreamRecorder};
use crate::registry::{StreamDiff, StreamRegistry};
use crate::transport::{ResolveFilter, StreamResolver, Transport};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Host signals controlling the session lifecycle
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    RecordingStarted { rec_path: PathBuf },
    RecordingStopped,
}

/// What to do when some selected streams cannot be opened
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartPolicy {
    /// Record whatever could be opened
    #[default]
    AllowPartial,
    /// Abort the start if any stream fails to open
    RequireAll,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSummary {
    pub rec_path: PathBuf,
    pub recorders: Vec<RecorderSummary>,
    /// Labels of streams that could not be opened at start
    pub failed: Vec<String>,
}

struct RecordingSession {
    rec_path: PathBuf,
    recorders: Vec<StreamRecorder>,
    failed: Vec<String>,
}

/// Records every selected stream while the host is recording
pub struct RecorderPlugin {
    transport: Arc<dyn Transport>,
    resolver: Box<dyn StreamResolver>,
    registry: StreamRegistry,
    kind: SinkKind,
    host_clock: HostClock,
    connect_timeout: f64,
    policy: StartPolicy,
    session: Option<RecordingSession>,
}

impl RecorderPlugin {
    /// CSV recorder for all streams on the bus
    pub fn csv(
        transport: Arc<dyn Transport>,
        preferences: BTreeMap<String, bool>,
        settings: &RecorderSettings,
        host_clock: HostClock,
    ) -> Self {
        Self::new(transport, SinkKind::Csv, preferences, settings, host_clock)
    }

    /// Audio recorder for streams of type `Audio`
    pub fn audio(
        transport: Arc<dyn Transport>,
        preferences: BTreeMap<String, bool>,
        settings: &RecorderSettings,
        host_clock: HostClock,
    ) -> Self {
        let kind = SinkKind::Audio(settings.audio.clone());
        Self::new(transport, kind, preferences, settings, host_clock)
    }

    pub fn new(
        transport: Arc<dyn Transport>,
        kind: SinkKind,
        preferences: BTreeMap<String, bool>,
        settings: &RecorderSettings,
        host_clock: HostClock,
    ) -> Self {
        let filter = match kind {
            SinkKind::Csv => ResolveFilter::All,
            SinkKind::Audio(_) => ResolveFilter::Type("Audio".to_string()),
        };
        let resolver = transport.resolver(filter);
        Self {
            transport,
            resolver,
            registry: StreamRegistry::with_preferences(preferences),
            kind,
            host_clock,
            connect_timeout: settings.connect_timeout_secs,
            policy: StartPolicy::default(),
            session: None,
        }
    }

    pub fn with_policy(mut self, policy: StartPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn on_notify(&mut self, notification: &Notification) -> RelayResult<()> {
        match notification {
            Notification::RecordingStarted { rec_path } => {
                self.start_recording(rec_path)?;
            }
            Notification::RecordingStopped => {
                self.stop_recording();
            }
        }
        Ok(())
    }

    /// Per host tick: drain recorders while recording, otherwise refresh the
    /// list of available streams. Returns the number of samples written.
    pub fn recent_events(&mut self) -> usize {
        match self.session.as_mut() {
            Some(session) => session
                .recorders
                .iter_mut()
                .map(StreamRecorder::record_available_data)
                .sum(),
            None => {
                self.poll_streams();
                0
            }
        }
    }

    /// Query the resolver and reconcile the known stream set
    pub fn poll_streams(&mut self) -> StreamDiff {
        let discovered = self.resolver.results();
        self.registry.reconcile(discovered)
    }

    /// Open a recorder for every selected stream.
    ///
    /// Returns `false` without side effects when a session is already active.
    pub fn start_recording(&mut self, rec_path: &Path) -> RelayResult<bool> {
        if self.session.is_some() {
            log::debug!("Recording already active, ignoring start");
            return Ok(false);
        }
        self.poll_streams();
        std::fs::create_dir_all(rec_path)?;

        let mut selected = self.registry.streams_to_record();
        if matches!(self.kind, SinkKind::Audio(_)) && selected.len() > 1 {
            log::warn!(
                "{} audio streams selected, only {} is recorded",
                selected.len(),
                selected[0].label()
            );
            selected.truncate(1);
        }

        let mut recorders = Vec::with_capacity(selected.len());
        let mut failed = Vec::new();
        for descriptor in &selected {
            match StreamRecorder::open(
                Arc::clone(&self.transport),
                descriptor,
                rec_path,
                &self.kind,
                Arc::clone(&self.host_clock),
                self.connect_timeout,
            ) {
                Ok(recorder) => recorders.push(recorder),
                Err(e) => {
                    log::warn!("Could not record {}: {}", descriptor.label(), e);
                    if self.policy == StartPolicy::RequireAll {
                        for mut recorder in recorders {
                            if let Err(e) = recorder.close() {
                                log::error!("Failed to close recorder of {}: {}", recorder.label(), e);
                            }
                        }
                        return Err(e);
                    }
                    failed.push(descriptor.label());
                }
            }
        }

        log::info!(
            "Recording started in {:?} with {} streams",
            rec_path,
            recorders.len()
        );
        self.session = Some(RecordingSession {
            rec_path: rec_path.to_path_buf(),
            recorders,
            failed,
        });
        Ok(true)
    }

    /// Close every recorder. `None` when no session is active.
    pub fn stop_recording(&mut self) -> Option<SessionSummary> {
        let session = self.session.take()?;
        let mut recorders = Vec::with_capacity(session.recorders.len());
        for mut recorder in session.recorders {
            match recorder.close() {
                Ok(summary) => recorders.push(summary),
                Err(e) => log::error!("Failed to close recorder of {}: {}", recorder.label(), e),
            }
        }
        log::info!("Recording stopped");
        Some(SessionSummary {
            rec_path: session.rec_path,
            recorders,
            failed: session.failed,
        })
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Labels currently being recorded
    pub fn recording_labels(&self) -> Vec<String> {
        self.session
            .as_ref()
            .map(|s| s.recorders.iter().map(|r| r.label().to_string()).collect())
            .unwrap_or_default()
    }

    pub fn registry(&self) -> &StreamRegistry {
        &self.registry
    }

    pub fn set_should_record(&mut self, label: impl Into<String>, record: bool) {
        self.registry.set_should_record(label, record);
    }

    /// Preferences to persist for the next run
    pub fn init_config(&self) -> BTreeMap<String, bool> {
        self.registry.preferences().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed_host_clock;
    use crate::recorder::CsvSink;
    use crate::transport::memory::MemoryBus;
    use crate::types::{ChannelFormat, Chunk, StreamDescriptor};
    use tempfile::TempDir;

    fn stream(id: &str, name: &str, channels: usize) -> StreamDescriptor {
        StreamDescriptor::new(id, name, "EEG", "lab-pc", channels, 100.0, ChannelFormat::Float32)
    }

    fn plugin(bus: &MemoryBus) -> RecorderPlugin {
        RecorderPlugin::csv(
            Arc::new(bus.clone()),
            BTreeMap::new(),
            &RecorderSettings::default(),
            fixed_host_clock(0.0),
        )
    }

    #[test]
    fn test_start_twice_keeps_one_session() {
        let bus = MemoryBus::new();
        bus.add_source(stream("a", "eeg", 2));
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&bus);

        assert!(plugin.start_recording(dir.path()).unwrap());
        assert!(!plugin.start_recording(dir.path()).unwrap());
        assert_eq!(plugin.recording_labels(), vec!["eeg (lab-pc)".to_string()]);
        assert_eq!(bus.opened_streams("a"), 1);

        assert!(plugin.stop_recording().is_some());
        assert!(plugin.stop_recording().is_none());
        assert_eq!(bus.closed_streams("a"), 1);
    }

    #[test]
    fn test_notifications_drive_session() {
        let bus = MemoryBus::new();
        bus.add_source(stream("a", "eeg", 3));
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&bus);

        plugin
            .on_notify(&Notification::RecordingStarted {
                rec_path: dir.path().to_path_buf(),
            })
            .unwrap();
        assert!(plugin.is_recording());

        bus.queue_chunk("a", Chunk::numeric(vec![vec![1.0, 2.0, 3.0]], vec![1.0]));
        assert_eq!(plugin.recent_events(), 1);

        plugin.on_notify(&Notification::RecordingStopped).unwrap();
        plugin.on_notify(&Notification::RecordingStopped).unwrap();
        assert!(!plugin.is_recording());

        let content =
            std::fs::read_to_string(dir.path().join(CsvSink::file_name(&stream("a", "eeg", 3))))
                .unwrap();
        assert!(content.starts_with("timestamp,channel_0,channel_1,channel_2\n"));
    }

    #[test]
    fn test_idle_ticks_update_registry() {
        let bus = MemoryBus::new();
        let mut plugin = plugin(&bus);
        plugin.recent_events();
        assert!(plugin.registry().is_empty());

        bus.add_source(stream("a", "eeg", 2));
        plugin.recent_events();
        assert_eq!(plugin.registry().len(), 1);
        assert_eq!(plugin.init_config().get("eeg (lab-pc)"), Some(&true));
    }

    #[test]
    fn test_disabled_label_is_not_recorded() {
        let bus = MemoryBus::new();
        bus.add_source(stream("a", "eeg", 2));
        bus.add_source(stream("b", "emg", 2));
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&bus);
        plugin.set_should_record("eeg (lab-pc)", false);

        plugin.start_recording(dir.path()).unwrap();
        assert_eq!(plugin.recording_labels(), vec!["emg (lab-pc)".to_string()]);
    }

    #[test]
    fn test_partial_start_reports_failures() {
        let bus = MemoryBus::new();
        bus.add_source(stream("a", "eeg", 2));
        bus.add_source(stream("b", "emg", 2));
        bus.refuse_connections("a", true);
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&bus);

        plugin.start_recording(dir.path()).unwrap();
        let summary = plugin.stop_recording().unwrap();
        assert_eq!(summary.failed, vec!["eeg (lab-pc)".to_string()]);
        assert_eq!(summary.recorders.len(), 1);
    }

    #[test]
    fn test_require_all_aborts_and_closes() {
        let bus = MemoryBus::new();
        bus.add_source(stream("a", "eeg", 2));
        bus.add_source(stream("b", "emg", 2));
        bus.refuse_connections("b", true);
        bus.queue_chunk("a", Chunk::numeric(vec![vec![1.0, 2.0]], vec![1.0]));
        let dir = TempDir::new().unwrap();
        let mut plugin = plugin(&bus).with_policy(StartPolicy::RequireAll);

        assert!(plugin.start_recording(dir.path()).is_err());
        assert!(!plugin.is_recording());
        assert_eq!(bus.closed_streams("a"), 1);

        let path = dir.path().join(CsvSink::file_name(&stream("a", "eeg", 2)));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "timestamp,channel_0,channel_1\n1,1,2\n");
    }

    #[test]
    fn test_audio_records_first_stream_only() {
        let bus = MemoryBus::new();
        for id in ["mic-a", "mic-b"] {
            bus.add_source(StreamDescriptor::new(
                id,
                id,
                "Audio",
                "lab-pc",
                1,
                8000.0,
                ChannelFormat::Int16,
            ));
        }
        bus.add_source(stream("c", "eeg", 2));
        let dir = TempDir::new().unwrap();
        let mut plugin = RecorderPlugin::audio(
            Arc::new(bus.clone()),
            BTreeMap::new(),
            &RecorderSettings::default(),
            fixed_host_clock(0.0),
        );

        plugin.start_recording(dir.path()).unwrap();
        assert_eq!(plugin.recording_labels(), vec!["mic-a (lab-pc)".to_string()]);
        let summary = plugin.stop_recording().unwrap();
        assert_eq!(summary.recorders[0].sink.files.len(), 2);
    }
}
