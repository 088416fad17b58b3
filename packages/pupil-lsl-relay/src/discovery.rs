// Background stream discovery for interactive selection
//
// A tokio task polls a resolver on a fixed interval and reports the additions
// and removals of each poll as one batch over a bounded channel. The first
// batch with an addition also fires a one-shot signal, after it is queued, so a
// caller can wait for something to show up before prompting.

use crate::registry::diff_ids;
use crate::transport::StreamResolver;
use crate::types::StreamDescriptor;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const RELOAD_COMMAND: &str = "R";

#[derive(Debug, Clone, PartialEq)]
pub enum DiscoveryEvent {
    Added(StreamDescriptor),
    /// Source id of a stream that disappeared
    Removed(String),
}

/// Streams reported so far, in source id order
#[derive(Debug, Clone, Default)]
pub struct DiscoveredStreams {
    streams: BTreeMap<String, StreamDescriptor>,
}

impl DiscoveredStreams {
    pub fn apply(&mut self, event: DiscoveryEvent) {
        match event {
            DiscoveryEvent::Added(descriptor) => {
                self.streams.insert(descriptor.source_id.clone(), descriptor);
            }
            DiscoveryEvent::Removed(source_id) => {
                self.streams.remove(&source_id);
            }
        }
    }

    pub fn list(&self) -> Vec<&StreamDescriptor> {
        self.streams.values().collect()
    }

    pub fn get(&self, index: usize) -> Option<&StreamDescriptor> {
        self.streams.values().nth(index)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

pub struct DiscoveryWatcher {
    events: mpsc::Receiver<Vec<DiscoveryEvent>>,
    first_result: Option<oneshot::Receiver<()>>,
    cancel_token: CancellationToken,
    task: JoinHandle<()>,
}

impl DiscoveryWatcher {
    /// Start polling `resolver` every `interval`. `capacity` bounds the number
    /// of queued polls. Must be called from within a tokio runtime.
    pub fn spawn(resolver: Box<dyn StreamResolver>, interval: Duration, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (first_tx, first_rx) = oneshot::channel();
        let cancel_token = CancellationToken::new();
        let task = tokio::spawn(poll_loop(
            resolver,
            interval,
            tx,
            first_tx,
            cancel_token.clone(),
        ));

        Self {
            events: rx,
            first_result: Some(first_rx),
            cancel_token,
            task,
        }
    }

    /// Wait until the first stream has been discovered. Returns `false` on
    /// timeout or when the watcher stopped before finding anything.
    pub async fn wait_first_result(&mut self, timeout: Duration) -> bool {
        let Some(first_result) = self.first_result.as_mut() else {
            return true;
        };
        match tokio::time::timeout(timeout, first_result).await {
            Ok(Ok(())) => {
                self.first_result = None;
                true
            }
            Ok(Err(_)) | Err(_) => false,
        }
    }

    /// Apply every pending event to `streams`. Returns the number applied.
    pub fn drain_events(&mut self, streams: &mut DiscoveredStreams) -> usize {
        let mut applied = 0;
        while let Ok(batch) = self.events.try_recv() {
            applied += batch.len();
            for event in batch {
                streams.apply(event);
            }
        }
        applied
    }

    pub async fn shutdown(self) {
        self.cancel_token.cancel();
        if let Err(e) = self.task.await {
            log::warn!("Discovery task ended abnormally: {}", e);
        }
    }
}

async fn poll_loop(
    mut resolver: Box<dyn StreamResolver>,
    interval: Duration,
    tx: mpsc::Sender<Vec<DiscoveryEvent>>,
    first_tx: oneshot::Sender<()>,
    cancel_token: CancellationToken,
) {
    let mut first_tx = Some(first_tx);
    let mut known: BTreeSet<String> = BTreeSet::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let discovered: BTreeMap<String, StreamDescriptor> = resolver
            .results()
            .into_iter()
            .map(|d| (d.source_id.clone(), d))
            .collect();
        let current: BTreeSet<String> = discovered.keys().cloned().collect();
        let diff = diff_ids(&known, &current);
        known = current;

        let batch: Vec<DiscoveryEvent> = diff
            .removed
            .into_iter()
            .map(DiscoveryEvent::Removed)
            .chain(
                diff.added
                    .iter()
                    .filter_map(|id| discovered.get(id).cloned())
                    .map(DiscoveryEvent::Added),
            )
            .collect();
        if batch.is_empty() {
            continue;
        }
        let has_addition = batch.iter().any(|e| matches!(e, DiscoveryEvent::Added(_)));
        log::debug!("Discovery poll changed {} streams", batch.len());

        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => break,
            sent = tx.send(batch) => {
                if sent.is_err() {
                    log::debug!("Discovery receiver dropped, stopping");
                    break;
                }
            }
        }
        if has_addition {
            if let Some(first_tx) = first_tx.take() {
                let _ = first_tx.send(());
            }
        }
    }
    log::debug!("Discovery watcher stopped");
}

/// Answer to the interactive selection prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Index(usize),
    Reload,
    Invalid(String),
}

/// Interpret user input against a list of `shown` entries
pub fn parse_selection(input: &str, shown: usize) -> Selection {
    let input = input.trim();
    if input.eq_ignore_ascii_case(RELOAD_COMMAND) {
        return Selection::Reload;
    }
    match input.parse::<usize>() {
        Ok(index) if index < shown => Selection::Index(index),
        _ => Selection::Invalid(input.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryBus;
    use crate::transport::{ResolveFilter, Transport};
    use crate::types::ChannelFormat;

    #[test]
    fn test_parse_selection() {
        assert_eq!(parse_selection(" 1 \n", 3), Selection::Index(1));
        assert_eq!(parse_selection("r", 3), Selection::Reload);
        assert_eq!(parse_selection("R", 0), Selection::Reload);
        assert_eq!(parse_selection("3", 3), Selection::Invalid("3".into()));
        assert_eq!(parse_selection("abc", 3), Selection::Invalid("abc".into()));
    }

    #[test]
    fn test_discovered_streams_apply() {
        let mut streams = DiscoveredStreams::default();
        let descriptor =
            StreamDescriptor::new("b", "eeg", "EEG", "host", 1, 10.0, ChannelFormat::Float32);
        streams.apply(DiscoveryEvent::Added(descriptor.clone()));
        streams.apply(DiscoveryEvent::Added(StreamDescriptor {
            source_id: "a".into(),
            ..descriptor
        }));
        assert_eq!(streams.get(0).map(|d| d.source_id.as_str()), Some("a"));

        streams.apply(DiscoveryEvent::Removed("a".into()));
        assert_eq!(streams.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watcher_reports_first_result() {
        let bus = MemoryBus::new();
        let mut watcher =
            DiscoveryWatcher::spawn(bus.resolver(ResolveFilter::All), Duration::from_secs(1), 8);
        assert!(!watcher.wait_first_result(Duration::from_millis(1500)).await);

        bus.add_source(StreamDescriptor::new(
            "s1",
            "gaze",
            "Gaze",
            "host",
            2,
            0.0,
            ChannelFormat::Double64,
        ));
        assert!(watcher.wait_first_result(Duration::from_secs(5)).await);

        let mut streams = DiscoveredStreams::default();
        assert_eq!(watcher.drain_events(&mut streams), 1);
        assert_eq!(streams.list()[0].name, "gaze");
        watcher.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_first_result_sees_whole_poll() {
        let bus = MemoryBus::new();
        for i in 0..50 {
            bus.add_source(StreamDescriptor::new(
                format!("s{:02}", i),
                "eeg",
                "EEG",
                "host",
                1,
                100.0,
                ChannelFormat::Float32,
            ));
        }
        let mut watcher =
            DiscoveryWatcher::spawn(bus.resolver(ResolveFilter::All), Duration::from_millis(50), 4);
        assert!(watcher.wait_first_result(Duration::from_secs(5)).await);

        let mut streams = DiscoveredStreams::default();
        assert_eq!(watcher.drain_events(&mut streams), 50);
        assert_eq!(streams.len(), 50);
        assert_eq!(streams.get(49).map(|d| d.source_id.as_str()), Some("s49"));
        watcher.shutdown().await;
    }
}
