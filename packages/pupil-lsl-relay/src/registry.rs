// Tracking of discovered sources and the user's record preferences

use crate::types::StreamDescriptor;
use std::collections::{BTreeMap, BTreeSet};

/// Result of reconciling a discovery cycle against the known stream set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
}

impl StreamDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// `added = current - previous`, `removed = previous - current`
pub fn diff_ids(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> StreamDiff {
    StreamDiff {
        added: current.difference(previous).cloned().collect(),
        removed: previous.difference(current).cloned().collect(),
    }
}

/// Known streams keyed by source id, plus record preferences keyed by label
#[derive(Debug, Clone, Default)]
pub struct StreamRegistry {
    streams: BTreeMap<String, StreamDescriptor>,
    preferences: BTreeMap<String, bool>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore previously persisted preferences
    pub fn with_preferences(preferences: BTreeMap<String, bool>) -> Self {
        Self {
            streams: BTreeMap::new(),
            preferences,
        }
    }

    /// Replace the known stream set with `discovered`.
    ///
    /// Labels seen for the first time default to being recorded; existing
    /// preferences are left untouched.
    pub fn reconcile(&mut self, discovered: Vec<StreamDescriptor>) -> StreamDiff {
        let previous: BTreeSet<String> = self.streams.keys().cloned().collect();
        let current: BTreeMap<String, StreamDescriptor> = discovered
            .into_iter()
            .map(|d| (d.source_id.clone(), d))
            .collect();
        let current_ids: BTreeSet<String> = current.keys().cloned().collect();
        let diff = diff_ids(&previous, &current_ids);

        for id in &diff.added {
            let descriptor = &current[id];
            log::info!("Stream discovered: {} [{}]", descriptor.label(), id);
        }
        for id in &diff.removed {
            if let Some(descriptor) = self.streams.get(id) {
                log::info!("Stream removed: {} [{}]", descriptor.label(), id);
            }
        }

        for descriptor in current.values() {
            self.preferences.entry(descriptor.label()).or_insert(true);
        }
        self.streams = current;
        diff
    }

    pub fn streams(&self) -> impl Iterator<Item = &StreamDescriptor> {
        self.streams.values()
    }

    pub fn get(&self, source_id: &str) -> Option<&StreamDescriptor> {
        self.streams.get(source_id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn should_record(&self, label: &str) -> bool {
        self.preferences.get(label).copied().unwrap_or(true)
    }

    pub fn set_should_record(&mut self, label: impl Into<String>, record: bool) {
        self.preferences.insert(label.into(), record);
    }

    /// Known streams whose label is enabled, in source id order
    pub fn streams_to_record(&self) -> Vec<StreamDescriptor> {
        self.streams
            .values()
            .filter(|d| self.should_record(&d.label()))
            .cloned()
            .collect()
    }

    pub fn preferences(&self) -> &BTreeMap<String, bool> {
        &self.preferences
    }
}
