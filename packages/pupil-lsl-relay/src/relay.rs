// Relay of host events to announced outlets

use crate::clock::{HostClock, OutletClock};
use crate::config::OutletRecord;
use crate::error::RelayResult;
use crate::event::PupilEvent;
use crate::outlet::{Outlet, OutletKind};
use crate::transport::Transport;
use std::collections::BTreeMap;

pub struct Relay {
    outlets: Vec<Outlet>,
    clock: OutletClock,
}

impl Relay {
    /// Measure the host/bus offset once and announce one outlet per kind.
    ///
    /// Source ids of `previous` outlets are reused for matching kinds so
    /// consumers see the same stream across restarts. Records of kinds that
    /// are not being set up are skipped with a warning.
    pub fn setup(
        transport: &dyn Transport,
        previous: &[OutletRecord],
        host_clock: &HostClock,
        kinds: &[OutletKind],
    ) -> RelayResult<Self> {
        let clock = OutletClock::measure(host_clock, transport);

        let mut uuids: BTreeMap<OutletKind, Option<String>> =
            kinds.iter().map(|kind| (*kind, None)).collect();
        for record in previous {
            let restored = OutletKind::from_type_name(&record.type_name)
                .ok()
                .and_then(|kind| uuids.get_mut(&kind));
            match restored {
                Some(slot) => *slot = Some(record.uuid.clone()),
                None => log::warn!("Previous outlet type `{}` not available!", record.type_name),
            }
        }

        let mut outlets = Vec::with_capacity(kinds.len());
        for kind in kinds {
            let uuid = uuids.get(kind).cloned().flatten();
            outlets.push(Outlet::announce(transport, *kind, uuid, clock)?);
        }
        for outlet in &outlets {
            log::info!(
                "Relaying {} ({}) as {}",
                outlet.kind().stream_name(),
                outlet.kind().stream_type(),
                outlet.uuid()
            );
        }

        Ok(Self { outlets, clock })
    }

    /// Push every event to the outlets consuming its key. Returns the number
    /// of samples pushed.
    pub fn recent_events(&mut self, events: &[PupilEvent]) -> usize {
        let mut pushed = 0;
        for outlet in &mut self.outlets {
            let key = outlet.kind().event_key();
            for event in events.iter().filter(|e| e.key() == key) {
                if outlet.push(event) {
                    pushed += 1;
                }
            }
        }
        pushed
    }

    /// Outlet identities to persist for the next run
    pub fn previous_outlets(&self) -> Vec<OutletRecord> {
        self.outlets.iter().map(Outlet::record).collect()
    }

    pub fn outlets(&self) -> &[Outlet] {
        &self.outlets
    }

    pub fn clock(&self) -> OutletClock {
        self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::fixed_host_clock;
    use crate::event::fixtures::*;
    use crate::transport::memory::MemoryBus;

    #[test]
    fn test_uuids_restored_by_type_name() {
        let bus = MemoryBus::new();
        let previous = vec![
            OutletRecord {
                type_name: "SceneCameraGaze".into(),
                uuid: "gaze-uuid".into(),
            },
            OutletRecord {
                type_name: "SceneCameraSurfaces".into(),
                uuid: "gone".into(),
            },
        ];

        let relay = Relay::setup(&bus, &previous, &fixed_host_clock(0.0), &OutletKind::CAPTURE)
            .unwrap();
        let records = relay.previous_outlets();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].uuid, "gaze-uuid");
        assert_ne!(records[1].uuid, "gone");
    }

    #[test]
    fn test_events_routed_by_key() {
        let bus = MemoryBus::new();
        bus.set_clock(40.0);
        let mut relay =
            Relay::setup(&bus, &[], &fixed_host_clock(100.0), &OutletKind::CAPTURE).unwrap();
        assert_eq!(relay.clock().offset(), 60.0);

        let events = vec![
            PupilEvent::from_json(&gaze_3d_binocular_json()).unwrap(),
            PupilEvent::from_json(&fixation_json()).unwrap(),
            PupilEvent::from_json(&pupil_json(0, true)).unwrap(),
            PupilEvent::from_json(&pupil_json(1, false)).unwrap(),
        ];
        assert_eq!(relay.recent_events(&events), 4);

        let records = relay.previous_outlets();
        let gaze = bus.pushed_samples(&records[0].uuid);
        assert_eq!(gaze.len(), 1);
        assert_eq!(gaze[0].1, 14.0 - 60.0);
        assert_eq!(bus.pushed_samples(&records[1].uuid).len(), 1);
        assert_eq!(bus.pushed_samples(&records[2].uuid).len(), 2);
    }

    #[test]
    fn test_invisible_relay() {
        let bus = MemoryBus::new();
        let mut relay = Relay::setup(
            &bus,
            &[],
            &fixed_host_clock(1_600_000_010.0),
            &[OutletKind::InvisibleGaze],
        )
        .unwrap();

        let gaze = PupilEvent::from_json(&serde_json::json!({
            "x": 512.0, "y": 384.0, "timestamp": 1_600_000_005.0
        }))
        .unwrap();
        assert_eq!(relay.recent_events(&[gaze]), 1);

        let uuid = relay.outlets()[0].uuid().to_string();
        let pushed = bus.pushed_samples(&uuid);
        assert_eq!(pushed[0].0, vec![512.0, 384.0, 1_600_000_005.0]);
        assert_eq!(pushed[0].1, -5.0);
    }
}
