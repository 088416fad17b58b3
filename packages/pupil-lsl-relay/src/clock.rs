// Clock alignment between the host, the bus and individual sources

use crate::error::RelayResult;
use crate::transport::{Inlet, Transport};
use std::sync::Arc;

/// Host reference clock in seconds
pub type HostClock = Arc<dyn Fn() -> f64 + Send + Sync>;

/// Wall clock seconds since the Unix epoch
pub fn system_host_clock() -> HostClock {
    Arc::new(|| chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0)
}

/// Host clock that always reads `now`
pub fn fixed_host_clock(now: f64) -> HostClock {
    Arc::new(move || now)
}

/// Offset mapping a source timestamp onto the host clock:
/// `local_now - remote_clock_probe() + time_correction()`.
pub fn compute_offset(
    local_now: f64,
    remote_clock_probe: impl FnOnce() -> f64,
    time_correction: impl FnOnce() -> f64,
) -> f64 {
    local_now - remote_clock_probe() + time_correction()
}

/// Per-recorder clock offset, re-measured before every drain
#[derive(Debug, Clone)]
pub struct ClockSync {
    timeout: f64,
    last_correction: Option<f64>,
    last_offset: Option<f64>,
}

impl ClockSync {
    pub fn new(timeout: f64) -> Self {
        Self {
            timeout,
            last_correction: None,
            last_offset: None,
        }
    }

    /// Query a fresh time correction and recompute the offset.
    ///
    /// Fails with `CorrectionTimeout` when the probe does not answer in time
    /// and with `ConnectionLost` when the source is gone.
    pub fn resync(
        &mut self,
        local_now: f64,
        remote_now: f64,
        inlet: &mut dyn Inlet,
    ) -> RelayResult<f64> {
        let correction = inlet.time_correction(self.timeout)?;
        let offset = compute_offset(local_now, || remote_now, || correction);
        self.last_correction = Some(correction);
        self.last_offset = Some(offset);
        Ok(offset)
    }

    pub fn last_correction(&self) -> Option<f64> {
        self.last_correction
    }

    pub fn last_offset(&self) -> Option<f64> {
        self.last_offset
    }
}

/// One-time offset between the host clock and the bus clock, applied to
/// timestamps of relayed events.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutletClock {
    offset: f64,
}

impl OutletClock {
    pub fn measure(host_clock: &HostClock, transport: &dyn Transport) -> Self {
        let host_now = host_clock();
        let bus_now = transport.local_clock();
        let clock = Self {
            offset: host_now - bus_now,
        };
        log::info!("Synchronized time epoch to LSL clock");
        log::debug!(
            "Host time: {}, LSL time: {}, offset: {}",
            host_now,
            bus_now,
            clock.offset
        );
        clock
    }

    pub fn with_offset(offset: f64) -> Self {
        Self { offset }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Map a host timestamp onto the bus clock
    pub fn to_bus_time(&self, host_timestamp: f64) -> f64 {
        host_timestamp - self.offset
    }
}
