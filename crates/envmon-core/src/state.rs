//! State shared between the display task and the network loop.
//!
//! Every field has exactly one writer:
//! - measurements and link view: the orchestrator
//! - bind status: the orchestrator
//! - time sync record: the orchestrator (write-once)
//! - shutdown flags: whoever requests shutdown (monotonic)
//!
//! Readers take best-effort snapshots of single fields and never need
//! several fields to be consistent with each other. No lock is held for
//! longer than one field read or write.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::model::{BindStatus, LinkView, Measurement};

/// Marker bit for a present value in a [`ReadingCell`].
const PRESENT: u64 = 1 << 32;

/// A lock-free `Option<f32>`.
///
/// Stored as the f32 bits in the low word plus a presence bit. NaN
/// readings are stored as absent.
#[derive(Debug, Default)]
struct ReadingCell(AtomicU64);

impl ReadingCell {
    fn load(&self) -> Option<f32> {
        let raw = self.0.load(Ordering::Relaxed);
        if raw & PRESENT == 0 {
            None
        } else {
            Some(f32::from_bits(raw as u32))
        }
    }

    fn store(&self, value: Option<f32>) {
        let raw = match value {
            Some(v) if !v.is_nan() => PRESENT | u64::from(v.to_bits()),
            _ => 0,
        };
        self.0.store(raw, Ordering::Relaxed);
    }
}

#[derive(Debug, Default)]
struct MeasurementCell {
    temperature: ReadingCell,
    humidity: ReadingCell,
}

/// Two-phase shutdown request.
///
/// `exit` is raised by whoever wants the device to stop (a button, a
/// signal, the display task propagating a stop). `stop` is raised by the
/// orchestrator once it has left its serve loop. Both flags only ever go
/// from false to true.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    exit: AtomicBool,
    stop: AtomicBool,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every task to wind down.
    pub fn request_exit(&self) {
        self.exit.store(true, Ordering::Release);
    }

    /// Announce that the network loop has stopped.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// True once either flag is set.
    pub fn is_requested(&self) -> bool {
        self.exit_requested() || self.stop_requested()
    }

    /// True once both flags are set.
    pub fn is_halted(&self) -> bool {
        self.exit_requested() && self.stop_requested()
    }
}

/// Wall-clock anchor captured at the first successful time sync.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSync {
    /// Monotonic instant of the sync; also the uptime origin.
    pub origin: Instant,
    /// UTC time reported by the time source at `origin`.
    pub utc: DateTime<Utc>,
}

impl TimeSync {
    /// Current UTC time extrapolated from the sync point.
    pub fn now_utc(&self) -> DateTime<Utc> {
        self.utc_at(Instant::now())
    }

    pub fn utc_at(&self, at: Instant) -> DateTime<Utc> {
        let elapsed = at.saturating_duration_since(self.origin);
        match chrono::Duration::from_std(elapsed) {
            Ok(offset) => self.utc + offset,
            Err(_) => self.utc,
        }
    }

    /// Time elapsed since the sync point.
    pub fn uptime(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Device state shared by the display task and the orchestrator.
#[derive(Debug)]
pub struct SharedState {
    measurements: Vec<MeasurementCell>,
    link: RwLock<LinkView>,
    bind: AtomicU8,
    shutdown: ShutdownSignal,
    time_sync: OnceLock<TimeSync>,
}

impl SharedState {
    /// Create state for a fixed number of sensors, all readings unknown.
    pub fn new(sensor_count: usize) -> Self {
        Self {
            measurements: (0..sensor_count).map(|_| MeasurementCell::default()).collect(),
            link: RwLock::new(LinkView::NotAttempted),
            bind: AtomicU8::new(BindStatus::Unknown.as_u8()),
            shutdown: ShutdownSignal::new(),
            time_sync: OnceLock::new(),
        }
    }

    pub fn sensor_count(&self) -> usize {
        self.measurements.len()
    }

    /// Publish one sensor's measurement.
    ///
    /// Returns false if `index` is not a configured sensor position.
    pub fn publish(&self, index: usize, measurement: Measurement) -> bool {
        match self.measurements.get(index) {
            Some(cell) => {
                cell.temperature.store(measurement.temperature);
                cell.humidity.store(measurement.humidity);
                true
            }
            None => false,
        }
    }

    /// Publish a full sample, in sensor order.
    pub fn publish_all(&self, measurements: &[Measurement]) {
        for (index, measurement) in measurements.iter().enumerate() {
            self.publish(index, *measurement);
        }
    }

    /// Latest measurement of one sensor.
    pub fn measurement(&self, index: usize) -> Option<Measurement> {
        self.measurements.get(index).map(|cell| Measurement {
            temperature: cell.temperature.load(),
            humidity: cell.humidity.load(),
        })
    }

    /// Latest measurements of all sensors, in sensor order.
    pub fn measurements(&self) -> Vec<Measurement> {
        (0..self.measurements.len())
            .filter_map(|index| self.measurement(index))
            .collect()
    }

    /// Latest temperatures of all sensors, as served over HTTP.
    pub fn temperatures(&self) -> Vec<Option<f32>> {
        self.measurements
            .iter()
            .map(|cell| cell.temperature.load())
            .collect()
    }

    pub fn set_link(&self, link: LinkView) {
        *self.link.write().unwrap_or_else(PoisonError::into_inner) = link;
    }

    pub fn link(&self) -> LinkView {
        self.link
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_bind(&self, status: BindStatus) {
        self.bind.store(status.as_u8(), Ordering::Release);
    }

    pub fn bind(&self) -> BindStatus {
        BindStatus::from_u8(self.bind.load(Ordering::Acquire))
    }

    pub fn shutdown(&self) -> &ShutdownSignal {
        &self.shutdown
    }

    /// Record the first successful time sync.
    ///
    /// Returns false (and keeps the original record) if a sync was
    /// already recorded.
    pub fn record_time_sync(&self, utc: DateTime<Utc>) -> bool {
        self.time_sync
            .set(TimeSync {
                origin: Instant::now(),
                utc,
            })
            .is_ok()
    }

    pub fn time_sync(&self) -> Option<TimeSync> {
        self.time_sync.get().copied()
    }

    /// Time since the first time sync, if there was one.
    pub fn uptime(&self) -> Option<Duration> {
        self.time_sync.get().map(TimeSync::uptime)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn test_new_state_is_unknown() {
        let state = SharedState::new(2);

        assert_eq!(state.sensor_count(), 2);
        assert_eq!(state.measurements(), vec![Measurement::UNKNOWN; 2]);
        assert_eq!(state.link(), LinkView::NotAttempted);
        assert_eq!(state.bind(), BindStatus::Unknown);
        assert!(state.uptime().is_none());
    }

    #[test]
    fn test_publish_and_degrade() {
        let state = SharedState::new(2);

        state.publish_all(&[Measurement::new(22.0, 55.0), Measurement::new(19.5, 40.0)]);
        assert_eq!(state.measurement(0), Some(Measurement::new(22.0, 55.0)));

        // A failed read degrades the slot, it does not remove it
        state.publish(1, Measurement::UNKNOWN);
        assert_eq!(state.measurement(1), Some(Measurement::UNKNOWN));
        assert_eq!(state.temperatures(), vec![Some(22.0), None]);
    }

    #[test]
    fn test_publish_out_of_range() {
        let state = SharedState::new(1);

        assert!(!state.publish(3, Measurement::new(1.0, 2.0)));
        assert_eq!(state.measurement(3), None);
        assert_eq!(state.measurements().len(), 1);
    }

    #[test]
    fn test_nan_reads_as_unknown() {
        let state = SharedState::new(1);

        state.publish(
            0,
            Measurement {
                temperature: Some(f32::NAN),
                humidity: Some(-0.0),
            },
        );

        let m = state.measurement(0).unwrap();
        assert_eq!(m.temperature, None);
        assert_eq!(m.humidity, Some(-0.0));
    }

    #[test]
    fn test_shutdown_is_monotonic() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_requested());

        signal.request_exit();
        assert!(signal.exit_requested());
        assert!(!signal.is_halted());

        // Raising again or raising the other flag never clears anything
        signal.request_exit();
        signal.request_stop();
        assert!(signal.exit_requested());
        assert!(signal.stop_requested());
        assert!(signal.is_halted());
    }

    #[test]
    fn test_time_sync_is_set_once() {
        let state = SharedState::new(0);
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        assert!(state.record_time_sync(first));
        assert!(!state.record_time_sync(second));
        assert_eq!(state.time_sync().unwrap().utc, first);
        assert!(state.uptime().is_some());
    }

    #[test]
    fn test_utc_extrapolation() {
        let origin = Instant::now();
        let utc = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let sync = TimeSync { origin, utc };

        let later = sync.utc_at(origin + Duration::from_secs(90));
        assert_eq!(later, Utc.with_ymd_and_hms(2024, 3, 1, 12, 1, 30).unwrap());
    }

    #[test]
    fn test_concurrent_single_writer() {
        let state = Arc::new(SharedState::new(1));
        let writer_state = state.clone();

        let writer = std::thread::spawn(move || {
            for i in 0..1000 {
                writer_state.publish(0, Measurement::new(i as f32, 50.0));
            }
            writer_state.shutdown().request_exit();
        });

        // Readers only ever see complete per-field values
        while !state.shutdown().exit_requested() {
            let m = state.measurement(0).unwrap();
            if let Some(t) = m.temperature {
                assert!((0.0..1000.0).contains(&t));
            }
        }
        writer.join().unwrap();
        assert_eq!(state.measurement(0), Some(Measurement::new(999.0, 50.0)));
    }
}
