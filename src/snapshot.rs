//! Raw satellite measurements, as delivered by the platform
//! measurement provider.
use std::sync::Arc;

use gnss_rs::prelude::SV;
use hifitime::prelude::Epoch;
use itertools::Itertools;
use tokio::sync::watch;

use crate::utils::to_constellation;

/// One raw per-satellite observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// Satellite vehicle (constellation and PRN)
    pub sv: SV,

    /// Carrier to noise density ratio (dB.Hz)
    pub cn0_dbhz: f64,

    /// Pseudo range rate (m.s⁻¹)
    pub pseudorange_rate_mps: f64,

    /// Accumulated delta range (m)
    pub accumulated_delta_range_m: f64,

    /// Carrier frequency (Hz), when reported
    pub carrier_frequency_hz: Option<f64>,

    /// Received satellite time (ns)
    pub received_sv_time_nanos: i64,

    /// Time offset with respect to the measurement epoch (ns)
    pub time_offset_nanos: f64,
}

impl std::fmt::Display for Measurement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} cn0={:.1} prr={:.7E} adr={:.7E}",
            self.sv, self.cn0_dbhz, self.pseudorange_rate_mps, self.accumulated_delta_range_m,
        )?;

        if let Some(freq) = self.carrier_frequency_hz {
            write!(f, " freq={:.7E}", freq)?;
        }

        Ok(())
    }
}

impl Measurement {
    pub fn new(sv: SV, cn0_dbhz: f64, pseudorange_rate_mps: f64) -> Self {
        Self {
            sv,
            cn0_dbhz,
            pseudorange_rate_mps,
            accumulated_delta_range_m: 0.0,
            carrier_frequency_hz: None,
            received_sv_time_nanos: 0,
            time_offset_nanos: 0.0,
        }
    }

    /// Builds [Measurement] from platform (Android location provider)
    /// constellation code and satellite number. Returns None for
    /// unknown constellation codes.
    pub fn from_platform(
        constellation_id: u8,
        svid: u8,
        cn0_dbhz: f64,
        pseudorange_rate_mps: f64,
    ) -> Option<Self> {
        let constellation = to_constellation(constellation_id)?;
        Some(Self::new(
            SV::new(constellation, svid),
            cn0_dbhz,
            pseudorange_rate_mps,
        ))
    }

    /// Copies and returns [Measurement] with accumulated delta range
    pub fn with_accumulated_delta_range(&self, adr_m: f64) -> Self {
        let mut s = *self;
        s.accumulated_delta_range_m = adr_m;
        s
    }

    /// Copies and returns [Measurement] with carrier frequency
    pub fn with_carrier_frequency(&self, freq_hz: f64) -> Self {
        let mut s = *self;
        s.carrier_frequency_hz = Some(freq_hz);
        s
    }

    /// Copies and returns [Measurement] with received satellite time
    pub fn with_received_sv_time(&self, nanos: i64) -> Self {
        let mut s = *self;
        s.received_sv_time_nanos = nanos;
        s
    }
}

/// Immutable set of measurements, captured at a single provider callback.
/// Cloning is a reference copy.
#[derive(Debug, Clone, Default)]
pub struct MeasurementSnapshot {
    /// Capture [Epoch]
    pub epoch: Epoch,

    measurements: Arc<Vec<Measurement>>,
}

impl MeasurementSnapshot {
    pub fn new(epoch: Epoch, measurements: Vec<Measurement>) -> Self {
        Self {
            epoch,
            measurements: Arc::new(measurements),
        }
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Measurement> {
        self.measurements.iter()
    }

    pub fn measurements(&self) -> &[Measurement] {
        &self.measurements
    }

    /// Number of distinct satellites in this snapshot
    pub fn satellites(&self) -> usize {
        self.measurements.iter().map(|m| m.sv).unique().count()
    }

    /// True if both handles refer to the same capture
    pub fn ptr_eq(&self, rhs: &Self) -> bool {
        Arc::ptr_eq(&self.measurements, &rhs.measurements)
    }
}

/// Publishing side of the latest [MeasurementSnapshot].
/// Each publication replaces the previous snapshot as a whole.
#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    tx: Arc<watch::Sender<MeasurementSnapshot>>,
}

impl Default for SnapshotPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotPublisher {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(MeasurementSnapshot::default());
        Self { tx: Arc::new(tx) }
    }

    /// Publishes a new set of measurements, replacing the current snapshot.
    pub fn publish(&self, epoch: Epoch, measurements: Vec<Measurement>) {
        self.publish_snapshot(MeasurementSnapshot::new(epoch, measurements));
    }

    pub fn publish_snapshot(&self, snapshot: MeasurementSnapshot) {
        self.tx.send_replace(snapshot);
    }

    /// Returns the latest [MeasurementSnapshot]
    pub fn latest(&self) -> MeasurementSnapshot {
        self.tx.borrow().clone()
    }

    /// Obtain a new read handle
    pub fn subscribe(&self) -> watch::Receiver<MeasurementSnapshot> {
        self.tx.subscribe()
    }
}
