use gnss_rs::prelude::Constellation;
use hifitime::prelude::{Duration, Epoch, TimeScale};
use log::error;

/// Current [Epoch] expressed in [TimeScale::UTC].
/// System time prior to 1970 is reported and replaced by the reference epoch.
pub fn now_utc() -> Epoch {
    match Epoch::now() {
        Ok(t) => t.to_time_scale(TimeScale::UTC),
        Err(e) => {
            error!("failed to determine system time: {}", e);
            Epoch::default()
        },
    }
}

/// Current UTC [Epoch] rounded to the second, used in logs.
pub fn timestamp() -> Epoch {
    now_utc().round(Duration::from_seconds(1.0))
}

/// Converts [Duration] to [std::time::Duration]. Negative durations saturate to zero.
pub fn to_std_duration(dt: Duration) -> std::time::Duration {
    let nanos = dt.total_nanoseconds().clamp(0, u64::MAX as i128);
    std::time::Duration::from_nanos(nanos as u64)
}

/// Converts a platform (Android location provider) constellation code
/// to [Constellation].
pub fn to_constellation(id: u8) -> Option<Constellation> {
    match id {
        1 => Some(Constellation::GPS),
        2 => Some(Constellation::SBAS),
        3 => Some(Constellation::Glonass),
        4 => Some(Constellation::QZSS),
        5 => Some(Constellation::BeiDou),
        6 => Some(Constellation::Galileo),
        7 => Some(Constellation::IRNSS),
        _ => None,
    }
}
