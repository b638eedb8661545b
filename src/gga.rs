//! GGA position reports, uplinked to the caster so it may select
//! the closest reference station.
use std::str::FromStr;

use hifitime::prelude::Epoch;

use crate::{error::Error, position::PositionEstimate};

/// Sentence identifier
const TALKER: &str = "GPGGA";

/// Fix indicator, always reported as valid
const FIX_INDICATOR: u8 = 1;

/// Minutes of arc, expressed in 1E-4 units
const ARC_MINUTE_UNITS: u64 = 10_000;

/// UTC time of day, with millisecond resolution
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub milliseconds: u16,
}

impl TimeOfDay {
    /// Time of day of this [Epoch], in UTC. Sub-millisecond is truncated.
    pub fn from_epoch(epoch: Epoch) -> Self {
        let (_, _, _, hours, minutes, seconds, nanos) = epoch.to_gregorian_utc();
        Self {
            hours,
            minutes,
            seconds,
            milliseconds: (nanos / 1_000_000) as u16,
        }
    }
}

impl std::fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02}{:02}{:02}.{:03}",
            self.hours, self.minutes, self.seconds, self.milliseconds
        )
    }
}

impl FromStr for TimeOfDay {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidSentence(format!("invalid time of day \"{}\"", s));

        let (hms, frac) = s.split_once('.').unwrap_or((s, ""));

        if hms.len() != 6 || !hms.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        if !frac.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let hours = hms[0..2].parse::<u8>().map_err(|_| invalid())?;
        let minutes = hms[2..4].parse::<u8>().map_err(|_| invalid())?;
        let seconds = hms[4..6].parse::<u8>().map_err(|_| invalid())?;

        // milliseconds: first three fractional digits
        let milliseconds = frac
            .chars()
            .chain(std::iter::repeat('0'))
            .take(3)
            .collect::<String>()
            .parse::<u16>()
            .map_err(|_| invalid())?;

        if hours > 23 || minutes > 59 || seconds > 60 {
            return Err(invalid());
        }

        Ok(Self {
            hours,
            minutes,
            seconds,
            milliseconds,
        })
    }
}

/// Formats an angle as (d)ddmm.mmmm and its hemisphere letter, with `width`
/// integer digits of degrees. An angle that rounds to zero is positive.
fn format_angle(ddeg: f64, width: usize, positive: char, negative: char) -> String {
    let abs = ddeg.abs();
    let mut degrees = abs.trunc() as u64;
    let mut minutes = ((abs - abs.trunc()) * 60.0 * ARC_MINUTE_UNITS as f64).round() as u64;

    // rounding may produce a full 60'
    if minutes >= 60 * ARC_MINUTE_UNITS {
        degrees += 1;
        minutes -= 60 * ARC_MINUTE_UNITS;
    }

    let hemisphere = if ddeg < 0.0 && (degrees > 0 || minutes > 0) {
        negative
    } else {
        positive
    };

    format!(
        "{:0width$}{:02}.{:04},{}",
        degrees,
        minutes / ARC_MINUTE_UNITS,
        minutes % ARC_MINUTE_UNITS,
        hemisphere,
        width = width,
    )
}

/// Parses a (d)ddmm.mmmm angle and its hemisphere letter into decimal degrees.
fn parse_angle(value: &str, hemisphere: &str, positive: char, negative: char) -> Result<f64, Error> {
    let ddmm = value
        .parse::<f64>()
        .map_err(|_| Error::InvalidSentence(format!("invalid angle \"{}\"", value)))?;

    let degrees = (ddmm / 100.0).trunc();
    let minutes = ddmm - degrees * 100.0;
    let ddeg = degrees + minutes / 60.0;

    match hemisphere.chars().next() {
        Some(c) if c == positive => Ok(ddeg),
        Some(c) if c == negative => Ok(-ddeg),
        _ => Err(Error::InvalidSentence(format!(
            "invalid hemisphere \"{}\"",
            hemisphere
        ))),
    }
}

/// XOR of all bytes of the sentence body (between `$` and `*`)
pub fn checksum(body: &str) -> u8 {
    body.bytes().fold(0, |acc, b| acc ^ b)
}

/// GGA sentence (position report). [UplinkSentence] renders without
/// line terminator.
#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct UplinkSentence {
    /// UTC [TimeOfDay]
    pub time: TimeOfDay,

    /// Latitude (decimal degrees)
    pub latitude_ddeg: f64,

    /// Longitude (decimal degrees)
    pub longitude_ddeg: f64,

    /// Number of satellites in use (0-99)
    pub satellites: u8,

    /// Horizontal accuracy (m)
    pub horizontal_accuracy_m: f64,

    /// Altitude (m)
    pub altitude_m: f64,
}

impl UplinkSentence {
    /// Builds a new [UplinkSentence] from a [PositionEstimate],
    /// the number of satellites in sight and the report [Epoch].
    pub fn new(position: &PositionEstimate, satellites: usize, epoch: Epoch) -> Self {
        Self {
            time: TimeOfDay::from_epoch(epoch),
            latitude_ddeg: position.latitude_ddeg,
            longitude_ddeg: position.longitude_ddeg,
            satellites: satellites.min(99) as u8,
            horizontal_accuracy_m: position.horizontal_accuracy_m,
            altitude_m: position.altitude_m,
        }
    }

    /// Sentence body, between `$` and `*`
    fn body(&self) -> String {
        format!(
            "{},{},{},{},{},{:02},{:.1},{:.1},M,,M,,",
            TALKER,
            self.time,
            format_angle(self.latitude_ddeg, 2, 'N', 'S'),
            format_angle(self.longitude_ddeg, 3, 'E', 'W'),
            FIX_INDICATOR,
            self.satellites,
            self.horizontal_accuracy_m,
            self.altitude_m,
        )
    }

    pub fn checksum(&self) -> u8 {
        checksum(&self.body())
    }
}

impl std::fmt::Display for UplinkSentence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let body = self.body();
        write!(f, "${}*{:02X}", body, checksum(&body))
    }
}

impl FromStr for UplinkSentence {
    type Err = Error;

    /// Parses a GGA sentence, verifying its checksum.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim_end();

        let content = s
            .strip_prefix('$')
            .ok_or_else(|| Error::InvalidSentence("missing $ marker".to_string()))?;

        let (body, cs) = content
            .split_once('*')
            .ok_or_else(|| Error::InvalidSentence("missing checksum".to_string()))?;

        let cs = u8::from_str_radix(cs, 16)
            .map_err(|_| Error::InvalidSentence(format!("invalid checksum \"{}\"", cs)))?;

        if cs != checksum(body) {
            return Err(Error::InvalidSentence(format!(
                "checksum mismatch: {:02X} != {:02X}",
                cs,
                checksum(body)
            )));
        }

        let fields = body.split(',').collect::<Vec<_>>();

        if fields.len() < 10 || !fields[0].ends_with("GGA") {
            return Err(Error::InvalidSentence("not a GGA sentence".to_string()));
        }

        let number = |index: usize| -> Result<f64, Error> {
            fields[index].parse::<f64>().map_err(|_| {
                Error::InvalidSentence(format!("invalid field #{}: \"{}\"", index, fields[index]))
            })
        };

        Ok(Self {
            time: TimeOfDay::from_str(fields[1])?,
            latitude_ddeg: parse_angle(fields[2], fields[3], 'N', 'S')?,
            longitude_ddeg: parse_angle(fields[4], fields[5], 'E', 'W')?,
            satellites: fields[7].parse::<u8>().map_err(|_| {
                Error::InvalidSentence(format!("invalid satellites count \"{}\"", fields[7]))
            })?,
            horizontal_accuracy_m: number(8)?,
            altitude_m: number(9)?,
        })
    }
}
