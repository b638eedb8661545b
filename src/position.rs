use std::str::FromStr;

use hifitime::prelude::Epoch;

/// Horizontal accuracy (m) attributed to solver positions,
/// which do not report one.
pub const SOLVER_HORIZONTAL_ACCURACY_M: f64 = 1.0;

/// Solver solution quality
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SolutionStatus {
    /// Integer ambiguities resolved
    Fixed,

    /// Float ambiguities
    Float,

    /// Standalone solution
    Single,

    #[default]
    None,
}

impl std::fmt::Display for SolutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "FIXED"),
            Self::Float => write!(f, "FLOAT"),
            Self::Single => write!(f, "SINGLE"),
            Self::None => write!(f, "NO SOLUTION"),
        }
    }
}

impl FromStr for SolutionStatus {
    type Err = std::convert::Infallible;

    /// Any unknown status is interpreted as [SolutionStatus::None]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "FIXED" | "FIX" => Ok(Self::Fixed),
            "FLOAT" => Ok(Self::Float),
            "SINGLE" => Ok(Self::Single),
            _ => Ok(Self::None),
        }
    }
}

/// Where a [PositionEstimate] comes from
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum PositionSource {
    /// Reported by the solver
    #[default]
    Solver,

    /// Coarse platform (last known) location
    LastKnown,
}

#[derive(Debug, Default, Copy, Clone, PartialEq)]
pub struct PositionEstimate {
    /// Latitude (decimal degrees)
    pub latitude_ddeg: f64,

    /// Longitude (decimal degrees)
    pub longitude_ddeg: f64,

    /// Altitude (m)
    pub altitude_m: f64,

    /// Horizontal accuracy (m)
    pub horizontal_accuracy_m: f64,

    /// Fix quality
    pub status: SolutionStatus,

    /// [PositionSource]
    pub source: PositionSource,

    /// [Epoch] of this estimate
    pub epoch: Epoch,
}

impl std::fmt::Display for PositionEstimate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "lat={:.8}° lon={:.8}° alt={:.3}m ({})",
            self.latitude_ddeg, self.longitude_ddeg, self.altitude_m, self.status
        )
    }
}

impl PositionEstimate {
    /// Builds a new [PositionEstimate] reported by the solver
    pub fn from_solver(
        epoch: Epoch,
        latitude_ddeg: f64,
        longitude_ddeg: f64,
        altitude_m: f64,
        status: SolutionStatus,
    ) -> Self {
        Self {
            epoch,
            latitude_ddeg,
            longitude_ddeg,
            altitude_m,
            status,
            horizontal_accuracy_m: SOLVER_HORIZONTAL_ACCURACY_M,
            source: PositionSource::Solver,
        }
    }

    /// Builds a new coarse [PositionEstimate], used as last known location.
    pub fn last_known(
        epoch: Epoch,
        latitude_ddeg: f64,
        longitude_ddeg: f64,
        altitude_m: f64,
        horizontal_accuracy_m: f64,
    ) -> Self {
        Self {
            epoch,
            latitude_ddeg,
            longitude_ddeg,
            altitude_m,
            horizontal_accuracy_m,
            status: SolutionStatus::None,
            source: PositionSource::LastKnown,
        }
    }
}

/// Platform location service: provides the coarse last known location,
/// used when the solver has not reported any position yet.
pub trait LocationProvider: Send + Sync {
    fn last_known_location(&self) -> Option<PositionEstimate>;
}

/// A fixed location (or none at all)
impl LocationProvider for Option<PositionEstimate> {
    fn last_known_location(&self) -> Option<PositionEstimate> {
        *self
    }
}
