#![doc = include_str!("../README.md")]

pub mod client;
pub mod config;
pub mod error;
pub mod event;
pub mod gga;
pub mod position;
pub mod runtime;
pub mod session;
pub mod snapshot;
pub mod solver;
pub mod synchronizer;
pub mod uplink;
pub mod utils;

#[cfg(test)]
mod tests;

// prelude
pub mod prelude {
    pub use crate::client::{ConnectionEvent, ConnectionState, CorrectionChunk, StreamingClient};
    pub use crate::config::SessionConfig;
    pub use crate::error::Error;
    pub use crate::event::{Event, UplinkEvent};
    pub use crate::gga::UplinkSentence;
    pub use crate::position::{LocationProvider, PositionEstimate, PositionSource, SolutionStatus};
    pub use crate::runtime::Runtime;
    pub use crate::session::Session;
    pub use crate::snapshot::{Measurement, MeasurementSnapshot, SnapshotPublisher};
    pub use crate::solver::{Reporter, Solver, SolverReport};
    // re-export
    pub use gnss_rs::prelude::{Constellation, SV};
    pub use hifitime::prelude::{Duration, Epoch, TimeScale};
}
