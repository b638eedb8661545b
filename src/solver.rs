//! Positioning engine contract. The engine itself is external:
//! it consumes corrections paired with measurements, and reports
//! positions and solution status asynchronously through a [Reporter].
use hifitime::prelude::Epoch;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::{
    client::CorrectionChunk, error::Error, position::SolutionStatus,
    snapshot::MeasurementSnapshot,
};

/// [Solver] consumes correction chunks, one at a time.
pub trait Solver: Send + 'static {
    /// Applies one [CorrectionChunk], paired with the latest
    /// [MeasurementSnapshot] at the pairing [Epoch].
    fn apply_correction(
        &mut self,
        chunk: &CorrectionChunk,
        snapshot: &MeasurementSnapshot,
        epoch: Epoch,
    ) -> Result<(), Error>;
}

impl<F> Solver for F
where
    F: FnMut(&CorrectionChunk, &MeasurementSnapshot, Epoch) -> Result<(), Error> + Send + 'static,
{
    fn apply_correction(
        &mut self,
        chunk: &CorrectionChunk,
        snapshot: &MeasurementSnapshot,
        epoch: Epoch,
    ) -> Result<(), Error> {
        (self)(chunk, snapshot, epoch)
    }
}

/// Solver reports
#[derive(Debug, Clone, PartialEq)]
pub enum SolverReport {
    /// New position (decimal degrees, decimal degrees, meters)
    Position {
        latitude_ddeg: f64,
        longitude_ddeg: f64,
        altitude_m: f64,
    },

    /// New [SolutionStatus]
    Status(SolutionStatus),

    /// One correction chunk could not be applied
    Error(String),
}

/// [Reporter] is handed to the solver. Reports never block and
/// may be issued from any thread.
#[derive(Debug, Clone)]
pub struct Reporter {
    tx: UnboundedSender<SolverReport>,
}

impl Reporter {
    pub fn channel() -> (Self, UnboundedReceiver<SolverReport>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn report(&self, report: SolverReport) {
        // receiver is gone once the session is dropped
        let _ = self.tx.send(report);
    }

    pub fn position(&self, latitude_ddeg: f64, longitude_ddeg: f64, altitude_m: f64) {
        self.report(SolverReport::Position {
            latitude_ddeg,
            longitude_ddeg,
            altitude_m,
        });
    }

    pub fn status(&self, status: SolutionStatus) {
        self.report(SolverReport::Status(status));
    }

    pub fn error(&self, e: &Error) {
        self.report(SolverReport::Error(e.to_string()));
    }
}
