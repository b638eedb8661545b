//! Pairs each correction chunk with the latest measurement snapshot
//! and forwards both to the solver, one pairing at a time.
use hifitime::prelude::Epoch;
use log::{error, trace};
use tokio::sync::{
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    watch,
};

use crate::{
    client::CorrectionChunk,
    error::Error,
    snapshot::MeasurementSnapshot,
    solver::{Reporter, Solver},
    utils::{now_utc, timestamp},
};

/// One correction chunk and its measurement context
#[derive(Debug, Clone)]
pub struct Pairing {
    pub chunk: CorrectionChunk,
    pub snapshot: MeasurementSnapshot,
    pub epoch: Epoch,
}

/// [Synchronizer] runs on the network side. It never waits on the solver.
pub struct Synchronizer {
    snapshots: watch::Receiver<MeasurementSnapshot>,
    tx: UnboundedSender<Pairing>,
}

impl Synchronizer {
    /// Builds a new [Synchronizer] and the queue feeding the [Worker].
    pub fn new(
        snapshots: watch::Receiver<MeasurementSnapshot>,
    ) -> (Self, UnboundedReceiver<Pairing>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { snapshots, tx }, rx)
    }

    /// Captures the current snapshot and time, and queues the pairing.
    /// Pairings are never dropped, and keep arrival order.
    pub fn on_chunk(&self, chunk: CorrectionChunk) -> Result<(), Error> {
        let snapshot = self.snapshots.borrow().clone();
        let epoch = now_utc();

        trace!(
            "{} - pairing {} bytes with {} measurements",
            timestamp(),
            chunk.len(),
            snapshot.len()
        );

        self.tx
            .send(Pairing {
                chunk,
                snapshot,
                epoch,
            })
            .map_err(|_| Error::WorkerStopped)
    }
}

/// [Worker] invokes the [Solver] serially. It runs on a blocking thread.
pub struct Worker<S: Solver> {
    solver: S,
    rx: UnboundedReceiver<Pairing>,
    reporter: Reporter,
}

impl<S: Solver> Worker<S> {
    pub fn new(solver: S, rx: UnboundedReceiver<Pairing>, reporter: Reporter) -> Self {
        Self {
            solver,
            rx,
            reporter,
        }
    }

    /// Consumes all pairings until the [Synchronizer] is dropped,
    /// then returns the [Solver]. Solver errors are reported and
    /// do not interrupt the stream.
    pub fn run(mut self) -> S {
        while let Some(pairing) = self.rx.blocking_recv() {
            if let Err(e) =
                self.solver
                    .apply_correction(&pairing.chunk, &pairing.snapshot, pairing.epoch)
            {
                error!("{} - solver error: {}", timestamp(), e);
                self.reporter.error(&e);
            }
        }

        self.solver
    }
}
