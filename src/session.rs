//! Session controller: wires client, synchronizer, solver worker and
//! uplink together and relays everything to the observer.
use std::sync::Arc;

use log::{error, info, warn};

use tokio::{
    sync::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        watch,
    },
    task::JoinHandle,
};

use crate::{
    client::{ConnectionEvent, ConnectionState, StreamingClient},
    config::SessionConfig,
    error::Error,
    event::{Event, UplinkEvent},
    position::{LocationProvider, PositionEstimate, SolutionStatus},
    runtime::Runtime,
    snapshot::SnapshotPublisher,
    solver::{Reporter, Solver, SolverReport},
    synchronizer::{Synchronizer, Worker},
    uplink::{Uplink, UplinkScheduler},
    utils::{now_utc, timestamp},
};

/// Tasks of a started [Session]
struct Running<S: Solver> {
    /// Connection events, shared with every connection attempt
    events: UnboundedSender<ConnectionEvent>,
    relay: JoinHandle<()>,
    worker: JoinHandle<S>,
    reports: JoinHandle<UnboundedReceiver<SolverReport>>,
    reports_shutdown: watch::Sender<bool>,
}

/// One correction streaming session.
pub struct Session<S: Solver> {
    client: StreamingClient,
    publisher: SnapshotPublisher,
    estimate: Arc<watch::Sender<Option<PositionEstimate>>>,
    statistics: watch::Sender<Runtime>,
    scheduler: UplinkScheduler,
    observer: UnboundedSender<Event>,
    reporter: Reporter,
    reports: Option<UnboundedReceiver<SolverReport>>,
    solver: Option<S>,
    running: Option<Running<S>>,
}

impl<S: Solver> Session<S> {
    /// Builds a new [Session]. Nothing happens until [Self::start].
    /// `location` provides the last known location, used for uplink
    /// until the solver reports a position.
    pub fn new<L: LocationProvider + 'static>(
        config: SessionConfig,
        solver: S,
        location: L,
        observer: UnboundedSender<Event>,
    ) -> Result<Self, Error> {
        config.validate()?;

        let period = config.uplink_period;
        let client = StreamingClient::new(config);
        let publisher = SnapshotPublisher::new();

        let (estimate, estimate_rx) = watch::channel(None);
        let (statistics, _) = watch::channel(Runtime::new(now_utc()));
        let (reporter, reports) = Reporter::channel();

        let uplink = Uplink::new(
            client.clone(),
            estimate_rx,
            publisher.subscribe(),
            Arc::new(location),
            observer.clone(),
        );

        Ok(Self {
            client,
            publisher,
            statistics,
            observer,
            reporter,
            estimate: Arc::new(estimate),
            scheduler: UplinkScheduler::new(period, uplink),
            reports: Some(reports),
            solver: Some(solver),
            running: None,
        })
    }

    /// [Reporter] to hand over to the solver
    pub fn reporter(&self) -> Reporter {
        self.reporter.clone()
    }

    /// [SnapshotPublisher] to hand over to the measurement provider
    pub fn measurements(&self) -> SnapshotPublisher {
        self.publisher.clone()
    }

    /// Current [ConnectionState]
    pub fn state(&self) -> ConnectionState {
        self.client.state()
    }

    /// Latest position estimate reported by the solver
    pub fn position(&self) -> Option<PositionEstimate> {
        *self.estimate.borrow()
    }

    /// Streaming statistics
    pub fn statistics(&self) -> Runtime {
        *self.statistics.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts all tasks and connects. Has no effect once started.
    /// A connection failure is reported to the observer and returned,
    /// the session remains started: see [Self::reconnect].
    pub async fn start(&mut self) -> Result<(), Error> {
        if self.running.is_some() {
            return Ok(());
        }

        let (Some(solver), Some(reports)) = (self.solver.take(), self.reports.take()) else {
            return Err(Error::WorkerStopped);
        };

        info!("{} - starting session", timestamp());

        let (synchronizer, pairings) = Synchronizer::new(self.publisher.subscribe());

        let worker = Worker::new(solver, pairings, self.reporter.clone());
        let worker = tokio::task::spawn_blocking(move || worker.run());

        let (events, events_rx) = mpsc::unbounded_channel();

        self.statistics.send_replace(Runtime::new(now_utc()));

        let relay = tokio::spawn(connection_relay(
            events_rx,
            synchronizer,
            self.statistics.clone(),
            self.observer.clone(),
        ));

        let (reports_shutdown, shutdown_rx) = watch::channel(false);

        let reports = tokio::spawn(reports_relay(
            reports,
            shutdown_rx,
            self.estimate.clone(),
            self.observer.clone(),
        ));

        self.running = Some(Running {
            events: events.clone(),
            relay,
            worker,
            reports,
            reports_shutdown,
        });

        self.scheduler.start();
        self.client.connect(events).await
    }

    /// New connection attempt, after a failure or a disconnection.
    /// Starts the session if needed.
    pub async fn reconnect(&mut self) -> Result<(), Error> {
        let Some(running) = &self.running else {
            return self.start().await;
        };

        info!("{} - reconnecting", timestamp());
        self.client.connect(running.events.clone()).await
    }

    /// Stops uplink, closes the connection, then waits for pending
    /// corrections to be processed. Returns once all tasks have exited.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        self.scheduler.stop();
        self.client.disconnect().await;

        let Running {
            events,
            relay,
            worker,
            reports,
            reports_shutdown,
        } = running;

        drop(events);

        if let Err(e) = relay.await {
            error!("{} - connection relay: {}", timestamp(), e);
        }

        match worker.await {
            Ok(solver) => self.solver = Some(solver),
            Err(e) => error!("{} - solver worker: {}", timestamp(), e),
        }

        reports_shutdown.send_replace(true);

        match reports.await {
            Ok(rx) => self.reports = Some(rx),
            Err(e) => error!("{} - solver reports: {}", timestamp(), e),
        }

        info!("{} - session stopped ({})", timestamp(), self.statistics());
    }

    /// Stops the session and returns the [Solver], unless the solver panicked.
    pub async fn into_solver(mut self) -> Option<S> {
        self.stop().await;
        self.solver.take()
    }
}

/// Forwards correction chunks to the [Synchronizer] and
/// connection events to the observer, in order.
async fn connection_relay(
    mut events: UnboundedReceiver<ConnectionEvent>,
    synchronizer: Synchronizer,
    statistics: watch::Sender<Runtime>,
    observer: UnboundedSender<Event>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ConnectionEvent::Correction(chunk) => {
                let (epoch, size) = (chunk.epoch, chunk.len());

                if let Err(e) = synchronizer.on_chunk(chunk) {
                    error!("{} - correction dropped: {}", timestamp(), e);
                }

                statistics.send_modify(|runtime| runtime.new_correction(epoch, size));
            },
            ConnectionEvent::StateChanged { state, detail } => {
                if state != ConnectionState::Streaming && state != ConnectionState::Connecting {
                    info!("{} - {}", timestamp(), *statistics.borrow());
                }

                let _ = observer.send(Event::Connection { state, detail });
            },
            ConnectionEvent::UplinkSent(sentence) => {
                let _ = observer.send(Event::Uplink(UplinkEvent::Sent(sentence)));
            },
        }
    }
}

/// Forwards solver reports to the observer and latches solver positions.
/// Pending reports are forwarded on shutdown, then the receiver is handed back.
async fn reports_relay(
    mut reports: UnboundedReceiver<SolverReport>,
    mut shutdown: watch::Receiver<bool>,
    estimate: Arc<watch::Sender<Option<PositionEstimate>>>,
    observer: UnboundedSender<Event>,
) -> UnboundedReceiver<SolverReport> {
    let mut status = SolutionStatus::default();

    loop {
        let report = tokio::select! {
            report = reports.recv() => report,
            _ = shutdown.changed() => break,
        };

        match report {
            Some(report) => forward_report(report, &mut status, &estimate, &observer),
            None => return reports,
        }
    }

    while let Ok(report) = reports.try_recv() {
        forward_report(report, &mut status, &estimate, &observer);
    }

    reports
}

fn forward_report(
    report: SolverReport,
    status: &mut SolutionStatus,
    estimate: &watch::Sender<Option<PositionEstimate>>,
    observer: &UnboundedSender<Event>,
) {
    let event = match report {
        SolverReport::Position {
            latitude_ddeg,
            longitude_ddeg,
            altitude_m,
        } => {
            let position = PositionEstimate::from_solver(
                now_utc(),
                latitude_ddeg,
                longitude_ddeg,
                altitude_m,
                *status,
            );

            estimate.send_replace(Some(position));
            Event::Position(position)
        },
        SolverReport::Status(new) => {
            if new != *status {
                info!("{} - solution: {}", timestamp(), new);
            }

            *status = new;

            estimate.send_modify(|position| {
                if let Some(position) = position {
                    position.status = new;
                }
            });

            Event::Status(new)
        },
        SolverReport::Error(e) => {
            warn!("{} - solver: {}", timestamp(), e);
            Event::SolverError(e)
        },
    };

    let _ = observer.send(event);
}
