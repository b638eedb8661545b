//! Periodic position report (GGA) to the caster
use std::sync::Arc;

use hifitime::prelude::Duration;
use log::{debug, info};

use tokio::{
    sync::{mpsc::UnboundedSender, watch},
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};

use crate::{
    client::StreamingClient,
    error::Error,
    event::{Event, UplinkEvent},
    gga::UplinkSentence,
    position::{LocationProvider, PositionEstimate},
    snapshot::MeasurementSnapshot,
    utils::{now_utc, timestamp, to_std_duration},
};

/// One uplink tick: best position, encoding and submission.
#[derive(Clone)]
pub struct Uplink {
    client: StreamingClient,
    estimate: watch::Receiver<Option<PositionEstimate>>,
    snapshots: watch::Receiver<MeasurementSnapshot>,
    fallback: Arc<dyn LocationProvider>,
    events: UnboundedSender<Event>,
}

impl Uplink {
    pub fn new(
        client: StreamingClient,
        estimate: watch::Receiver<Option<PositionEstimate>>,
        snapshots: watch::Receiver<MeasurementSnapshot>,
        fallback: Arc<dyn LocationProvider>,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            client,
            estimate,
            snapshots,
            fallback,
            events,
        }
    }

    fn emit(&self, event: UplinkEvent) {
        let _ = self.events.send(Event::Uplink(event));
    }

    /// Latest solver position, otherwise the last known location.
    pub fn best_position(&self) -> Option<PositionEstimate> {
        let solved = *self.estimate.borrow();
        solved.or_else(|| self.fallback.last_known_location())
    }

    /// Encodes and submits one sentence. Failing to hand the sentence
    /// to the client is reported but not an error: the tick is done.
    pub fn tick(&self) -> Result<UplinkSentence, Error> {
        let Some(position) = self.best_position() else {
            debug!("{} - uplink: no position available", timestamp());
            self.emit(UplinkEvent::NoPosition);
            return Err(Error::NoPositionAvailable);
        };

        let satellites = self.snapshots.borrow().satellites();
        let sentence = UplinkSentence::new(&position, satellites, now_utc());
        let text = sentence.to_string();

        match self.client.send(&text) {
            Ok(()) => {
                debug!("{} - uplink: {}", timestamp(), text);
                self.emit(UplinkEvent::Queued(text));
            },
            Err(e) => {
                debug!("{} - uplink discarded: {}", timestamp(), e);
                self.emit(UplinkEvent::NotSent {
                    sentence: text,
                    reason: e.to_string(),
                });
            },
        }

        Ok(sentence)
    }
}

/// Fires one [Uplink::tick] per period.
pub struct UplinkScheduler {
    period: Duration,
    uplink: Uplink,
    task: Option<JoinHandle<()>>,
}

impl UplinkScheduler {
    pub fn new(period: Duration, uplink: Uplink) -> Self {
        Self {
            period,
            uplink,
            task: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Starts ticking, first tick is immediate. Has no effect if already running.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        info!("{} - uplink every {}", timestamp(), self.period);

        let period = to_std_duration(self.period);
        let uplink = self.uplink.clone();

        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let _ = uplink.tick();
            }
        }));
    }

    /// Cancels the pending timer. A sentence already queued
    /// is still written by the client.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("{} - uplink stopped", timestamp());
        }
    }
}

impl Drop for UplinkScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
