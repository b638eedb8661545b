/*
 * NTRIP2RTK is part of the nav-solutions framework.
 * Authors: Guillaume W. Bres <guillaume.bressaix@gmail.com> et al,
 * (cf. https://github.com/nav-solutions/ntrip2rtk/graphs/contributors)
 * This framework is shipped under Mozilla Public V2 license.
 *
 * Documentation: https://github.com/nav-solutions/ntrip2rtk
 */

use std::{
    fs::File,
    io::{BufWriter, Write},
};

use env_logger::{Builder, Target};

use log::{debug, error, info, trace, warn};

use tokio::{signal, sync::mpsc, time::sleep};

use ntrip2rtk::{
    prelude::{
        ConnectionState, CorrectionChunk, Duration, Epoch, Error, Event, MeasurementSnapshot, Session,
        Solver, UplinkEvent,
    },
    utils::{now_utc, timestamp, to_std_duration},
};

mod cli;

use crate::cli::Cli;

/// Records the correction stream, as is
struct Recorder {
    fd: Option<BufWriter<File>>,
    chunks: u64,
}

impl Recorder {
    fn new(path: Option<&String>) -> Self {
        let fd = path.map(|path| {
            let fd = File::create(path).unwrap_or_else(|e| panic!("failed to create {}: {}", path, e));
            info!("{} - recording corrections into {}", timestamp(), path);
            BufWriter::new(fd)
        });

        Self { fd, chunks: 0 }
    }

    fn close(self) {
        if let Some(mut fd) = self.fd {
            if let Err(e) = fd.flush() {
                error!("{} - failed to flush corrections: {}", timestamp(), e);
            }
        }
    }
}

impl Solver for Recorder {
    fn apply_correction(
        &mut self,
        chunk: &CorrectionChunk,
        snapshot: &MeasurementSnapshot,
        epoch: Epoch,
    ) -> Result<(), Error> {
        self.chunks += 1;

        trace!(
            "{} - correction #{}: {} bytes ({} measurements)",
            epoch.round(Duration::from_seconds(1.0)),
            self.chunks,
            chunk.len(),
            snapshot.len(),
        );

        if let Some(fd) = &mut self.fd {
            fd.write_all(&chunk.bytes)
                .map_err(|e| Error::Solver(format!("correction recording: {}", e)))?;
        }

        Ok(())
    }
}

#[tokio::main]
pub async fn main() {
    let mut builder = Builder::from_default_env();

    builder
        .target(Target::Stdout)
        .format_timestamp_secs()
        .format_module_path(false)
        .init();

    // cli
    let cli = Cli::new();
    let cfg = cli.session_config();

    let location = cli.last_known_location(now_utc());

    if location.is_none() {
        warn!(
            "{} - no approximate location: position reports start once the solver converges",
            timestamp()
        );
    }

    let retry_delay = cli.retry_delay();

    let recorder = Recorder::new(cli.output());

    let (observer, mut events) = mpsc::unbounded_channel();

    let mut session = Session::new(cfg, recorder, location, observer)
        .unwrap_or_else(|e| panic!("invalid session: {}", e));

    info!("{} - application deployed", timestamp());

    // failures are reported as events
    if let Err(e) = session.start().await {
        debug!("{} - start: {}", timestamp(), e);
    }

    loop {
        let event = tokio::select! {
            _ = signal::ctrl_c() => {
                info!("{} - interrupted", timestamp());
                break;
            },
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match &event {
            Event::Connection {
                state: ConnectionState::Failed,
                ..
            }
            | Event::Connection {
                state: ConnectionState::Disconnected,
                detail: Some(_),
            } => {
                error!("{} - {}", timestamp(), event);

                let Some(delay) = retry_delay else {
                    break;
                };

                info!("{} - new attempt in {}", timestamp(), delay);

                tokio::select! {
                    _ = signal::ctrl_c() => {
                        info!("{} - interrupted", timestamp());
                        break;
                    },
                    _ = sleep(to_std_duration(delay)) => {},
                }

                if let Err(e) = session.reconnect().await {
                    debug!("{} - reconnection: {}", timestamp(), e);
                }
            },
            Event::Connection { .. } => info!("{} - {}", timestamp(), event),
            Event::Position(_) | Event::Status(_) => {
                if !cli.quiet() {
                    info!("{} - {}", timestamp(), event);
                }
            },
            Event::SolverError(_) => error!("{} - {}", timestamp(), event),
            Event::Uplink(UplinkEvent::NoPosition) | Event::Uplink(UplinkEvent::NotSent { .. }) => {
                warn!("{} - {}", timestamp(), event)
            },
            Event::Uplink(_) => debug!("{} - {}", timestamp(), event),
        }
    }

    session.stop().await;

    if let Some(recorder) = session.into_solver().await {
        info!("{} - {} corrections processed", timestamp(), recorder.chunks);
        recorder.close();
    }
}
