//! NTRIP streaming client: one TCP connection to a caster,
//! inbound correction bytes and outbound uplink lines.
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, error, info, trace, warn};

use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::{
        mpsc::{self, UnboundedSender, error::TrySendError},
        watch,
    },
    task::JoinHandle,
    time::timeout,
};

mod handshake;
mod state;

pub use handshake::{Request, is_success};
pub use state::{ConnectionEvent, ConnectionState, CorrectionChunk};

use crate::{
    config::SessionConfig,
    error::Error,
    utils::{now_utc, timestamp, to_std_duration},
};

/// Socket read size
const READ_BUFFER_SIZE: usize = 4096;

/// Maximal number of pending uplink lines
const UPLINK_QUEUE_SIZE: usize = 16;

/// Handles of one connection attempt
struct Link {
    events: UnboundedSender<ConnectionEvent>,
    shutdown: Arc<watch::Sender<bool>>,
    uplink: Option<mpsc::Sender<String>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Link {
    /// Stops both I/O tasks and waits for them, releasing the socket.
    async fn close(self) {
        let Self {
            shutdown,
            uplink,
            tasks,
            ..
        } = self;

        shutdown.send_replace(true);
        drop(uplink);

        for task in tasks {
            if let Err(e) = task.await {
                error!("{} - i/o task error: {}", timestamp(), e);
            }
        }
    }
}

struct Inner {
    config: SessionConfig,
    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<Link>>,
}

impl Inner {
    /// Link and state are only modified together, under this guard.
    fn link(&self) -> MutexGuard<'_, Option<Link>> {
        self.link.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Moves to `next` if current state is `expected`
    fn transition(&self, expected: ConnectionState, next: ConnectionState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == expected {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

/// Shared by the read and write tasks of one connection
#[derive(Clone)]
struct Context {
    inner: Arc<Inner>,
    events: UnboundedSender<ConnectionEvent>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Context {
    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    /// Streaming → Failed, then stops the other I/O task.
    /// Only the first failure of a connection is reported.
    fn fail(&self, e: Error) {
        if self
            .inner
            .transition(ConnectionState::Streaming, ConnectionState::Failed)
        {
            error!("{} - {}", timestamp(), e);

            self.emit(ConnectionEvent::StateChanged {
                state: ConnectionState::Failed,
                detail: Some(e.to_string()),
            });
        }

        self.shutdown.send_replace(true);
    }
}

/// [StreamingClient] owns the connection to the caster.
/// Cloning creates a new handle to the same client.
#[derive(Clone)]
pub struct StreamingClient {
    inner: Arc<Inner>,
}

impl StreamingClient {
    pub fn new(config: SessionConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(Inner {
                config,
                state,
                link: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Current [ConnectionState]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Obtain a [ConnectionState] watch handle
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Connects to the caster and performs the handshake.
    /// All [ConnectionEvent]s of this connection are sent to `events`.
    /// Once Streaming, correction bytes flow until [Self::disconnect]
    /// or the first I/O failure. Only possible from
    /// [ConnectionState::Disconnected] or [ConnectionState::Failed].
    pub async fn connect(&self, events: UnboundedSender<ConnectionEvent>) -> Result<(), Error> {
        let (shutdown, mut cancel) = watch::channel(false);
        let shutdown = Arc::new(shutdown);

        let previous = {
            let mut link = self.inner.link();

            if !self
                .inner
                .transition(ConnectionState::Disconnected, ConnectionState::Connecting)
                && !self
                    .inner
                    .transition(ConnectionState::Failed, ConnectionState::Connecting)
            {
                warn!("{} - already {}", timestamp(), self.inner.state());
                return Err(Error::AlreadyConnected);
            }

            let _ = events.send(ConnectionEvent::StateChanged {
                state: ConnectionState::Connecting,
                detail: None,
            });

            link.replace(Link {
                events: events.clone(),
                shutdown: shutdown.clone(),
                uplink: None,
                tasks: Vec::new(),
            })
        };

        // release previous (failed) connection
        if let Some(previous) = previous {
            previous.close().await;
        }

        let cfg = &self.inner.config;

        info!(
            "{} - connecting to {}:{}/{}",
            timestamp(),
            cfg.host,
            cfg.port,
            cfg.mountpoint.trim_start_matches('/')
        );

        let handshake = tokio::select! {
            result = handshake(cfg) => result,
            _ = cancel.changed() => Err(Error::Aborted),
        };

        let (reader, writer) = match handshake {
            Ok(halves) => halves,
            Err(e) => {
                let (next, detail) = match &e {
                    Error::Protocol(status) => (ConnectionState::Failed, status.clone()),
                    e => (ConnectionState::Disconnected, e.to_string()),
                };

                let reported = {
                    let mut link = self.inner.link();
                    let changed = self.inner.transition(ConnectionState::Connecting, next);
                    if changed {
                        link.take();
                    }
                    changed
                };

                if reported {
                    error!("{} - connection failed: {}", timestamp(), e);

                    let _ = events.send(ConnectionEvent::StateChanged {
                        state: next,
                        detail: Some(detail),
                    });
                }

                return Err(e);
            },
        };

        let stream_timeout = to_std_duration(cfg.stream_timeout);
        let write_timeout = to_std_duration(cfg.connect_timeout);

        let (uplink_tx, uplink_rx) = mpsc::channel(UPLINK_QUEUE_SIZE);

        let ctx = Context {
            inner: self.inner.clone(),
            events: events.clone(),
            shutdown: shutdown.clone(),
        };

        let mut guard = self.inner.link();

        let Some(link) = guard.as_mut() else {
            return Err(Error::Aborted);
        };

        if !self
            .inner
            .transition(ConnectionState::Connecting, ConnectionState::Streaming)
        {
            return Err(Error::Aborted);
        }

        info!("{} - streaming", timestamp());

        let _ = events.send(ConnectionEvent::StateChanged {
            state: ConnectionState::Streaming,
            detail: None,
        });

        link.uplink = Some(uplink_tx);

        link.tasks.push(tokio::spawn(read_loop(
            ctx.clone(),
            reader,
            shutdown.subscribe(),
            stream_timeout,
        )));

        link.tasks.push(tokio::spawn(write_loop(
            ctx,
            writer,
            uplink_rx,
            shutdown.subscribe(),
            write_timeout,
        )));

        Ok(())
    }

    /// Queues one line for transmission. The line terminator is appended.
    /// Never blocks: lines are written by a dedicated task, in order.
    pub fn send(&self, line: &str) -> Result<(), Error> {
        if self.state() != ConnectionState::Streaming {
            debug!("{} - not streaming: uplink discarded", timestamp());
            return Err(Error::NotStreaming);
        }

        let guard = self.inner.link();

        let uplink = guard
            .as_ref()
            .and_then(|link| link.uplink.as_ref())
            .ok_or(Error::NotStreaming)?;

        uplink.try_send(line.to_string()).map_err(|e| match e {
            TrySendError::Full(_) => Error::UplinkQueueFull,
            TrySendError::Closed(_) => Error::NotStreaming,
        })
    }

    /// Closes the connection and waits for both I/O tasks to exit.
    /// Calling this while Disconnected has no effect.
    pub async fn disconnect(&self) {
        let (link, changed) = {
            let mut guard = self.inner.link();

            let changed = self.inner.state.send_if_modified(|state| {
                if *state != ConnectionState::Disconnected {
                    *state = ConnectionState::Disconnected;
                    true
                } else {
                    false
                }
            });

            (guard.take(), changed)
        };

        if let Some(link) = link {
            let events = link.events.clone();
            link.close().await;

            if changed {
                let _ = events.send(ConnectionEvent::StateChanged {
                    state: ConnectionState::Disconnected,
                    detail: None,
                });
            }
        }

        if changed {
            info!("{} - disconnected", timestamp());
        }
    }
}

/// Opens the socket, sends the request and verifies the caster status line.
async fn handshake(
    cfg: &SessionConfig,
) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), Error> {
    let connect_timeout = to_std_duration(cfg.connect_timeout);

    let stream = timeout(
        connect_timeout,
        TcpStream::connect((cfg.host.as_str(), cfg.port)),
    )
    .await
    .map_err(|_| Error::Timeout)??;

    let _ = stream.set_nodelay(true);

    let (reader, mut writer) = stream.into_split();

    let request = Request::new(cfg).to_string();
    writer.write_all(request.as_bytes()).await?;
    writer.flush().await?;

    debug!("{} - request sent", timestamp());

    // correction data may follow the status line: keep this buffer
    let mut reader = BufReader::new(reader);
    let mut line = Vec::<u8>::new();

    // status line may not be valid UTF-8
    let size = timeout(connect_timeout, reader.read_until(b'\n', &mut line))
        .await
        .map_err(|_| Error::Timeout)??;

    if size == 0 {
        return Err(Error::Protocol(
            "connection closed before response".to_string(),
        ));
    }

    let status = String::from_utf8_lossy(&line).trim_end().to_string();
    debug!("{} - caster response: \"{}\"", timestamp(), status);

    if !is_success(&status) {
        return Err(Error::Protocol(status));
    }

    Ok((reader, writer))
}

async fn read_loop(
    ctx: Context,
    mut reader: BufReader<OwnedReadHalf>,
    mut shutdown: watch::Receiver<bool>,
    stream_timeout: std::time::Duration,
) {
    let mut buffer = [0u8; READ_BUFFER_SIZE];

    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let read = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            },
            read = timeout(stream_timeout, reader.read(&mut buffer)) => read,
        };

        match read {
            Ok(Ok(0)) => {
                ctx.fail(Error::StreamIO("connection closed by caster".to_string()));
                break;
            },
            Ok(Ok(size)) => {
                trace!("{} - received {} bytes", timestamp(), size);

                let chunk = CorrectionChunk::new(now_utc(), buffer[..size].to_vec());
                ctx.emit(ConnectionEvent::Correction(chunk));
            },
            Ok(Err(e)) => {
                ctx.fail(Error::StreamIO(format!("read error: {}", e)));
                break;
            },
            Err(_) => {
                ctx.fail(Error::StreamIO(format!(
                    "no data received for {:?}",
                    stream_timeout
                )));
                break;
            },
        }
    }

    debug!("{} - read loop terminated", timestamp());
}

async fn write_loop(
    ctx: Context,
    mut writer: OwnedWriteHalf,
    mut uplink: mpsc::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
    write_timeout: std::time::Duration,
) {
    loop {
        if *shutdown.borrow_and_update() {
            break;
        }

        let line = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            },
            line = uplink.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let mut data = line.clone().into_bytes();
        data.extend_from_slice(b"\r\n");

        let written = timeout(write_timeout, async {
            writer.write_all(&data).await?;
            writer.flush().await
        })
        .await;

        match written {
            Ok(Ok(())) => {
                debug!("{} - uplink: {}", timestamp(), line);
                ctx.emit(ConnectionEvent::UplinkSent(line));
            },
            Ok(Err(e)) => {
                ctx.fail(Error::StreamIO(format!("write error: {}", e)));
                break;
            },
            Err(_) => {
                ctx.fail(Error::StreamIO("uplink write timed out".to_string()));
                break;
            },
        }
    }

    let _ = writer.shutdown().await;
    debug!("{} - write loop terminated", timestamp());
}
