use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Socket could not be opened, or the request could not be written.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// TCP connection or caster response did not complete in time.
    #[error("connection timed out")]
    Timeout,

    /// Caster answered with anything but a success status.
    /// Holds the raw status line.
    #[error("caster rejected request: {0}")]
    Protocol(String),

    /// Read or write failure once streaming.
    #[error("stream i/o error: {0}")]
    StreamIO(String),

    /// Solver failed to process one correction chunk.
    #[error("solver error: {0}")]
    Solver(String),

    /// Neither a solver position nor a last known location exist (yet).
    #[error("no position available")]
    NoPositionAvailable,

    #[error("not streaming")]
    NotStreaming,

    #[error("already connected or connecting")]
    AlreadyConnected,

    /// Connection attempt was interrupted by a disconnection request.
    #[error("connection attempt aborted")]
    Aborted,

    #[error("uplink queue is full")]
    UplinkQueueFull,

    #[error("correction worker has stopped")]
    WorkerStopped,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("configuration file error: {0}")]
    ConfigFile(#[from] serde_json::Error),

    #[error("invalid sentence: {0}")]
    InvalidSentence(String),
}
