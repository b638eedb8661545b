use crate::{
    client::ConnectionState,
    position::{PositionEstimate, SolutionStatus},
};

/// Uplink outcome, for one scheduler tick
#[derive(Debug, Clone, PartialEq)]
pub enum UplinkEvent {
    /// Sentence handed to the client
    Queued(String),

    /// Sentence written to the socket
    Sent(String),

    /// No position available: tick skipped
    NoPosition,

    /// Sentence could not be handed to the client
    NotSent { sentence: String, reason: String },
}

/// Everything the embedding application is notified of
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// [ConnectionState] transition with possible failure detail
    Connection {
        state: ConnectionState,
        detail: Option<String>,
    },

    /// New solver position
    Position(PositionEstimate),

    /// New solver [SolutionStatus]
    Status(SolutionStatus),

    /// One correction chunk was rejected by the solver
    SolverError(String),

    /// [UplinkEvent]
    Uplink(UplinkEvent),
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Connection {
                state,
                detail: Some(detail),
            } => write!(f, "{} ({})", state, detail),
            Self::Connection { state, .. } => write!(f, "{}", state),
            Self::Position(position) => write!(f, "position: {}", position),
            Self::Status(status) => write!(f, "status: {}", status),
            Self::SolverError(e) => write!(f, "solver error: {}", e),
            Self::Uplink(UplinkEvent::Queued(sentence)) => write!(f, "uplink queued: {}", sentence),
            Self::Uplink(UplinkEvent::Sent(sentence)) => write!(f, "uplink sent: {}", sentence),
            Self::Uplink(UplinkEvent::NoPosition) => write!(f, "uplink: no position available"),
            Self::Uplink(UplinkEvent::NotSent { sentence, reason }) => {
                write!(f, "uplink not sent ({}): {}", reason, sentence)
            },
        }
    }
}
