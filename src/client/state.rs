use hifitime::prelude::Epoch;

/// Connection state, owned by the [super::StreamingClient].
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,

    /// TCP connection and handshake in progress
    Connecting,

    /// Correction data is flowing
    Streaming,

    /// Last attempt failed. A new connection request is required.
    Failed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Streaming => write!(f, "streaming"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Opaque correction bytes, as read from the socket
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionChunk {
    /// Arrival [Epoch]
    pub epoch: Epoch,

    /// Raw payload
    pub bytes: Vec<u8>,
}

impl CorrectionChunk {
    pub fn new(epoch: Epoch, bytes: Vec<u8>) -> Self {
        Self { epoch, bytes }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Events emitted by the [super::StreamingClient], in occurrence order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// New [ConnectionState], with possible failure detail
    StateChanged {
        state: ConnectionState,
        detail: Option<String>,
    },

    /// New [CorrectionChunk]
    Correction(CorrectionChunk),

    /// Uplink line was written to the socket
    UplinkSent(String),
}
