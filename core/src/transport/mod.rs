//! Transport to the remote front end
//!
//! The debugger talks to its front end through the [`Transport`] trait. Every
//! call is one request followed by one reply. A [`Connector`] opens a
//! transport each time the debugger is (re)enabled.
//!
//! # Implementations
//!
//! - [`SocketTransport`] - framed TCP, connects lazily on first use
//! - [`ChannelTransport`] - in-process queues, used by embedders and tests

pub mod channel;
pub mod socket;

pub use channel::{ChannelConnector, ChannelTransport, RemoteConsole, channel};
pub use socket::{SocketTransport, TcpConnector};

use tensorwatch_shared::{
    Command, DecodeError, GraphTopology, Metadata, TensorChunk, WatchpointHitReport,
};

use crate::config::Endpoint;

/// Errors talking to the front end
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Could not reach the front end
    #[error("failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },
    /// Socket read or write failed
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Reply could not be decoded
    #[error("malformed reply: {0}")]
    Decode(#[from] DecodeError),
    /// Front end answered with an error
    #[error("front end rejected request: {0}")]
    Rejected(String),
    /// Front end answered with a message that does not fit the request
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
    /// No reply within the allowed time
    #[error("timed out waiting for the front end")]
    Timeout,
    /// Front end went away
    #[error("front end disconnected")]
    Disconnected,
}

/// Request/reply channel to the remote front end
pub trait Transport: Send {
    /// Send the topology of a newly bound graph
    fn send_graph(&mut self, graph: &GraphTopology) -> Result<(), TransportError>;

    /// Send a session metadata snapshot
    fn send_metadata(&mut self, metadata: &Metadata) -> Result<(), TransportError>;

    /// Announce a suspension and block until the front end sends a command
    fn wait_for_command(&mut self, metadata: &Metadata) -> Result<Command, TransportError>;

    /// Report watchpoint hits of one evaluation pass
    fn send_watchpoint_hits(&mut self, hits: &[WatchpointHitReport]) -> Result<(), TransportError>;

    /// Send tensor chunks answering a view command, in order
    fn send_tensors(&mut self, chunks: &[TensorChunk]) -> Result<(), TransportError>;
}

/// Opens transports to the front end
pub trait Connector: Send {
    fn connect(&self, endpoint: &Endpoint) -> Box<dyn Transport>;
}
