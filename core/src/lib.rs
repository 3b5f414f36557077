//! Tensorwatch Core - remotely controlled execution debugger
//!
//! Embeds in a graph tensor runtime and lets a remote front end pause
//! execution per graph or per node, set conditional watchpoints over tensor
//! values, and pull tensor contents while the runtime is suspended.
//!
//! # Architecture
//!
//! - [`Debugger`] - per-process session; runtime hooks and the command loop
//! - [`SessionHandle`] - lock-guarded handle the runtime calls into
//! - [`WatchRegistry`] / [`evaluate`] - watchpoints and their evaluation
//! - [`TensorLoader`] / [`TensorCodec`] - tensor store and chunked transfer
//! - [`Transport`] - request/reply link to the front end

pub mod config;
pub mod session;
pub mod tensor;
#[cfg(test)]
pub mod test_utils;
pub mod transport;
pub mod watch;

pub use config::{ConfigError, ConfigSource, DebuggerConfig, Endpoint, EnvConfig, StaticConfig};
pub use session::{
    ComputeGraph, Debugger, OverflowScanner, ProcessControl, RunLevel, Runtime, SessionHandle,
    SessionState, SystemProcess,
};
pub use tensor::{
    CHUNK_SIZE, TensorCodec, TensorData, TensorIdentity, TensorLoader, TensorStore, reassemble,
};
pub use transport::{Connector, SocketTransport, TcpConnector, Transport, TransportError};
pub use watch::{WatchCondition, WatchRegistry, WatchpointHit, evaluate};

// Wire types shared with front ends
pub use tensorwatch_shared as shared;
