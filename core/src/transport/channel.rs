//! In-process transport
//!
//! Commands are queued by a [`RemoteConsole`] and consumed by the debugger's
//! command loop. Everything the debugger sends ends up in the console's
//! outbox. A wait with no queued command fails once the wait timeout passes,
//! which the command loop treats like any other failed wait.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tensorwatch_shared::{
    Command, DebuggerMessage, GraphTopology, Metadata, TensorChunk, WatchpointHitReport,
};

use super::{Connector, Transport, TransportError};
use crate::config::Endpoint;

/// Create a connected console/connector pair
///
/// `wait_timeout` bounds how long a wait blocks on an empty command queue.
pub fn channel(wait_timeout: Duration) -> (ChannelConnector, RemoteConsole) {
    let (command_tx, command_rx) = mpsc::channel();
    let (outbox_tx, outbox_rx) = mpsc::channel();
    let endpoints = Arc::new(Mutex::new(Vec::new()));

    let connector = ChannelConnector {
        transport: ChannelTransport {
            commands: Arc::new(Mutex::new(command_rx)),
            outbox: outbox_tx,
            wait_timeout,
        },
        endpoints: Arc::clone(&endpoints),
    };
    let console = RemoteConsole {
        commands: Some(command_tx),
        outbox: outbox_rx,
        endpoints,
    };
    (connector, console)
}

/// Front end side of the channel
pub struct RemoteConsole {
    commands: Option<Sender<Command>>,
    outbox: Receiver<DebuggerMessage>,
    endpoints: Arc<Mutex<Vec<Endpoint>>>,
}

impl RemoteConsole {
    /// Queue a command for the next wait
    pub fn push(&self, command: Command) {
        if let Some(commands) = &self.commands {
            // The debugger side may already be gone
            let _ = commands.send(command);
        }
    }

    /// Queue several commands in order
    pub fn push_all(&self, commands: impl IntoIterator<Item = Command>) {
        for command in commands {
            self.push(command);
        }
    }

    /// Close the command queue; later waits fail with `Disconnected`
    pub fn hang_up(&mut self) {
        self.commands = None;
    }

    /// Take every message the debugger sent so far
    pub fn drain(&self) -> Vec<DebuggerMessage> {
        self.outbox.try_iter().collect()
    }

    /// Endpoints transports were opened for, in order
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.endpoints
            .lock()
            .map(|e| e.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

/// Debugger side of the channel
#[derive(Clone)]
pub struct ChannelTransport {
    commands: Arc<Mutex<Receiver<Command>>>,
    outbox: Sender<DebuggerMessage>,
    wait_timeout: Duration,
}

impl ChannelTransport {
    fn post(&self, message: DebuggerMessage) -> Result<(), TransportError> {
        self.outbox
            .send(message)
            .map_err(|_| TransportError::Disconnected)
    }
}

impl Transport for ChannelTransport {
    fn send_graph(&mut self, graph: &GraphTopology) -> Result<(), TransportError> {
        self.post(DebuggerMessage::Graph(graph.clone()))
    }

    fn send_metadata(&mut self, metadata: &Metadata) -> Result<(), TransportError> {
        self.post(DebuggerMessage::Metadata(metadata.clone()))
    }

    fn wait_for_command(&mut self, metadata: &Metadata) -> Result<Command, TransportError> {
        self.post(DebuggerMessage::WaitForCommand(metadata.clone()))?;

        let commands = self
            .commands
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match commands.recv_timeout(self.wait_timeout) {
            Ok(command) => Ok(command),
            Err(RecvTimeoutError::Timeout) => Err(TransportError::Timeout),
            Err(RecvTimeoutError::Disconnected) => Err(TransportError::Disconnected),
        }
    }

    fn send_watchpoint_hits(&mut self, hits: &[WatchpointHitReport]) -> Result<(), TransportError> {
        self.post(DebuggerMessage::WatchpointHits(hits.to_vec()))
    }

    fn send_tensors(&mut self, chunks: &[TensorChunk]) -> Result<(), TransportError> {
        self.post(DebuggerMessage::Tensors(chunks.to_vec()))
    }
}

/// Hands out [`ChannelTransport`]s sharing one command queue
pub struct ChannelConnector {
    transport: ChannelTransport,
    endpoints: Arc<Mutex<Vec<Endpoint>>>,
}

impl Connector for ChannelConnector {
    fn connect(&self, endpoint: &Endpoint) -> Box<dyn Transport> {
        self.endpoints
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(endpoint.clone());
        Box::new(self.transport.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint {
            host: "localhost".to_string(),
            port: 50051,
        }
    }

    #[test]
    fn test_commands_in_queue_order() {
        let (connector, console) = channel(Duration::ZERO);
        console.push_all([Command::Unknown, Command::Exit]);

        let mut transport = connector.connect(&endpoint());
        let metadata = Metadata::default();
        assert_eq!(transport.wait_for_command(&metadata).unwrap(), Command::Unknown);
        assert_eq!(transport.wait_for_command(&metadata).unwrap(), Command::Exit);
        let result = transport.wait_for_command(&metadata);
        assert!(matches!(result, Err(TransportError::Timeout)));

        let sent = console.drain();
        assert_eq!(sent.len(), 3);
        assert!(sent.iter().all(|m| matches!(m, DebuggerMessage::WaitForCommand(_))));
    }

    #[test]
    fn test_hang_up_disconnects() {
        let (connector, mut console) = channel(Duration::from_secs(10));
        console.hang_up();

        let mut transport = connector.connect(&endpoint());
        let result = transport.wait_for_command(&Metadata::default());
        assert!(matches!(result, Err(TransportError::Disconnected)));
    }

    #[test]
    fn test_reconnect_shares_queue() {
        let (connector, console) = channel(Duration::ZERO);
        console.push(Command::Exit);

        drop(connector.connect(&endpoint()));
        let mut second = connector.connect(&endpoint());
        assert_eq!(second.wait_for_command(&Metadata::default()).unwrap(), Command::Exit);
        assert_eq!(console.endpoints(), vec![endpoint(), endpoint()]);
    }
}
