//! Framed TCP transport
//!
//! Each request is one TWDP frame written to the stream; the reply is read
//! back as one frame (header first, then exactly the announced payload).
//! The connection is opened on first use and dropped when the framing breaks
//! or the socket fails, so the next request reconnects. A well-framed reply
//! whose payload does not decode leaves the connection open.
//!
//! Acknowledged sends give up after the send timeout. Waiting for a command
//! blocks until the front end answers.

use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tensorwatch_shared::{
    Command, DebuggerMessage, DecodeError, GraphTopology, Metadata, TWDP_HEADER_SIZE,
    TensorChunk, WatchpointHitReport, parse_header,
};

use super::{Connector, Transport, TransportError};
use crate::config::Endpoint;

/// Timeout for establishing the connection
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on writes and on the reply to an acknowledged send
pub const SEND_TIMEOUT: Duration = Duration::from_secs(30);

/// TCP transport with TWDP framing
pub struct SocketTransport {
    endpoint: Endpoint,
    stream: Option<TcpStream>,
    send_timeout: Duration,
}

impl SocketTransport {
    /// Create a transport for `endpoint` without connecting yet
    pub fn new(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            stream: None,
            send_timeout: SEND_TIMEOUT,
        }
    }

    /// Replace the send timeout (zero is raised to one millisecond)
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Whether a connection is currently open
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn connect(&self) -> Result<TcpStream, TransportError> {
        let connect_error = |reason: String| TransportError::Connect {
            endpoint: self.endpoint.to_string(),
            reason,
        };

        let addrs = (self.endpoint.host.as_str(), self.endpoint.port)
            .to_socket_addrs()
            .map_err(|e| connect_error(e.to_string()))?;

        let mut last_error = String::from("no address resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    stream.set_write_timeout(Some(self.send_timeout))?;
                    tracing::info!(%addr, "connected to debugger front end");
                    return Ok(stream);
                }
                Err(e) => last_error = e.to_string(),
            }
        }
        Err(connect_error(last_error))
    }

    /// Send one message and read one reply
    ///
    /// `reply_timeout` bounds the wait for the reply; `None` blocks.
    fn request(
        &mut self,
        message: &DebuggerMessage,
        reply_timeout: Option<Duration>,
    ) -> Result<DebuggerMessage, TransportError> {
        let stream = match self.stream.take() {
            Some(stream) => stream,
            None => self.connect()?,
        };
        stream.set_read_timeout(reply_timeout)?;
        let (stream, frame) = exchange(stream, message)?;
        self.stream = Some(stream);
        Ok(DebuggerMessage::from_bytes(&frame)?)
    }

    fn request_ack(&mut self, message: &DebuggerMessage) -> Result<(), TransportError> {
        match self.request(message, Some(self.send_timeout))? {
            DebuggerMessage::Ack => Ok(()),
            DebuggerMessage::Error(reason) => Err(TransportError::Rejected(reason)),
            other => Err(TransportError::UnexpectedReply(format!("{:?}", other))),
        }
    }
}

/// Write `message` and read one complete reply frame
///
/// The stream is returned only when a whole frame with a valid header was
/// read. Decoding the payload is left to the caller.
fn exchange(
    mut stream: TcpStream,
    message: &DebuggerMessage,
) -> Result<(TcpStream, Vec<u8>), TransportError> {
    stream.write_all(&message.to_bytes()).map_err(io_error)?;
    stream.flush().map_err(io_error)?;

    let mut frame = vec![0u8; TWDP_HEADER_SIZE];
    stream.read_exact(&mut frame).map_err(io_error)?;
    let length = parse_header(&frame)?;
    frame.resize(TWDP_HEADER_SIZE + length, 0);
    stream
        .read_exact(&mut frame[TWDP_HEADER_SIZE..])
        .map_err(io_error)?;

    Ok((stream, frame))
}

/// Socket timeouts surface as `WouldBlock` or `TimedOut` depending on platform
fn io_error(e: io::Error) -> TransportError {
    match e.kind() {
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => TransportError::Timeout,
        _ => TransportError::Io(e),
    }
}

impl Transport for SocketTransport {
    fn send_graph(&mut self, graph: &GraphTopology) -> Result<(), TransportError> {
        self.request_ack(&DebuggerMessage::Graph(graph.clone()))
    }

    fn send_metadata(&mut self, metadata: &Metadata) -> Result<(), TransportError> {
        self.request_ack(&DebuggerMessage::Metadata(metadata.clone()))
    }

    fn wait_for_command(&mut self, metadata: &Metadata) -> Result<Command, TransportError> {
        let message = DebuggerMessage::WaitForCommand(metadata.clone());
        match self.request(&message, None) {
            Ok(DebuggerMessage::Command(command)) => Ok(command),
            // Empty reply, nothing to do
            Ok(DebuggerMessage::Ack) => Ok(Command::Unknown),
            Ok(DebuggerMessage::Error(reason)) => Err(TransportError::Rejected(reason)),
            Ok(other) => Err(TransportError::UnexpectedReply(format!("{:?}", other))),
            // Complete frame, payload from a newer or foreign front end
            Err(TransportError::Decode(DecodeError::DecodeFailed(reason))) => {
                tracing::debug!(%reason, "undecodable command, treating as unknown");
                Ok(Command::Unknown)
            }
            Err(e) => Err(e),
        }
    }

    fn send_watchpoint_hits(&mut self, hits: &[WatchpointHitReport]) -> Result<(), TransportError> {
        self.request_ack(&DebuggerMessage::WatchpointHits(hits.to_vec()))
    }

    fn send_tensors(&mut self, chunks: &[TensorChunk]) -> Result<(), TransportError> {
        // One frame per chunk keeps every frame under the payload limit
        for chunk in chunks {
            self.request_ack(&DebuggerMessage::Tensors(vec![chunk.clone()]))?;
        }
        Ok(())
    }
}

/// Opens [`SocketTransport`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    fn connect(&self, endpoint: &Endpoint) -> Box<dyn Transport> {
        Box::new(SocketTransport::new(endpoint.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;
    use std::sync::mpsc;
    use tensorwatch_shared::{RunCommand, TWDP_MAGIC, TWDP_VERSION};

    fn read_frame(stream: &mut TcpStream) -> DebuggerMessage {
        let mut frame = vec![0u8; TWDP_HEADER_SIZE];
        stream.read_exact(&mut frame).unwrap();
        let length = parse_header(&frame).unwrap();
        frame.resize(TWDP_HEADER_SIZE + length, 0);
        stream.read_exact(&mut frame[TWDP_HEADER_SIZE..]).unwrap();
        DebuggerMessage::from_bytes(&frame).unwrap()
    }

    fn loopback_endpoint(listener: &TcpListener) -> Endpoint {
        Endpoint {
            host: "127.0.0.1".to_string(),
            port: listener.local_addr().unwrap().port(),
        }
    }

    #[test]
    fn test_lazy_connect() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let transport = SocketTransport::new(loopback_endpoint(&listener));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_loopback_exchange() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = loopback_endpoint(&listener);

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();

            received.push(read_frame(&mut stream));
            stream.write_all(&DebuggerMessage::Ack.to_bytes()).unwrap();

            received.push(read_frame(&mut stream));
            let run = Command::Run(RunCommand {
                run_level: "node".to_string(),
                node_name: String::new(),
            });
            stream
                .write_all(&DebuggerMessage::Command(run).to_bytes())
                .unwrap();
            received
        });

        let mut transport = SocketTransport::new(endpoint);
        let metadata = Metadata {
            device_name: "0:1".to_string(),
            ..Default::default()
        };
        transport.send_metadata(&metadata).unwrap();
        assert!(transport.is_connected());

        let command = transport.wait_for_command(&metadata).unwrap();
        assert!(matches!(command, Command::Run(ref run) if run.run_level == "node"));

        let received = server.join().unwrap();
        assert_eq!(received[0], DebuggerMessage::Metadata(metadata.clone()));
        assert_eq!(received[1], DebuggerMessage::WaitForCommand(metadata));
    }

    #[test]
    fn test_error_reply_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = loopback_endpoint(&listener);

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream);
            stream
                .write_all(&DebuggerMessage::Error("busy".to_string()).to_bytes())
                .unwrap();
        });

        let mut transport = SocketTransport::new(endpoint);
        let result = transport.send_graph(&GraphTopology::default());
        assert!(matches!(result, Err(TransportError::Rejected(ref r)) if r == "busy"));
        server.join().unwrap();
    }

    #[test]
    fn test_bad_magic_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = loopback_endpoint(&listener);

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream);
            let mut bytes = DebuggerMessage::Ack.to_bytes();
            assert_eq!(bytes[0..4], TWDP_MAGIC);
            bytes[0] = b'X';
            stream.write_all(&bytes).unwrap();
        });

        let mut transport = SocketTransport::new(endpoint);
        let result = transport.send_metadata(&Metadata::default());
        assert!(matches!(result, Err(TransportError::Decode(_))));
        assert!(!transport.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn test_undecodable_command_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = loopback_endpoint(&listener);

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream);
            let mut frame = TWDP_MAGIC.to_vec();
            frame.extend_from_slice(&TWDP_VERSION.to_le_bytes());
            frame.extend_from_slice(&3u32.to_le_bytes());
            frame.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
            stream.write_all(&frame).unwrap();

            read_frame(&mut stream);
            stream
                .write_all(&DebuggerMessage::Command(Command::Exit).to_bytes())
                .unwrap();
        });

        let mut transport = SocketTransport::new(endpoint);
        let metadata = Metadata::default();
        assert_eq!(transport.wait_for_command(&metadata).unwrap(), Command::Unknown);
        assert!(transport.is_connected());

        // Same connection serves the next wait
        assert_eq!(transport.wait_for_command(&metadata).unwrap(), Command::Exit);
        server.join().unwrap();
    }

    #[test]
    fn test_undecodable_ack_keeps_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = loopback_endpoint(&listener);

        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream);
            let mut frame = TWDP_MAGIC.to_vec();
            frame.extend_from_slice(&TWDP_VERSION.to_le_bytes());
            frame.extend_from_slice(&3u32.to_le_bytes());
            frame.extend_from_slice(&[0xFF, 0xFF, 0xFF]);
            stream.write_all(&frame).unwrap();
        });

        let mut transport = SocketTransport::new(endpoint);
        let result = transport.send_metadata(&Metadata::default());
        assert!(matches!(
            result,
            Err(TransportError::Decode(DecodeError::DecodeFailed(_)))
        ));
        assert!(transport.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn test_unanswered_send_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = loopback_endpoint(&listener);
        let (done_tx, done_rx) = mpsc::channel::<()>();

        // Accepts and reads, never replies
        let server = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            read_frame(&mut stream);
            done_rx.recv().unwrap();
        });

        let mut transport =
            SocketTransport::new(endpoint).with_send_timeout(Duration::from_millis(200));
        let result = transport.send_metadata(&Metadata::default());
        assert!(matches!(result, Err(TransportError::Timeout)));
        assert!(!transport.is_connected());

        done_tx.send(()).unwrap();
        server.join().unwrap();
    }

    #[test]
    fn test_connect_refused() {
        // Bind then drop to get a port nothing listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut transport = SocketTransport::new(Endpoint {
            host: "127.0.0.1".to_string(),
            port,
        });
        let result = transport.wait_for_command(&Metadata::default());
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
