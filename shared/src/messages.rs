//! Debugger wire protocol messages
//!
//! Every exchange between the debugger and the remote front end is a request
//! from the debugger followed by exactly one reply from the front end.
//! Messages are serialized using bitcode.
//!
//! # Wire Format
//!
//! ```text
//! [TWDP][version:u16][length:u32][bitcode payload...]
//! ```
//!
//! # Exchange
//!
//! ```text
//! Debugger                         Front end
//!   |--- Metadata ----------------->|
//!   |<-- Ack -----------------------|
//!   |--- Graph -------------------->|  (new graph bound)
//!   |<-- Ack -----------------------|
//!   |--- WaitForCommand ----------->|  (suspended)
//!   |<-- Command(Set/View/...) -----|
//!   |--- Tensors ------------------>|  (answer to View)
//!   |<-- Ack -----------------------|
//!   |--- WaitForCommand ----------->|
//!   |<-- Command(Run) --------------|  (resume)
//! ```

use bitcode::{Decode, Encode};

use crate::tensor::DataType;

/// Protocol magic bytes
pub const TWDP_MAGIC: [u8; 4] = *b"TWDP";

/// Current protocol version
pub const TWDP_VERSION: u16 = 1;

/// Header size: magic (4) + version (2) + length (4)
pub const TWDP_HEADER_SIZE: usize = 10;

/// Largest payload a peer will accept in one frame
pub const MAX_FRAME_PAYLOAD: usize = 64 * 1024 * 1024;

// ============================================================================
// Core Message Enum
// ============================================================================

/// Top-level protocol message
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum DebuggerMessage {
    // Debugger -> Front end
    /// Session metadata snapshot
    Metadata(Metadata),
    /// Topology of a newly bound graph
    Graph(GraphTopology),
    /// Debugger is suspended and blocks for the next command
    WaitForCommand(Metadata),
    /// Watchpoints hit during the last evaluation pass
    WatchpointHits(Vec<WatchpointHitReport>),
    /// Tensor chunks answering a view command
    Tensors(Vec<TensorChunk>),

    // Front end -> Debugger
    /// Reply to `WaitForCommand`
    Command(Command),
    /// Positive reply to any send
    Ack,
    /// Negative reply with a reason
    Error(String),
}

// ============================================================================
// Debugger -> Front end
// ============================================================================

/// Session metadata sent on every suspension
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct Metadata {
    /// `"<device id>:<graph id>"`
    pub device_name: String,
    /// Number of graph steps executed so far
    pub cur_step: u32,
    /// Backend / device target name
    pub backend: String,
    /// Fully scoped name of the node the runtime is on
    pub cur_node: String,
    /// Whether the runtime reported training as finished
    pub training_done: bool,
}

/// Graph topology sent when a new graph is bound
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct GraphTopology {
    pub graph_id: u32,
    /// Parameter (graph input) names
    pub parameters: Vec<String>,
    /// Nodes in execution order
    pub nodes: Vec<GraphNode>,
}

/// One node of a graph topology
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct GraphNode {
    /// Fully scoped node name (e.g., "Default/network/conv1/Conv2D-op1")
    pub name: String,
    /// Operator kind (e.g., "Conv2D", "GetNext")
    pub kind: String,
    /// Names of the nodes feeding this one
    pub inputs: Vec<String>,
}

/// A watchpoint hit as reported to the front end
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct WatchpointHitReport {
    /// Watchpoint that fired
    pub id: u32,
    /// Node owning the tensor
    pub node_name: String,
    /// Output slot of the tensor
    pub slot: u32,
    /// Condition that was satisfied
    pub condition: ConditionSpec,
}

/// One chunk of a transferred tensor
///
/// A tensor is sent as an ordered run of chunks; only the last one has
/// `finished` set. A tensor that could not be found is a single finished
/// chunk with an empty payload and `DataType::Unknown`.
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct TensorChunk {
    pub node_name: String,
    pub slot: u32,
    /// Iteration tag, empty when the request carried none
    pub iter: String,
    /// Echo of the request's truncate flag
    pub truncate: bool,
    /// Raw little-endian element bytes of this chunk
    pub content: Vec<u8>,
    pub data_type: DataType,
    pub dims: Vec<i64>,
    pub finished: bool,
}

// ============================================================================
// Front end -> Debugger
// ============================================================================

/// Command sent by the front end while the debugger is suspended
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub enum Command {
    /// Terminate the training process
    Exit,
    /// Resume execution
    Run(RunCommand),
    /// Add or delete a watchpoint
    Set(SetCommand),
    /// Request tensor contents
    View(ViewCommand),
    /// Reply the debugger does not understand
    Unknown,
}

/// Resume execution with a new stepping granularity
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct RunCommand {
    /// `"node"` for single-node stepping, anything else for whole-graph
    pub run_level: String,
    /// Node to stop at when stepping by node (empty = next node)
    pub node_name: String,
}

/// Add or delete a watchpoint
#[derive(Debug, Clone, PartialEq, Encode, Decode)]
pub struct SetCommand {
    pub watch_nodes: Vec<WatchNode>,
    pub condition: ConditionSpec,
    pub id: u32,
    /// Delete the watchpoint `id` instead of setting it
    pub delete: bool,
}

/// Node matcher of a watchpoint
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct WatchNode {
    pub node_name: String,
    /// Match every node whose name starts with `node_name`
    pub is_scope: bool,
}

/// Wire form of a watch condition: a kind code plus one parameter
#[derive(Debug, Clone, Copy, Default, PartialEq, Encode, Decode)]
pub struct ConditionSpec {
    pub kind: i32,
    pub value: f32,
}

/// Request tensor contents
#[derive(Debug, Clone, Default, PartialEq, Encode, Decode)]
pub struct ViewCommand {
    pub tensors: Vec<TensorRequest>,
}

/// One requested tensor
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct TensorRequest {
    pub node_name: String,
    pub slot: u32,
    /// Iteration tag (empty = current)
    pub iter: String,
    /// Drop the scope prefix of `node_name` before lookup
    pub truncate: bool,
}

// ============================================================================
// Serialization
// ============================================================================

impl DebuggerMessage {
    /// Serialize message to bytes with protocol framing
    ///
    /// Returns wire format: [TWDP][version:u16][length:u32][payload...]
    pub fn to_bytes(&self) -> Vec<u8> {
        let payload = bitcode::encode(self);
        let mut bytes = Vec::with_capacity(TWDP_HEADER_SIZE + payload.len());

        bytes.extend_from_slice(&TWDP_MAGIC);
        bytes.extend_from_slice(&TWDP_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&payload);

        bytes
    }

    /// Deserialize message from bytes with protocol framing
    ///
    /// Validates magic, version, and length before decoding payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        let length = parse_header(bytes)?;

        if bytes.len() < TWDP_HEADER_SIZE + length {
            return Err(DecodeError::IncompletePayload {
                expected: length,
                got: bytes.len() - TWDP_HEADER_SIZE,
            });
        }

        let payload = &bytes[TWDP_HEADER_SIZE..TWDP_HEADER_SIZE + length];
        bitcode::decode(payload).map_err(|e| DecodeError::DecodeFailed(e.to_string()))
    }
}

/// Validate a frame header and return the payload length it announces
///
/// Stream transports read the header first, then exactly this many bytes.
pub fn parse_header(bytes: &[u8]) -> Result<usize, DecodeError> {
    if bytes.len() < TWDP_HEADER_SIZE {
        return Err(DecodeError::TooShort);
    }

    if bytes[0..4] != TWDP_MAGIC {
        return Err(DecodeError::InvalidMagic);
    }

    let version = u16::from_le_bytes([bytes[4], bytes[5]]);
    if version != TWDP_VERSION {
        return Err(DecodeError::VersionMismatch {
            expected: TWDP_VERSION,
            got: version,
        });
    }

    let length = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]) as usize;
    if length > MAX_FRAME_PAYLOAD {
        return Err(DecodeError::PayloadTooLarge(length));
    }

    Ok(length)
}

/// Errors that can occur when decoding protocol messages
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    /// Message too short for header
    #[error("message too short for TWDP header")]
    TooShort,
    /// Invalid magic bytes
    #[error("invalid TWDP magic bytes")]
    InvalidMagic,
    /// Protocol version mismatch
    #[error("TWDP version mismatch: expected {expected}, got {got}")]
    VersionMismatch { expected: u16, got: u16 },
    /// Payload incomplete
    #[error("incomplete payload: expected {expected} bytes, got {got}")]
    IncompletePayload { expected: usize, got: usize },
    /// Announced payload exceeds the frame limit
    #[error("payload of {0} bytes exceeds frame limit")]
    PayloadTooLarge(usize),
    /// Bitcode decode failed
    #[error("failed to decode TWDP message: {0}")]
    DecodeFailed(String),
}

// ============================================================================
// Tests
// ============================================================================
