//! Shared wire types for the tensorwatch debugger.
//!
//! Used by the debugger core and by any remote front end that drives it.

pub mod messages;
pub mod tensor;

pub use messages::{
    Command, ConditionSpec, DebuggerMessage, DecodeError, GraphNode, GraphTopology, Metadata,
    RunCommand, SetCommand, TWDP_HEADER_SIZE, TWDP_MAGIC, TWDP_VERSION, TensorChunk,
    TensorRequest, ViewCommand, WatchNode, WatchpointHitReport, parse_header,
};
pub use tensor::DataType;
