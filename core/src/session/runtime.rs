//! Collaborators the debugger drives
//!
//! The runtime, its graphs, and the hosting process are external. The
//! debugger only sees them through these traits.

use std::path::PathBuf;
use std::time::Duration;

use tensorwatch_shared::{GraphNode, GraphTopology};

/// Op kinds that mark a graph as a dataset-pipeline graph
pub const DATASET_OP_KINDS: [&str; 2] = ["GetNext", "InitDataSetQueue"];

/// The tensor-computation runtime hosting the debugger
pub trait Runtime: Send {
    /// Whether the backend can suspend after each node natively
    ///
    /// When false the debugger suspends once after the whole graph.
    fn supports_node_suspend(&self) -> bool;

    /// Whether dump-on-overflow is configured
    fn dump_enabled(&self) -> bool;

    /// Switch device memory reuse between nodes
    fn set_memory_reuse(&mut self, partial: bool);

    /// Directory where overflow artifacts for a graph are written, if any
    fn overflow_dir(&self, graph_id: u32, device_id: u32) -> Option<PathBuf>;

    /// Free device resources before the process exits
    fn release_resources(&mut self);
}

/// A kernel graph the runtime executes
pub trait ComputeGraph: Send + Sync {
    fn graph_id(&self) -> u32;

    /// Parameter (graph input) names
    fn parameters(&self) -> Vec<String>;

    /// Nodes in execution order
    fn execution_order(&self) -> Vec<GraphNode>;

    /// Whether the graph feeds data rather than computing a step
    fn is_dataset_graph(&self) -> bool {
        self.execution_order()
            .iter()
            .any(|node| DATASET_OP_KINDS.contains(&node.kind.as_str()))
    }

    /// Topology sent to the front end when the graph is bound
    fn topology(&self) -> GraphTopology {
        GraphTopology {
            graph_id: self.graph_id(),
            parameters: self.parameters(),
            nodes: self.execution_order(),
        }
    }
}

/// Process-level effects of the command loop
pub trait ProcessControl: Send {
    /// Block the calling thread
    fn sleep(&mut self, duration: Duration);

    /// Terminate the process with `code`
    ///
    /// Only test doubles return from this.
    fn exit(&mut self, code: i32);
}

/// The real process
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemProcess;

impl ProcessControl for SystemProcess {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }

    fn exit(&mut self, code: i32) {
        std::process::exit(code);
    }
}
