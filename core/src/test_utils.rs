//! Shared test doubles for session tests

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tensorwatch_shared::{DataType, GraphNode};

use crate::config::{ConfigSource, DebuggerConfig};
use crate::session::{ComputeGraph, ProcessControl, Runtime};
use crate::tensor::TensorData;

// ============================================================================
// Runtime
// ============================================================================

/// What the debugger did to the runtime
#[derive(Debug, Default)]
pub struct RuntimeLog {
    pub memory_reuse: Vec<bool>,
    pub releases: u32,
    pub overflow_queries: Vec<(u32, u32)>,
}

/// Configurable runtime recording every call
#[derive(Clone, Default)]
pub struct MockRuntime {
    pub node_suspend: bool,
    pub dump: bool,
    pub overflow_dir: Option<PathBuf>,
    pub log: Arc<Mutex<RuntimeLog>>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node_suspend(mut self) -> Self {
        self.node_suspend = true;
        self
    }

    pub fn with_dump(mut self) -> Self {
        self.dump = true;
        self
    }

    pub fn with_overflow_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.overflow_dir = Some(dir.into());
        self
    }

    pub fn releases(&self) -> u32 {
        self.log.lock().unwrap().releases
    }

    pub fn memory_reuse(&self) -> Vec<bool> {
        self.log.lock().unwrap().memory_reuse.clone()
    }
}

impl Runtime for MockRuntime {
    fn supports_node_suspend(&self) -> bool {
        self.node_suspend
    }

    fn dump_enabled(&self) -> bool {
        self.dump
    }

    fn set_memory_reuse(&mut self, partial: bool) {
        self.log.lock().unwrap().memory_reuse.push(partial);
    }

    fn overflow_dir(&self, graph_id: u32, device_id: u32) -> Option<PathBuf> {
        self.log
            .lock()
            .unwrap()
            .overflow_queries
            .push((graph_id, device_id));
        self.overflow_dir.clone()
    }

    fn release_resources(&mut self) {
        self.log.lock().unwrap().releases += 1;
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Graph with a fixed node list
pub struct TestGraph {
    pub id: u32,
    pub nodes: Vec<GraphNode>,
}

impl TestGraph {
    /// Graph whose nodes are `(name, kind)` pairs chained input to output
    pub fn new(id: u32, nodes: &[(&str, &str)]) -> Arc<dyn ComputeGraph> {
        let mut previous: Option<String> = None;
        let nodes = nodes
            .iter()
            .map(|(name, kind)| {
                let node = GraphNode {
                    name: name.to_string(),
                    kind: kind.to_string(),
                    inputs: previous.iter().cloned().collect(),
                };
                previous = Some(name.to_string());
                node
            })
            .collect();
        Arc::new(TestGraph { id, nodes })
    }
}

impl ComputeGraph for TestGraph {
    fn graph_id(&self) -> u32 {
        self.id
    }

    fn parameters(&self) -> Vec<String> {
        vec!["x".to_string()]
    }

    fn execution_order(&self) -> Vec<GraphNode> {
        self.nodes.clone()
    }
}

// ============================================================================
// Process control
// ============================================================================

/// Records sleeps and exits instead of performing them
#[derive(Clone, Default)]
pub struct RecordingProcess {
    pub sleeps: Arc<Mutex<Vec<Duration>>>,
    pub exits: Arc<Mutex<Vec<i32>>>,
}

impl RecordingProcess {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }

    pub fn exits(&self) -> Vec<i32> {
        self.exits.lock().unwrap().clone()
    }
}

impl ProcessControl for RecordingProcess {
    fn sleep(&mut self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }

    fn exit(&mut self, code: i32) {
        self.exits.lock().unwrap().push(code);
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Configuration the test can change while the debugger holds it
#[derive(Clone, Default)]
pub struct SharedConfig(pub Arc<Mutex<DebuggerConfig>>);

impl SharedConfig {
    pub fn set_enable(&self, enable: bool) {
        self.0.lock().unwrap().enable = enable;
    }
}

impl ConfigSource for SharedConfig {
    fn load(&self) -> DebuggerConfig {
        self.0.lock().unwrap().clone()
    }
}

// ============================================================================
// Tensors
// ============================================================================

/// f32 tensor of `values`
pub fn f32_tensor(name: &str, slot: u32, values: &[f32]) -> TensorData {
    let bytes: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    TensorData::new(
        name,
        slot,
        DataType::Float32,
        vec![values.len() as i64],
        bytes,
    )
}
