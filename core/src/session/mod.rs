//! Debug session
//!
//! A [`Debugger`] is the per-process debugging context. The runtime calls its
//! hooks around graph and node execution; when a hook decides to suspend, the
//! debugger blocks in the command loop until the front end says to run.
//!
//! # Hooks
//!
//! ```text
//! pre_execute(graph)    new graph? bind, re-enable, send graph, suspend
//! post_execute_node()   watched node hit, or node stepping target reached
//! post_debug_op()       explicit debug op in the graph
//! post_execute()        end of graph: evaluate watchpoints, suspend
//! ```
//!
//! Runtime code reaches the debugger through a [`SessionHandle`], which holds
//! the session lock for the whole duration of every call.

mod command_loop;
pub mod handle;
pub mod overflow;
pub mod runtime;
pub mod state;


pub use command_loop::{MAX_WAIT_FAILURES, RETRY_INTERVAL};
pub use handle::SessionHandle;
pub use overflow::{OverflowScanner, TaskMap};
pub use runtime::{ComputeGraph, DATASET_OP_KINDS, ProcessControl, Runtime, SystemProcess};
pub use state::{RunLevel, SessionState};

use std::sync::{Arc, Weak};

use tensorwatch_shared::{Metadata, WatchpointHitReport};

use crate::config::{ConfigSource, EnvConfig};
use crate::tensor::{TensorCodec, TensorData, TensorLoader, TensorStore};
use crate::transport::{Connector, TcpConnector, Transport};
use crate::watch::{WatchRegistry, WatchpointHit, evaluate};

/// Per-process debugging context
pub struct Debugger {
    // Collaborators
    runtime: Box<dyn Runtime>,
    process: Box<dyn ProcessControl>,
    config_source: Box<dyn ConfigSource>,
    connector: Box<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    codec: TensorCodec,

    registry: WatchRegistry,
    loader: TensorLoader,
    overflow: Option<OverflowScanner>,
    /// Grows as tasks are recorded, only cleared by `reset`
    tasks: TaskMap,

    // Device identity
    device_id: u32,
    device_target: String,

    /// Graph last bound by `pre_execute`
    graph: Option<Weak<dyn ComputeGraph>>,
    graph_id: u32,

    state: SessionState,
    enabled: bool,
    /// Config enable flag, re-read on every `pre_execute` and on enable
    requested: Option<bool>,
    dataset_graph: bool,
    partial_memory: bool,
    step_num: u32,
    run_level: RunLevel,
    /// Node to stop at when stepping by node (empty = any)
    target_node: String,
    cur_node: String,
    training_done: bool,
}

impl Debugger {
    /// Create a disabled debugger for `runtime`
    ///
    /// Configuration comes from the environment and requests go over TCP
    /// unless overridden with the `with_*` builders.
    pub fn new(runtime: impl Runtime + 'static) -> Self {
        Self {
            runtime: Box::new(runtime),
            process: Box::new(SystemProcess),
            config_source: Box::new(EnvConfig),
            connector: Box::new(TcpConnector),
            transport: None,
            codec: TensorCodec::default(),
            registry: WatchRegistry::new(),
            loader: TensorLoader::new(),
            overflow: None,
            tasks: TaskMap::new(),
            device_id: 0,
            device_target: String::new(),
            graph: None,
            graph_id: 0,
            state: SessionState::Disabled,
            enabled: false,
            requested: None,
            dataset_graph: false,
            partial_memory: false,
            step_num: 0,
            run_level: RunLevel::Graph,
            target_node: String::new(),
            cur_node: String::new(),
            training_done: false,
        }
    }

    pub fn with_process(mut self, process: impl ProcessControl + 'static) -> Self {
        self.process = Box::new(process);
        self
    }

    pub fn with_config(mut self, source: impl ConfigSource + 'static) -> Self {
        self.config_source = Box::new(source);
        self.requested = None;
        self
    }

    pub fn with_connector(mut self, connector: impl Connector + 'static) -> Self {
        self.connector = Box::new(connector);
        self
    }

    pub fn with_codec(mut self, codec: TensorCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Wrap into a lockable handle for the runtime
    pub fn into_handle(self) -> SessionHandle {
        SessionHandle::new(self)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind the device this session debugs
    pub fn init(&mut self, device_id: u32, device_target: impl Into<String>) {
        self.device_id = device_id;
        self.device_target = device_target.into();
        tracing::info!(device_id, target = %self.device_target, "debugger bound to device");
    }

    /// Re-read configuration and (re)open the transport
    ///
    /// Watchpoints and loaded tensors start fresh. Stays disabled unless the
    /// configuration asks for debugging or the runtime dumps on overflow.
    pub fn enable_debugger(&mut self) {
        self.step_num = 0;
        self.enabled = false;
        self.partial_memory = false;
        self.transport = None;
        self.overflow = None;
        self.registry.clear();
        self.loader.clear();
        self.state = SessionState::Disabled;

        let dump_enabled = self.runtime.dump_enabled();
        let config = self.config_source.load();
        self.requested = Some(config.enable);
        tracing::info!(enable = config.enable, dump_enabled, "debugger configuration");

        if !config.enable && !dump_enabled {
            tracing::info!("debugger not enabled");
            return;
        }

        let endpoint = match config.resolve_endpoint() {
            Ok(endpoint) => Some(endpoint),
            Err(e) => {
                tracing::error!(error = %e, "debugger disabled by invalid configuration");
                None
            }
        };
        self.enabled = config.enable && endpoint.is_some();

        self.partial_memory = config.partial_memory;
        self.runtime.set_memory_reuse(self.partial_memory);
        if self.partial_memory {
            tracing::warn!(
                "partial memory reuse is on: set watchpoints before the first step; \
                 only watched tensors can be viewed"
            );
        }

        if self.graph.is_some()
            && let Some(dir) = self.runtime.overflow_dir(self.graph_id, self.device_id)
        {
            let mut scanner = OverflowScanner::new(dir);
            scanner.baseline();
            self.overflow = Some(scanner);
        }

        if self.enabled
            && let Some(endpoint) = endpoint
        {
            tracing::info!(%endpoint, "debugger enabled");
            self.transport = Some(self.connector.connect(&endpoint));
            self.state = SessionState::Idle;
        }
    }

    /// Return to the initial disabled state
    pub fn reset(&mut self) {
        self.transport = None;
        self.registry.clear();
        self.loader.clear();
        self.overflow = None;
        self.tasks.clear();
        self.device_id = 0;
        self.device_target.clear();
        self.graph = None;
        self.graph_id = 0;
        self.state = SessionState::Disabled;
        self.enabled = false;
        self.requested = None;
        self.dataset_graph = false;
        self.partial_memory = false;
        self.step_num = 0;
        self.run_level = RunLevel::Graph;
        self.target_node.clear();
        self.cur_node.clear();
        self.training_done = false;
    }

    // ========================================================================
    // Runtime hooks
    // ========================================================================

    /// Called before a graph executes
    pub fn pre_execute(&mut self, graph: &Arc<dyn ComputeGraph>) {
        self.requested = None;
        if !self.backend_enabled() || self.is_bound(graph) {
            return;
        }

        self.graph = Some(Arc::downgrade(graph));
        self.graph_id = graph.graph_id();
        tracing::info!(graph_id = self.graph_id, "debugger got new graph");

        self.dataset_graph = graph.is_dataset_graph();
        if self.dataset_graph {
            tracing::info!(graph_id = self.graph_id, "dataset graph, not debugging");
            return;
        }

        self.enable_debugger();
        if self.enabled {
            self.send_metadata();
            let topology = graph.topology();
            if let Some(transport) = self.transport.as_mut()
                && let Err(e) = transport.send_graph(&topology)
            {
                tracing::error!(error = %e, "failed to send graph");
            }
            self.command_loop();
        }
    }

    /// Called after a whole graph executed
    pub fn post_execute(&mut self) {
        if !self.backend_enabled() {
            return;
        }
        if self.run_level == RunLevel::Node {
            tracing::debug!("node level stepping, no suspension at end of graph");
            return;
        }
        if !self.enabled || self.dataset_graph {
            return;
        }

        if self.runtime.supports_node_suspend() {
            self.command_loop();
        } else {
            self.step_num += 1;
            tracing::info!(step = self.step_num, "suspending at end of step");
            let hits = self.check_watchpoints(None);
            self.send_hits_and_suspend(&hits);
        }
    }

    /// Called after each node executed
    pub fn post_execute_node(&mut self) {
        if !self.enabled || self.dataset_graph {
            return;
        }

        if self.registry.is_watched(&self.cur_node) {
            let node = self.cur_node.clone();
            let hits = self.check_watchpoints(Some(node.as_str()));
            if !hits.is_empty() {
                self.send_hits_and_suspend(&hits);
                return;
            }
        }
        if self.at_step_target() {
            self.command_loop();
        }
    }

    /// Called when a debug op in the graph executes
    pub fn post_debug_op(&mut self) {
        if self.enabled && !self.dataset_graph {
            tracing::info!("suspending at debug op");
            self.command_loop();
        }
    }

    /// Whether the runtime must keep the current node's outputs readable
    pub fn read_node_data_required(&self) -> bool {
        self.enabled
            && !self.dataset_graph
            && (self.registry.is_watched(&self.cur_node) || self.at_step_target())
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_cur_node(&mut self, node_name: impl Into<String>) {
        self.cur_node = node_name.into();
    }

    pub fn set_step_num(&mut self, step_num: u32) {
        self.step_num = step_num;
    }

    pub fn set_training_done(&mut self, done: bool) {
        self.training_done = done;
    }

    /// Remember which operator a device task runs
    pub fn record_task(&mut self, stream_id: u64, task_id: u64, op_name: impl Into<String>) {
        self.tasks.insert((stream_id, task_id), op_name.into());
    }

    /// Hand a materialized output tensor to the debugger
    pub fn load_tensor(&mut self, tensor: TensorData) {
        self.loader.load(tensor);
    }

    /// Start a new step; current tensors become the previous iteration
    pub fn empty_tensors(&mut self) {
        self.loader.empty();
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_dataset_graph(&self) -> bool {
        self.dataset_graph
    }

    pub fn partial_memory(&self) -> bool {
        self.partial_memory
    }

    pub fn step_num(&self) -> u32 {
        self.step_num
    }

    pub fn run_level(&self) -> RunLevel {
        self.run_level
    }

    pub fn target_node(&self) -> &str {
        &self.target_node
    }

    pub fn cur_node(&self) -> &str {
        &self.cur_node
    }

    pub fn training_done(&self) -> bool {
        self.training_done
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn device_target(&self) -> &str {
        &self.device_target
    }

    pub fn registry(&self) -> &WatchRegistry {
        &self.registry
    }

    pub fn tensor_loader(&self) -> &TensorLoader {
        &self.loader
    }

    pub fn tasks(&self) -> &TaskMap {
        &self.tasks
    }

    /// Debugging requested by configuration or dump-on-overflow active
    pub fn backend_enabled(&mut self) -> bool {
        if self.runtime.dump_enabled() {
            return true;
        }
        match self.requested {
            Some(requested) => requested,
            None => {
                let requested = self.config_source.load().enable;
                self.requested = Some(requested);
                requested
            }
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn is_bound(&self, graph: &Arc<dyn ComputeGraph>) -> bool {
        self.graph
            .as_ref()
            .is_some_and(|bound| Weak::ptr_eq(bound, &Arc::downgrade(graph)))
    }

    /// Node stepping is on and the current node is the one to stop at
    fn at_step_target(&self) -> bool {
        self.run_level == RunLevel::Node
            && (self.target_node.is_empty() || self.target_node == self.cur_node)
    }

    fn metadata(&self) -> Metadata {
        Metadata {
            device_name: format!("{}:{}", self.device_id, self.graph_id),
            cur_step: self.step_num,
            backend: self.device_target.clone(),
            cur_node: self.cur_node.clone(),
            training_done: self.training_done,
        }
    }

    fn send_metadata(&mut self) {
        let metadata = self.metadata();
        tracing::debug!(training_done = metadata.training_done, "sending metadata");
        if let Some(transport) = self.transport.as_mut()
            && let Err(e) = transport.send_metadata(&metadata)
        {
            tracing::error!(error = %e, "failed to send metadata");
        }
    }

    /// Evaluate watchpoints over all tensors, or one node's tensors
    fn check_watchpoints(&mut self, node: Option<&str>) -> Vec<WatchpointHit> {
        let overflow_ops = match self.overflow.as_mut() {
            Some(scanner) => scanner.scan(&self.tasks),
            None => Vec::new(),
        };
        let tensors = match node {
            Some(node) => self.loader.node_tensors(node),
            None => self.loader.tensors(),
        };
        evaluate(&self.registry, &tensors, &overflow_ops)
    }

    fn send_hits_and_suspend(&mut self, hits: &[WatchpointHit]) {
        if !hits.is_empty() {
            let reports: Vec<WatchpointHitReport> = hits.iter().map(Into::into).collect();
            tracing::info!(count = reports.len(), "watchpoints hit");
            if let Some(transport) = self.transport.as_mut()
                && let Err(e) = transport.send_watchpoint_hits(&reports)
            {
                tracing::error!(error = %e, "failed to send watchpoint hits");
            }
        }
        self.command_loop();
    }

    /// Leave debugging after an unrecoverable condition
    fn disable(&mut self) {
        self.enabled = false;
        self.transport = None;
        self.state = SessionState::Disabled;
    }
}
