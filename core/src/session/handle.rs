//! Lock-guarded access to a session
//!
//! The runtime may call hooks from several threads. Each call takes the
//! session lock for its whole duration, including any suspension, so hooks
//! are serialized.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{ComputeGraph, Debugger, RunLevel, SessionState};
use crate::tensor::TensorData;

/// Shared, lock-guarded [`Debugger`]
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<Mutex<Debugger>>,
}

impl SessionHandle {
    pub fn new(debugger: Debugger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(debugger)),
        }
    }

    /// Lock the session
    ///
    /// A poisoned lock is recovered; the session holds plain data.
    fn lock(&self) -> MutexGuard<'_, Debugger> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run `f` with the session locked
    pub fn with<R>(&self, f: impl FnOnce(&mut Debugger) -> R) -> R {
        f(&mut self.lock())
    }

    pub fn init(&self, device_id: u32, device_target: impl Into<String>) {
        self.lock().init(device_id, device_target);
    }

    pub fn reset(&self) {
        self.lock().reset();
    }

    pub fn pre_execute(&self, graph: &Arc<dyn ComputeGraph>) {
        self.lock().pre_execute(graph);
    }

    pub fn post_execute(&self) {
        self.lock().post_execute();
    }

    pub fn post_execute_node(&self) {
        self.lock().post_execute_node();
    }

    pub fn post_debug_op(&self) {
        self.lock().post_debug_op();
    }

    pub fn read_node_data_required(&self) -> bool {
        self.lock().read_node_data_required()
    }

    pub fn set_cur_node(&self, node_name: impl Into<String>) {
        self.lock().set_cur_node(node_name);
    }

    pub fn set_step_num(&self, step_num: u32) {
        self.lock().set_step_num(step_num);
    }

    pub fn set_training_done(&self, done: bool) {
        self.lock().set_training_done(done);
    }

    pub fn record_task(&self, stream_id: u64, task_id: u64, op_name: impl Into<String>) {
        self.lock().record_task(stream_id, task_id, op_name);
    }

    pub fn load_tensor(&self, tensor: TensorData) {
        self.lock().load_tensor(tensor);
    }

    pub fn empty_tensors(&self) {
        self.lock().empty_tensors();
    }

    pub fn state(&self) -> SessionState {
        self.lock().state()
    }

    pub fn is_enabled(&self) -> bool {
        self.lock().is_enabled()
    }

    pub fn step_num(&self) -> u32 {
        self.lock().step_num()
    }

    pub fn run_level(&self) -> RunLevel {
        self.lock().run_level()
    }

    pub fn partial_memory(&self) -> bool {
        self.lock().partial_memory()
    }
}
