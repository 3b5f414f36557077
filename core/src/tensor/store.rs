//! Tensor store access
//!
//! The runtime hands materialized node outputs to a [`TensorLoader`]; the
//! debugger only reads them back through the [`TensorStore`] query contract.
//! Buffers are shared `Arc<[u8]>`, so a view stays valid for as long as it is
//! held even if the loader drops the entry.

use std::sync::Arc;

use hashbrown::HashMap;
use tensorwatch_shared::DataType;

use super::identity::TensorIdentity;

/// Iteration tag of tensors kept from the previous step
pub const PREV_ITER: &str = "prev";

/// One materialized output tensor
#[derive(Debug, Clone, PartialEq)]
pub struct TensorData {
    /// Fully scoped name of the producing node
    pub node_name: String,
    /// Output slot on that node
    pub slot: u32,
    pub data_type: DataType,
    pub shape: Vec<i64>,
    /// Raw little-endian element bytes
    pub data: Arc<[u8]>,
}

impl TensorData {
    pub fn new(
        node_name: impl Into<String>,
        slot: u32,
        data_type: DataType,
        shape: Vec<i64>,
        data: impl Into<Arc<[u8]>>,
    ) -> Self {
        Self {
            node_name: node_name.into(),
            slot,
            data_type,
            shape,
            data: data.into(),
        }
    }

    pub fn identity(&self) -> TensorIdentity {
        TensorIdentity::new(self.node_name.as_str(), self.slot)
    }

    /// Size of the buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}

/// A tensor found by [`TensorStore::read_tensors`]
#[derive(Debug, Clone)]
pub struct TensorView {
    /// Key the tensor was found under
    pub key: String,
    pub tensor: Arc<TensorData>,
}

/// Read-only query interface over live or dumped tensor values
pub trait TensorStore {
    /// Look up tensors by rendered key
    ///
    /// Keys that do not exist are left out. The result may be in any order.
    fn read_tensors(&self, keys: &[String]) -> Vec<TensorView>;

    /// All tensors of the current step, in load order
    fn tensors(&self) -> Vec<Arc<TensorData>>;

    /// Output tensors of one node, in load order
    fn node_tensors(&self, node_name: &str) -> Vec<Arc<TensorData>>;
}

/// In-memory tensor store fed by the runtime
///
/// Holds the tensors of the current step and, after [`TensorLoader::empty`],
/// the previous step's tensors under the `prev` iteration tag.
#[derive(Debug, Default)]
pub struct TensorLoader {
    current: Vec<Arc<TensorData>>,
    index: HashMap<String, usize>,
    previous: HashMap<String, Arc<TensorData>>,
}

impl TensorLoader {
    /// Create a new empty loader
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a tensor, replacing any tensor with the same `node:slot`
    pub fn load(&mut self, tensor: TensorData) {
        let key = tensor.identity().key();
        let tensor = Arc::new(tensor);
        match self.index.get(&key) {
            Some(&pos) => self.current[pos] = tensor,
            None => {
                self.index.insert(key, self.current.len());
                self.current.push(tensor);
            }
        }
    }

    /// Start a new step: current tensors become the previous iteration
    pub fn empty(&mut self) {
        self.previous.clear();
        for tensor in self.current.drain(..) {
            let key = tensor.identity().with_iter(PREV_ITER).key();
            self.previous.insert(key, tensor);
        }
        self.index.clear();
    }

    /// Drop everything, including the previous iteration
    pub fn clear(&mut self) {
        self.current.clear();
        self.index.clear();
        self.previous.clear();
    }

    /// Number of tensors in the current step
    pub fn len(&self) -> usize {
        self.current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<&Arc<TensorData>> {
        match self.index.get(key) {
            Some(&pos) => self.current.get(pos),
            None => self.previous.get(key),
        }
    }
}

impl TensorStore for TensorLoader {
    fn read_tensors(&self, keys: &[String]) -> Vec<TensorView> {
        keys.iter()
            .filter_map(|key| {
                self.lookup(key).map(|tensor| TensorView {
                    key: key.clone(),
                    tensor: Arc::clone(tensor),
                })
            })
            .collect()
    }

    fn tensors(&self) -> Vec<Arc<TensorData>> {
        self.current.clone()
    }

    fn node_tensors(&self, node_name: &str) -> Vec<Arc<TensorData>> {
        self.current
            .iter()
            .filter(|t| t.node_name == node_name)
            .cloned()
            .collect()
    }
}
