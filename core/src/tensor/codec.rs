//! Tensor transfer codec
//!
//! Splits requested tensors into bounded chunks for delivery and joins
//! received chunks back together.
//!
//! # Chunk layout
//!
//! ```text
//! request: [a:0, missing:0, b:1]
//! chunks:  [a:0 #0][a:0 #1 finished][missing:0 finished, empty][b:1 finished]
//! ```

use hashbrown::HashMap;
use tensorwatch_shared::{DataType, TensorChunk, TensorRequest};

use super::identity::TensorIdentity;
use super::store::{TensorStore, TensorView};

/// Maximum payload of one chunk (3 MiB)
pub const CHUNK_SIZE: usize = 3 * 1024 * 1024;

/// Chunking encoder for view requests
#[derive(Debug, Clone, Copy)]
pub struct TensorCodec {
    chunk_size: usize,
}

impl Default for TensorCodec {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl TensorCodec {
    /// Codec with a custom chunk size (clamped to at least one byte)
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Resolve requests against the store and split them into chunks
    ///
    /// Output follows request order. A request the store cannot resolve
    /// yields one finished chunk with no payload.
    pub fn encode(&self, requests: &[TensorRequest], store: &dyn TensorStore) -> Vec<TensorChunk> {
        let keys: Vec<String> = requests
            .iter()
            .map(|r| TensorIdentity::from_request(r).key())
            .collect();
        let found = store.read_tensors(&keys);
        let by_key: HashMap<&str, &TensorView> =
            found.iter().map(|view| (view.key.as_str(), view)).collect();

        let mut chunks = Vec::new();
        for (request, key) in requests.iter().zip(&keys) {
            match by_key.get(key.as_str()) {
                Some(view) => self.push_tensor(request, view, &mut chunks),
                None => {
                    tracing::debug!(key = %key, "requested tensor not found");
                    chunks.push(placeholder(request));
                }
            }
        }
        chunks
    }

    fn push_tensor(&self, request: &TensorRequest, view: &TensorView, chunks: &mut Vec<TensorChunk>) {
        let data = &view.tensor.data;
        if data.is_empty() {
            chunks.push(self.chunk(request, view, &[], true));
            return;
        }
        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + self.chunk_size).min(data.len());
            let finished = end == data.len();
            chunks.push(self.chunk(request, view, &data[offset..end], finished));
            offset = end;
        }
    }

    fn chunk(
        &self,
        request: &TensorRequest,
        view: &TensorView,
        content: &[u8],
        finished: bool,
    ) -> TensorChunk {
        TensorChunk {
            node_name: request.node_name.clone(),
            slot: request.slot,
            iter: request.iter.clone(),
            truncate: request.truncate,
            content: content.to_vec(),
            data_type: view.tensor.data_type,
            dims: view.tensor.shape.clone(),
            finished,
        }
    }
}

fn placeholder(request: &TensorRequest) -> TensorChunk {
    TensorChunk {
        node_name: request.node_name.clone(),
        slot: request.slot,
        iter: request.iter.clone(),
        truncate: request.truncate,
        content: Vec::new(),
        data_type: DataType::Unknown,
        dims: Vec::new(),
        finished: true,
    }
}

/// A tensor rebuilt from its chunks
#[derive(Debug, Clone, PartialEq)]
pub struct ReassembledTensor {
    pub identity: TensorIdentity,
    pub data_type: DataType,
    pub dims: Vec<i64>,
    pub content: Vec<u8>,
}

impl ReassembledTensor {
    /// Whether this is the placeholder for a tensor that was not found
    pub fn is_missing(&self) -> bool {
        self.data_type == DataType::Unknown && self.content.is_empty()
    }
}

/// Chunk sequence that cannot be reassembled
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReassembleError {
    #[error("tensor '{0}' ended without a finished chunk")]
    Unfinished(String),
    #[error("chunk for '{found}' interleaved with unfinished tensor '{expected}'")]
    Interleaved { expected: String, found: String },
}

/// Join an ordered chunk sequence back into whole tensors
pub fn reassemble(chunks: &[TensorChunk]) -> Result<Vec<ReassembledTensor>, ReassembleError> {
    let mut tensors = Vec::new();
    let mut pending: Option<ReassembledTensor> = None;

    for chunk in chunks {
        let identity = TensorIdentity::new(chunk.node_name.as_str(), chunk.slot)
            .with_iter(chunk.iter.as_str());
        let mut current = match pending.take() {
            Some(tensor) if tensor.identity == identity => tensor,
            Some(tensor) => {
                return Err(ReassembleError::Interleaved {
                    expected: tensor.identity.key(),
                    found: identity.key(),
                });
            }
            None => ReassembledTensor {
                identity,
                data_type: chunk.data_type,
                dims: chunk.dims.clone(),
                content: Vec::new(),
            },
        };
        current.content.extend_from_slice(&chunk.content);
        if chunk.finished {
            tensors.push(current);
        } else {
            pending = Some(current);
        }
    }

    match pending {
        Some(tensor) => Err(ReassembleError::Unfinished(tensor.identity.key())),
        None => Ok(tensors),
    }
}
