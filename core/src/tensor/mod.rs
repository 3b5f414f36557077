//! Tensor identity, store access and transfer encoding

pub mod codec;
pub mod identity;
pub mod store;

pub use codec::{CHUNK_SIZE, ReassembleError, ReassembledTensor, TensorCodec, reassemble};
pub use identity::{IdentityError, TensorIdentity, truncate_scope};
pub use store::{PREV_ITER, TensorData, TensorLoader, TensorStore, TensorView};
