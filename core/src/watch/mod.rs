//! Watchpoints
//!
//! Conditional watches over tensor values, set by the remote front end.
//!
//! # Overview
//!
//! - [`WatchRegistry`] - watchpoints keyed by id (last write wins)
//! - [`WatchCondition`] - condition kinds with a pure check per kind
//! - [`TensorStatistics`] - NaN / Inf / min / max / mean of a tensor buffer
//! - [`evaluate`] - one evaluation pass producing [`WatchpointHit`]s

pub mod condition;
pub mod evaluator;
pub mod registry;
pub mod stats;

pub use condition::{ConditionError, WatchCondition};
pub use evaluator::{WatchpointHit, evaluate};
pub use registry::{NodeMatcher, SCOPE_WILDCARD, WatchRegistry, Watchpoint};
pub use stats::{FiniteRange, TensorStatistics};
