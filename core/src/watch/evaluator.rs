//! Watchpoint evaluation pass
//!
//! Checks every candidate tensor against every active watchpoint that
//! covers its node. Tensors are visited in the order given; watchpoints in id
//! order. Each (tensor, watchpoint) match is one hit.

use std::sync::Arc;

use tensorwatch_shared::WatchpointHitReport;

use super::condition::WatchCondition;
use super::registry::WatchRegistry;
use super::stats::TensorStatistics;
use crate::tensor::TensorData;

/// A watchpoint that fired on a tensor
#[derive(Debug, Clone, PartialEq)]
pub struct WatchpointHit {
    pub id: u32,
    pub node_name: String,
    pub slot: u32,
    pub condition: WatchCondition,
}

impl From<&WatchpointHit> for WatchpointHitReport {
    fn from(hit: &WatchpointHit) -> Self {
        WatchpointHitReport {
            id: hit.id,
            node_name: hit.node_name.clone(),
            slot: hit.slot,
            condition: hit.condition.into(),
        }
    }
}

/// Evaluate all active watchpoints over the candidate tensors
///
/// `overflow_ops` lists operators the device reported as overflowing; it
/// decides `Overflow` conditions. Statistics are computed at most once per
/// tensor and only when a statistic-based watchpoint covers it.
pub fn evaluate(
    registry: &WatchRegistry,
    tensors: &[Arc<TensorData>],
    overflow_ops: &[String],
) -> Vec<WatchpointHit> {
    let mut hits = Vec::new();
    if registry.is_empty() {
        return hits;
    }

    for tensor in tensors {
        let mut stats: Option<TensorStatistics> = None;
        for watchpoint in registry.list_active() {
            if !watchpoint.watches(&tensor.node_name) {
                continue;
            }
            let condition = watchpoint.condition;
            let hit = if condition.is_overflow() {
                overflow_ops.iter().any(|op| *op == tensor.node_name)
            } else {
                let stats = stats.get_or_insert_with(|| {
                    TensorStatistics::from_bytes(&tensor.data, tensor.data_type)
                });
                condition.check(stats)
            };
            if hit {
                tracing::debug!(
                    id = watchpoint.id,
                    node = %tensor.node_name,
                    slot = tensor.slot,
                    condition = %condition,
                    "watchpoint hit"
                );
                hits.push(WatchpointHit {
                    id: watchpoint.id,
                    node_name: tensor.node_name.clone(),
                    slot: tensor.slot,
                    condition,
                });
            }
        }
    }
    hits
}
