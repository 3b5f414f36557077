//! Tests for the watchpoint registry

#![cfg(test)]

use super::super::condition::WatchCondition;
use super::{NodeMatcher, WatchRegistry};

fn ids(registry: &WatchRegistry) -> Vec<u32> {
    registry.list_active().map(|w| w.id).collect()
}

#[test]
fn test_registry_basic() {
    let mut registry = WatchRegistry::new();
    assert!(registry.is_empty());

    registry.add_or_replace(1, WatchCondition::Nan, [NodeMatcher::node("conv1")]);
    assert_eq!(registry.len(), 1);
    assert_eq!(registry.get(1).unwrap().condition, WatchCondition::Nan);
}

#[test]
fn test_last_write_wins() {
    let mut registry = WatchRegistry::new();

    registry.add_or_replace(3, WatchCondition::Nan, [NodeMatcher::node("a")]);
    registry.add_or_replace(3, WatchCondition::MaxGt(1.0), [NodeMatcher::scope("b")]);

    assert_eq!(registry.len(), 1);
    let watchpoint = registry.get(3).unwrap();
    assert_eq!(watchpoint.condition, WatchCondition::MaxGt(1.0));
    assert_eq!(watchpoint.matchers.as_slice(), &[NodeMatcher::scope("b")]);
}

#[test]
fn test_remove() {
    let mut registry = WatchRegistry::new();
    registry.add_or_replace(1, WatchCondition::Nan, [NodeMatcher::node("a")]);
    registry.add_or_replace(2, WatchCondition::Inf, [NodeMatcher::node("b")]);

    registry.remove(1);
    assert_eq!(ids(&registry), vec![2]);

    // Unknown id is a no-op
    registry.remove(99);
    assert_eq!(ids(&registry), vec![2]);
}

#[test]
fn test_operation_sequence_reflects_last_op_per_id() {
    let mut registry = WatchRegistry::new();

    registry.add_or_replace(5, WatchCondition::Nan, [NodeMatcher::node("x")]);
    registry.add_or_replace(2, WatchCondition::Inf, [NodeMatcher::node("y")]);
    registry.remove(5);
    registry.add_or_replace(7, WatchCondition::MeanLt(0.0), [NodeMatcher::node("z")]);
    registry.add_or_replace(5, WatchCondition::Overflow, [NodeMatcher::node("x")]);
    registry.remove(2);
    registry.remove(2);

    assert_eq!(ids(&registry), vec![5, 7]);
    assert_eq!(registry.get(5).unwrap().condition, WatchCondition::Overflow);
}

#[test]
fn test_list_is_id_ordered() {
    let mut registry = WatchRegistry::new();
    for id in [9, 1, 4] {
        registry.add_or_replace(id, WatchCondition::Nan, [NodeMatcher::node("n")]);
    }
    assert_eq!(ids(&registry), vec![1, 4, 9]);
}

#[test]
fn test_matchers() {
    let node = NodeMatcher::node("layer1/conv");
    assert!(node.matches("layer1/conv"));
    assert!(!node.matches("layer1/conv2"));

    let scope = NodeMatcher::scope("layer1");
    assert!(scope.matches("layer1/conv"));
    assert!(!scope.matches("layer2/conv"));

    let wildcard = NodeMatcher::scope("*");
    assert!(wildcard.matches("anything/at/all"));

    // A plain matcher named "*" is an ordinary name
    assert!(!NodeMatcher::node("*").matches("layer1/conv"));
}

#[test]
fn test_is_watched() {
    let mut registry = WatchRegistry::new();
    assert!(!registry.is_watched("layer1/conv"));

    registry.add_or_replace(
        1,
        WatchCondition::Nan,
        [NodeMatcher::node("fc/MatMul"), NodeMatcher::scope("layer1")],
    );
    assert!(registry.is_watched("layer1/conv"));
    assert!(registry.is_watched("fc/MatMul"));
    assert!(!registry.is_watched("layer2/conv"));

    registry.clear();
    assert!(!registry.is_watched("layer1/conv"));
}
