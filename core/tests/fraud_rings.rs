//! Fraud-ring detection: partition determinism, ring subset property,
//! minimum size, scoring bands and ego networks.

mod common;

use common::Fixture;
use provider_risk_core::{
    community::FraudRingDetector,
    config::EngineConfig,
    graph::ProviderGraph,
    graph_builder::GraphBuilder,
    model::SuspicionLevel,
};
use std::collections::HashMap;

fn build(fx: &Fixture) -> ProviderGraph {
    GraphBuilder::new(&EngineConfig::default())
        .unwrap()
        .build(&fx.store)
        .unwrap()
}

fn detector() -> FraudRingDetector {
    FraudRingDetector::new(&EngineConfig::default().graph)
}

/// Two 4-provider cliques joined by a single weaker bridge (4 ↔ 5), plus an
/// isolated pair.
fn two_cliques() -> Fixture {
    let fx = Fixture::new();
    for id in 1..=10 {
        fx.clinic(id, "TX");
    }
    fx.shared_patients("west", &[1, 2, 3, 4], 8);
    fx.shared_patients("east", &[5, 6, 7, 8], 8);
    fx.shared_patients("bridge", &[4, 5], 5);
    fx.shared_patients("pair", &[9, 10], 6);
    fx
}

#[test]
fn triangle_yields_exactly_one_ring() {
    let fx = Fixture::new();
    for id in [1, 2, 3, 4, 5] {
        fx.clinic(id, "TX");
    }
    fx.shared_patients("abc", &[1, 2, 3], 6);
    fx.shared_patients("de", &[4, 5], 6);

    let graph = build(&fx);
    let rings = detector().detect_rings(&graph, 3);

    assert_eq!(rings.len(), 1, "expected exactly one ring, got {rings:?}");
    assert_eq!(rings[0].members, vec![1, 2, 3]);
    assert_eq!(rings[0].ring_id, "ring-001");
    assert_eq!(rings[0].internal_edges, 3);
    assert_eq!(rings[0].internal_density, 1.0);
}

#[test]
fn cliques_are_separate_rings() {
    let fx = two_cliques();
    let graph = build(&fx);
    let rings = detector().detect_rings(&graph, 3);

    let mut member_sets: Vec<Vec<i64>> = rings.iter().map(|r| r.members.clone()).collect();
    member_sets.sort();
    assert_eq!(member_sets, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
}

#[test]
fn rings_below_min_size_never_appear() {
    let fx = two_cliques();
    let graph = build(&fx);
    let det = detector();

    for min_size in [2, 3, 4, 5] {
        for ring in det.detect_rings(&graph, min_size) {
            assert!(
                ring.size() >= min_size,
                "ring {} has {} members with min_size {min_size}",
                ring.ring_id,
                ring.size()
            );
        }
    }
    assert!(det.detect_rings(&graph, 5).is_empty());
    assert!(
        det.detect_rings(&graph, 2).iter().any(|r| r.members == vec![9, 10]),
        "the isolated pair is a ring once min_size allows pairs"
    );
}

#[test]
fn every_ring_member_reaches_every_other_member() {
    let fx = two_cliques();
    let graph = build(&fx);

    for ring in detector().detect_rings(&graph, 2) {
        let indices: Vec<usize> = ring
            .members
            .iter()
            .map(|&id| graph.index_of(id).expect("ring member is a graph node"))
            .collect();
        let parts = graph.components_within(&indices);
        assert_eq!(
            parts.len(),
            1,
            "ring {} is split into {} parts inside the graph",
            ring.ring_id,
            parts.len()
        );
    }
}

#[test]
fn detection_is_deterministic() {
    let fx = two_cliques();
    let graph = build(&fx);

    let first = detector().detect_rings(&graph, 3);
    for _ in 0..5 {
        let again = detector().detect_rings(&graph, 3);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&again).unwrap(),
            "ring detection diverged between runs"
        );
    }

    // A rebuilt graph from the same snapshot gives the same rings.
    let rebuilt = build(&fx);
    assert_eq!(detector().detect_rings(&rebuilt, 3), first);
}

#[test]
fn rings_are_ordered_by_fraud_score() {
    let fx = Fixture::new();
    for id in 1..=6 {
        fx.clinic(id, "TX");
    }
    fx.shared_patients("weak", &[1, 2, 3], 5);
    fx.shared_patients("strong", &[4, 5, 6], 20);

    let graph = build(&fx);
    let rings = detector().detect_rings(&graph, 3);
    assert_eq!(rings.len(), 2);
    assert_eq!(rings[0].members, vec![4, 5, 6]);
    assert!(rings[0].fraud_score > rings[1].fraud_score);
    assert_eq!(rings[0].ring_id, "ring-001");
    assert_eq!(rings[1].ring_id, "ring-002");
}

#[test]
fn fraud_score_components_and_bands() {
    let fx = Fixture::new();
    for id in 1..=3 {
        fx.clinic(id, "TX");
    }
    // Mean weight 20 = 4 × min_shared_patients saturates the weight term.
    fx.shared_patients("dense", &[1, 2, 3], 20);

    let det = detector();

    let graph = build(&fx);
    let ring = &det.detect_rings(&graph, 3)[0];
    // 40 density + 30 weight + 0 high-risk.
    assert!((ring.fraud_score - 70.0).abs() < 1e-9, "got {}", ring.fraud_score);
    assert_eq!(ring.suspicion_level, SuspicionLevel::Medium);
    assert_eq!(ring.high_risk_members, 0);

    let scores: HashMap<i64, f64> = [(1, 90.0), (2, 75.0), (3, 75.0)].into_iter().collect();
    let scored_graph = GraphBuilder::new(&EngineConfig::default())
        .unwrap()
        .with_risk_scores(scores)
        .build(&fx.store)
        .unwrap();
    let ring = &det.detect_rings(&scored_graph, 3)[0];
    assert_eq!(ring.high_risk_members, 3);
    assert!((ring.fraud_score - 100.0).abs() < 1e-9);
    assert_eq!(ring.suspicion_level, SuspicionLevel::High);
}

#[test]
fn anchor_is_the_strongest_internal_member() {
    let fx = Fixture::new();
    for id in 1..=4 {
        fx.clinic(id, "TX");
    }
    fx.shared_patients("core", &[1, 2, 3, 4], 6);
    fx.shared_patients("extra", &[2, 3], 10);

    let graph = build(&fx);
    let ring = &detector().detect_rings(&graph, 3)[0];
    assert_eq!(ring.members, vec![1, 2, 3, 4]);
    // 2 and 3 tie on internal weight; the lower id anchors.
    assert_eq!(ring.anchor_provider_id, 2);
}

#[test]
fn empty_graph_has_no_rings() {
    let graph = ProviderGraph::new();
    let det = detector();
    assert!(det.partition(&graph).is_empty());
    assert!(det.detect_rings_default(&graph).is_empty());
}

#[test]
fn ego_network_is_bounded_by_depth() {
    let fx = Fixture::new();
    for id in 1..=4 {
        fx.clinic(id, "TX");
    }
    // Chain 1 - 2 - 3 - 4.
    fx.shared_patients("a", &[1, 2], 5);
    fx.shared_patients("b", &[2, 3], 5);
    fx.shared_patients("c", &[3, 4], 5);

    let graph = build(&fx);
    let det = detector();

    let ego = det.get_ego_network(&graph, 1, 2).expect("provider 1 is in the graph");
    let ids: Vec<i64> = ego.nodes.iter().map(|n| n.provider_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(ego.nodes[0].hops, 0);
    assert_eq!(ego.nodes[2].hops, 2);
    assert_eq!(ego.edges.len(), 2);
    assert!(ego.edges.iter().all(|e| e.source < e.target));

    let whole = det.get_ego_network(&graph, 1, 10).unwrap();
    assert_eq!(whole.nodes.len(), 4);
    assert_eq!(whole.edges.len(), 3);

    assert!(det.get_ego_network(&graph, 99, 2).is_none());
}
