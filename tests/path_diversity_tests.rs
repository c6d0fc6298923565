use std::collections::BTreeSet;

use pathdiversity::as_graph::ASGraph;
use pathdiversity::path_diversity::{
    all_shortest_paths, classify_targets, diversity_query, diversity_via_candidates, has_path,
    DiversityReport,
};
use pathdiversity::shared::{GraphError, RelCode, RelationshipRecord};

fn p2c(provider: u32, customer: u32) -> RelationshipRecord {
    RelationshipRecord::new(provider, customer, RelCode::P2c)
}

/// Edges exactly as recorded, provider -> customer.
fn recorded(records: &[RelationshipRecord]) -> ASGraph {
    ASGraph::build_recorded(records)
}

#[test]
fn test_end_to_end_example() {
    let as_graph = ASGraph::from_records(&[
        p2c(100, 200),
        p2c(200, 300),
        RelationshipRecord::new(100, 300, RelCode::P2p),
    ]);

    assert!(has_path(&as_graph, 200, 100));
    assert!(has_path(&as_graph, 300, 100));

    let found = diversity_via_candidates(&as_graph, 999, &[200, 300], 100).unwrap();
    assert_eq!(found.intermediates, BTreeSet::from([200, 300]));
    assert_eq!(found.paths, vec![vec![999, 200, 100], vec![999, 300, 100]]);
}

#[test]
fn test_shared_next_hop_is_not_diverse() {
    // 1 -> 2 -> {3, 4} -> 5: two shortest paths, both through 2.
    let as_graph = recorded(&[p2c(1, 2), p2c(2, 3), p2c(2, 4), p2c(3, 5), p2c(4, 5)]);

    assert_eq!(all_shortest_paths(&as_graph, 1, 5).len(), 2);
    assert_eq!(diversity_query(&as_graph, 1, 5, 9), None);
}

#[test]
fn test_split_after_candidate_is_diverse() {
    // 1 -> {2, 3} -> 4
    let as_graph = recorded(&[p2c(1, 2), p2c(1, 3), p2c(2, 4), p2c(3, 4)]);

    let found = diversity_query(&as_graph, 1, 4, 9).unwrap();
    assert_eq!(found.intermediates, BTreeSet::from([2, 3]));
    assert_eq!(found.paths, vec![vec![9, 1, 2, 4], vec![9, 1, 3, 4]]);
}

#[test]
fn test_no_path_returns_none() {
    let as_graph = recorded(&[p2c(1, 2), p2c(3, 4)]);

    assert!(!has_path(&as_graph, 1, 4));
    assert_eq!(diversity_query(&as_graph, 1, 4, 9), None);
    assert_eq!(diversity_query(&as_graph, 77, 4, 9), None);
    assert_eq!(diversity_query(&as_graph, 1, 77, 9), None);
    assert_eq!(diversity_via_candidates(&as_graph, 9, &[1, 3], 77), None);
}

#[test]
fn test_single_candidate_is_never_diverse_when_pooled() {
    let as_graph = recorded(&[p2c(1, 2), p2c(1, 3), p2c(2, 4), p2c(3, 4)]);
    assert_eq!(diversity_via_candidates(&as_graph, 9, &[1, 1], 4), None);
}

#[test]
fn test_shortest_paths_edge_cases() {
    let as_graph = recorded(&[p2c(1, 2)]);

    assert_eq!(all_shortest_paths(&as_graph, 1, 1), vec![vec![1]]);
    assert!(all_shortest_paths(&as_graph, 2, 1).is_empty());
    assert!(all_shortest_paths(&as_graph, 1, 42).is_empty());
}

/// Source 10 buys transit from 20 and 30. 20 buys from 40 and 50, which
/// both buy from 60.
fn upstream_graph() -> ASGraph {
    ASGraph::from_records(&[
        p2c(20, 10),
        p2c(30, 10),
        p2c(40, 20),
        p2c(50, 20),
        p2c(60, 40),
        p2c(60, 50),
    ])
}

#[test]
fn test_classify_targets() {
    let as_graph = upstream_graph();
    let report = classify_targets(&as_graph, 10, &[60, 20]).unwrap();

    assert_eq!(report.providers, BTreeSet::from([20, 30]));
    assert!(report.peers.is_empty());
    assert_eq!(report.improvable_via_providers(), BTreeSet::from([60]));
    assert!(report.improvable_via_peers().is_empty());
    assert_eq!(report.not_improvable(), BTreeSet::from([20]));

    let finding = &report.targets[0];
    assert_eq!(finding.target, 60);
    assert_eq!(finding.via_providers.keys().copied().collect::<Vec<_>>(), vec![20]);
    assert_eq!(finding.via_providers[&20].intermediates, BTreeSet::from([40, 50]));
    // Only provider 20 reaches 60, so pooling gives a single first hop.
    assert_eq!(finding.across_upstreams, None);

    let dump = report.paths_by_target();
    assert_eq!(dump.len(), 1);
    assert_eq!(dump[&60], vec![vec![10, 20, 40, 60], vec![10, 20, 50, 60]]);
}

#[test]
fn test_unknown_source_is_an_error() {
    let as_graph = upstream_graph();
    assert!(matches!(
        DiversityReport::for_source(&as_graph, 4242),
        Err(GraphError::UnknownAs(4242))
    ));
}
