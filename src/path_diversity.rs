use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use log::debug;
use petgraph::algo::has_path_connecting;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::as_graph::ASGraph;
use crate::shared::{GraphError, ASN};

/// Shortest paths that fan out through more than one intermediate AS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDiversity {
    pub intermediates: BTreeSet<ASN>,
    pub paths: Vec<Vec<ASN>>,
}

pub fn has_path(as_graph: &ASGraph, from: ASN, to: ASN) -> bool {
    if !as_graph.contains(from) || !as_graph.contains(to) {
        return false;
    }
    has_path_connecting(&as_graph.graph, from, to, None)
}

/// Every minimum-hop path from `from` to `to`, sorted. Empty when either end
/// is missing or `to` is unreachable.
pub fn all_shortest_paths(as_graph: &ASGraph, from: ASN, to: ASN) -> Vec<Vec<ASN>> {
    if !as_graph.contains(from) || !as_graph.contains(to) {
        return Vec::new();
    }
    if from == to {
        return vec![vec![from]];
    }

    let mut dist: HashMap<ASN, usize> = HashMap::from([(from, 0)]);
    let mut preds: HashMap<ASN, Vec<ASN>> = HashMap::new();
    let mut queue = VecDeque::from([from]);

    while let Some(asn) = queue.pop_front() {
        let depth = dist[&asn];
        if let Some(&target_depth) = dist.get(&to) {
            if depth >= target_depth {
                break;
            }
        }
        for next in as_graph.graph.neighbors_directed(asn, Direction::Outgoing) {
            match dist.get(&next) {
                None => {
                    dist.insert(next, depth + 1);
                    preds.entry(next).or_default().push(asn);
                    queue.push_back(next);
                }
                Some(&next_depth) if next_depth == depth + 1 => {
                    preds.entry(next).or_default().push(asn);
                }
                Some(_) => {}
            }
        }
    }

    if !dist.contains_key(&to) {
        return Vec::new();
    }

    // Walk the predecessor DAG back from the target.
    let mut paths = Vec::new();
    let mut stack = vec![vec![to]];
    while let Some(partial) = stack.pop() {
        let head = match partial.last() {
            Some(&head) => head,
            None => continue,
        };
        if head == from {
            let mut path = partial;
            path.reverse();
            paths.push(path);
            continue;
        }
        if let Some(hops) = preds.get(&head) {
            for &prev in hops {
                let mut extended = partial.clone();
                extended.push(prev);
                stack.push(extended);
            }
        }
    }

    paths.sort();
    paths
}

fn prefixed(source: ASN, path: Vec<ASN>) -> Vec<ASN> {
    let mut full = Vec::with_capacity(path.len() + 1);
    full.push(source);
    full.extend(path);
    full
}

/// Checks whether `source`, reaching `target` through `candidate`, has more
/// than one distinct AS right after the candidate on the shortest paths.
///
/// Paths are returned with `source` prepended. `None` means either no path or
/// no diversity; `source` does not have to be in the graph.
pub fn diversity_query(
    as_graph: &ASGraph,
    candidate: ASN,
    target: ASN,
    source: ASN,
) -> Option<PathDiversity> {
    if !has_path(as_graph, candidate, target) {
        return None;
    }

    let paths: Vec<Vec<ASN>> = all_shortest_paths(as_graph, candidate, target)
        .into_iter()
        .map(|path| prefixed(source, path))
        .collect();
    let intermediates: BTreeSet<ASN> = paths.iter().filter_map(|path| path.get(2).copied()).collect();

    if intermediates.len() > 1 {
        Some(PathDiversity {
            intermediates,
            paths,
        })
    } else {
        None
    }
}

/// Pools the shortest paths of every candidate that reaches `target`. Diverse
/// when more than one distinct AS sits right after `source`.
pub fn diversity_via_candidates(
    as_graph: &ASGraph,
    source: ASN,
    candidates: &[ASN],
    target: ASN,
) -> Option<PathDiversity> {
    let unique: BTreeSet<ASN> = candidates.iter().copied().collect();
    let mut paths = Vec::new();

    for candidate in unique {
        if !has_path(as_graph, candidate, target) {
            continue;
        }
        paths.extend(
            all_shortest_paths(as_graph, candidate, target)
                .into_iter()
                .map(|path| prefixed(source, path)),
        );
    }

    let intermediates: BTreeSet<ASN> = paths.iter().filter_map(|path| path.get(1).copied()).collect();
    if intermediates.len() > 1 {
        Some(PathDiversity {
            intermediates,
            paths,
        })
    } else {
        None
    }
}

/// Findings for one target AS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetDiversity {
    pub target: ASN,
    /// Providers of the source whose shortest paths to the target are diverse.
    pub via_providers: BTreeMap<ASN, PathDiversity>,
    pub via_peers: BTreeMap<ASN, PathDiversity>,
    /// Pooled result across every provider and peer.
    pub across_upstreams: Option<PathDiversity>,
}

impl TargetDiversity {
    pub fn is_improvable(&self) -> bool {
        !self.via_providers.is_empty() || !self.via_peers.is_empty()
    }
}

pub fn assess_target(
    as_graph: &ASGraph,
    source: ASN,
    providers: &BTreeSet<ASN>,
    peers: &BTreeSet<ASN>,
    target: ASN,
) -> TargetDiversity {
    let via_providers: BTreeMap<ASN, PathDiversity> = providers
        .iter()
        .filter_map(|&provider| {
            diversity_query(as_graph, provider, target, source).map(|found| (provider, found))
        })
        .collect();
    let via_peers: BTreeMap<ASN, PathDiversity> = peers
        .iter()
        .filter_map(|&peer| diversity_query(as_graph, peer, target, source).map(|found| (peer, found)))
        .collect();

    let upstreams: Vec<ASN> = providers.union(peers).copied().collect();
    let across_upstreams = diversity_via_candidates(as_graph, source, &upstreams, target);

    debug!(
        "AS {} -> AS {}: {} diverse providers, {} diverse peers",
        source,
        target,
        via_providers.len(),
        via_peers.len()
    );

    TargetDiversity {
        target,
        via_providers,
        via_peers,
        across_upstreams,
    }
}

/// Path-diversity findings for a source AS against a set of targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiversityReport {
    pub source: ASN,
    pub providers: BTreeSet<ASN>,
    pub peers: BTreeSet<ASN>,
    pub targets: Vec<TargetDiversity>,
}

impl DiversityReport {
    /// Report skeleton for `source`, candidates taken from its providers and
    /// peers.
    pub fn for_source(as_graph: &ASGraph, source: ASN) -> Result<Self, GraphError> {
        let as_obj = as_graph.get_as(source).ok_or(GraphError::UnknownAs(source))?;
        Ok(DiversityReport {
            source,
            providers: as_obj.providers,
            peers: as_obj.peers,
            targets: Vec::new(),
        })
    }

    pub fn assess(&mut self, as_graph: &ASGraph, target: ASN) {
        let finding = assess_target(as_graph, self.source, &self.providers, &self.peers, target);
        self.targets.push(finding);
    }

    pub fn improvable_via_providers(&self) -> BTreeSet<ASN> {
        self.targets
            .iter()
            .filter(|t| !t.via_providers.is_empty())
            .map(|t| t.target)
            .collect()
    }

    pub fn improvable_via_peers(&self) -> BTreeSet<ASN> {
        self.targets
            .iter()
            .filter(|t| !t.via_peers.is_empty())
            .map(|t| t.target)
            .collect()
    }

    pub fn not_improvable(&self) -> BTreeSet<ASN> {
        self.targets
            .iter()
            .filter(|t| !t.is_improvable())
            .map(|t| t.target)
            .collect()
    }

    /// Target AS -> every diverse AS path found for it.
    pub fn paths_by_target(&self) -> BTreeMap<ASN, Vec<Vec<ASN>>> {
        let mut dump = BTreeMap::new();
        for finding in self.targets.iter().filter(|t| t.is_improvable()) {
            let paths: BTreeSet<Vec<ASN>> = finding
                .via_providers
                .values()
                .chain(finding.via_peers.values())
                .flat_map(|found| found.paths.iter().cloned())
                .collect();
            dump.insert(finding.target, paths.into_iter().collect());
        }
        dump
    }
}

/// Runs the diversity query for every provider and peer of `source` against
/// each target.
pub fn classify_targets(
    as_graph: &ASGraph,
    source: ASN,
    targets: &[ASN],
) -> Result<DiversityReport, GraphError> {
    let mut report = DiversityReport::for_source(as_graph, source)?;
    for &target in targets {
        report.assess(as_graph, target);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::{RelCode, RelationshipRecord};

    #[test]
    fn test_prefixed_keeps_order() {
        assert_eq!(prefixed(9, vec![1, 2, 3]), vec![9, 1, 2, 3]);
    }

    #[test]
    fn test_shortest_paths_stop_at_minimum_depth() {
        // Reversed graph: 4 -> 2 -> 1, 4 -> 3 -> 1, 4 -> 5 -> 6 -> 1
        let graph = ASGraph::from_records(&[
            RelationshipRecord::new(1, 2, RelCode::P2c),
            RelationshipRecord::new(1, 3, RelCode::P2c),
            RelationshipRecord::new(2, 4, RelCode::P2c),
            RelationshipRecord::new(3, 4, RelCode::P2c),
            RelationshipRecord::new(6, 5, RelCode::P2c),
            RelationshipRecord::new(5, 4, RelCode::P2c),
            RelationshipRecord::new(1, 6, RelCode::P2c),
        ]);
        let paths = all_shortest_paths(&graph, 4, 1);
        assert_eq!(paths, vec![vec![4, 2, 1], vec![4, 3, 1]]);
    }
}
