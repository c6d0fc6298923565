use std::collections::{BTreeSet, HashMap, HashSet};

use log::{debug, info};
use petgraph::algo::is_cyclic_directed;
use petgraph::graphmap::DiGraphMap;
use petgraph::Direction;
use serde::Serialize;

use crate::shared::{ASNGroups, EdgeOrientation, GraphError, RelCode, Relationship, RelationshipRecord};

pub use crate::shared::ASN;

/// Relationship view of a single AS, derived from the graph's edges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AS {
    pub asn: ASN,
    pub peers: BTreeSet<ASN>,
    pub providers: BTreeSet<ASN>,
    pub customers: BTreeSet<ASN>,
    pub tier_1: bool,
    pub ixp: bool,
}

impl AS {
    pub fn new(asn: ASN) -> Self {
        AS {
            asn,
            peers: BTreeSet::new(),
            providers: BTreeSet::new(),
            customers: BTreeSet::new(),
            tier_1: false,
            ixp: false,
        }
    }

    pub fn is_stub(&self) -> bool {
        self.customers.is_empty()
    }

    pub fn is_multihomed(&self) -> bool {
        self.customers.is_empty() && (self.providers.len() + self.peers.len()) > 1
    }

    pub fn is_transit(&self) -> bool {
        !self.customers.is_empty()
    }

    /// Providers and peers: every AS this one can hand traffic to upstream.
    pub fn upstream_asns(&self) -> BTreeSet<ASN> {
        self.providers.union(&self.peers).copied().collect()
    }

    pub fn neighbor_asns(&self) -> BTreeSet<ASN> {
        let mut result = BTreeSet::new();
        result.extend(&self.peers);
        result.extend(&self.providers);
        result.extend(&self.customers);
        result
    }
}

/// Edges of a graph split by relationship label, in graph iteration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeClasses {
    pub p2c: Vec<(ASN, ASN)>,
    pub p2p: Vec<(ASN, ASN)>,
}

/// Directed AS-relationship graph.
#[derive(Debug, Clone, Default)]
pub struct ASGraph {
    pub graph: DiGraphMap<ASN, Relationship>,
    pub orientation: EdgeOrientation,
    /// Tier-1 clique announced in the dataset header, if any.
    pub tier_1_asns: HashSet<ASN>,
    pub ixp_asns: HashSet<ASN>,
}

impl ASGraph {
    pub fn new() -> Self {
        ASGraph::default()
    }

    /// Builds the graph exactly as the records describe it: `p2c` edges point
    /// from provider to customer, peers get one edge each way.
    pub fn build_recorded<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a RelationshipRecord>,
    {
        let mut graph = DiGraphMap::new();
        let mut total = 0usize;
        let mut skipped = 0usize;

        for record in records {
            total += 1;
            match record.code {
                RelCode::Unknown => {
                    skipped += 1;
                }
                RelCode::P2c => {
                    graph.add_edge(record.left, record.right, Relationship::P2c);
                }
                RelCode::C2p => {
                    graph.add_edge(record.right, record.left, Relationship::P2c);
                }
                RelCode::P2p => {
                    graph.add_edge(record.left, record.right, Relationship::P2p);
                    graph.add_edge(record.right, record.left, Relationship::P2p);
                }
            }
        }

        debug!(
            "Built graph from {} records ({} unknown skipped): {} ASes, {} edges",
            total,
            skipped,
            graph.node_count(),
            graph.edge_count()
        );

        ASGraph {
            graph,
            orientation: EdgeOrientation::AsRecorded,
            tier_1_asns: HashSet::new(),
            ixp_asns: HashSet::new(),
        }
    }

    /// Builds the graph and reverses it, so edges follow reachability from a
    /// customer up to its providers.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a RelationshipRecord>,
    {
        Self::from_records_with(records, EdgeOrientation::Reversed)
    }

    pub fn from_records_with<'a, I>(records: I, orientation: EdgeOrientation) -> Self
    where
        I: IntoIterator<Item = &'a RelationshipRecord>,
    {
        let recorded = Self::build_recorded(records);
        let as_graph = match orientation {
            EdgeOrientation::AsRecorded => recorded,
            EdgeOrientation::Reversed => recorded.reversed(),
        };
        info!(
            "AS graph ready ({}): {} ASes, {} edges",
            as_graph.orientation,
            as_graph.node_count(),
            as_graph.edge_count()
        );
        as_graph
    }

    pub fn with_metadata(mut self, tier_1_asns: HashSet<ASN>, ixp_asns: HashSet<ASN>) -> Self {
        self.tier_1_asns = tier_1_asns;
        self.ixp_asns = ixp_asns;
        self
    }

    /// Returns a new graph with every edge flipped and labels kept.
    pub fn reversed(&self) -> Self {
        let mut graph = DiGraphMap::with_capacity(self.graph.node_count(), self.graph.edge_count());
        for asn in self.graph.nodes() {
            graph.add_node(asn);
        }
        for (from, to, rel) in self.graph.all_edges() {
            graph.add_edge(to, from, *rel);
        }

        let orientation = match self.orientation {
            EdgeOrientation::Reversed => EdgeOrientation::AsRecorded,
            EdgeOrientation::AsRecorded => EdgeOrientation::Reversed,
        };

        ASGraph {
            graph,
            orientation,
            tier_1_asns: self.tier_1_asns.clone(),
            ixp_asns: self.ixp_asns.clone(),
        }
    }

    pub fn contains(&self, asn: ASN) -> bool {
        self.graph.contains_node(asn)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn relationship(&self, from: ASN, to: ASN) -> Option<Relationship> {
        self.graph.edge_weight(from, to).copied()
    }

    pub fn edges(&self) -> Vec<(ASN, ASN, Relationship)> {
        self.graph
            .all_edges()
            .map(|(from, to, rel)| (from, to, *rel))
            .collect()
    }

    pub fn successors(&self, asn: ASN) -> Vec<ASN> {
        self.graph.neighbors_directed(asn, Direction::Outgoing).collect()
    }

    pub fn predecessors(&self, asn: ASN) -> Vec<ASN> {
        self.graph.neighbors_directed(asn, Direction::Incoming).collect()
    }

    pub fn out_degree(&self, asn: ASN) -> usize {
        self.graph.neighbors_directed(asn, Direction::Outgoing).count()
    }

    pub fn in_degree(&self, asn: ASN) -> usize {
        self.graph.neighbors_directed(asn, Direction::Incoming).count()
    }

    /// Splits the edge set into provider/customer and peer edges.
    pub fn separate_edges(&self) -> EdgeClasses {
        let mut classes = EdgeClasses::default();
        for (from, to, rel) in self.graph.all_edges() {
            match rel {
                Relationship::P2c => classes.p2c.push((from, to)),
                Relationship::P2p => classes.p2p.push((from, to)),
            }
        }
        classes
    }

    /// Node-induced subgraph over `focal` and `neighbors`. ASNs absent from
    /// the graph are ignored.
    pub fn subgraph(&self, focal: ASN, neighbors: &[ASN]) -> ASGraph {
        let mut wanted: HashSet<ASN> = neighbors.iter().copied().collect();
        wanted.insert(focal);

        let mut graph = DiGraphMap::new();
        for asn in self.graph.nodes().filter(|asn| wanted.contains(asn)) {
            graph.add_node(asn);
        }
        for (from, to, rel) in self.graph.all_edges() {
            if wanted.contains(&from) && wanted.contains(&to) {
                graph.add_edge(from, to, *rel);
            }
        }

        ASGraph {
            graph,
            orientation: self.orientation,
            tier_1_asns: self.tier_1_asns.intersection(&wanted).copied().collect(),
            ixp_asns: self.ixp_asns.intersection(&wanted).copied().collect(),
        }
    }

    /// The AS with the most successors. Ties go to the AS seen last.
    pub fn max_neighbour_node(&self) -> Option<(ASN, Vec<ASN>)> {
        let mut best: Option<(ASN, Vec<ASN>)> = None;
        for asn in self.graph.nodes() {
            let neighbours = self.successors(asn);
            let better = match &best {
                Some((_, current)) => neighbours.len() >= current.len(),
                None => true,
            };
            if better {
                best = Some((asn, neighbours));
            }
        }
        best
    }

    pub fn get_as(&self, asn: ASN) -> Option<AS> {
        if !self.contains(asn) {
            return None;
        }

        let mut as_obj = AS::new(asn);
        as_obj.tier_1 = self.tier_1_asns.contains(&asn);
        as_obj.ixp = self.ixp_asns.contains(&asn);

        let (out_p2c, in_p2c) = match self.orientation {
            EdgeOrientation::Reversed => (&mut as_obj.providers, &mut as_obj.customers),
            EdgeOrientation::AsRecorded => (&mut as_obj.customers, &mut as_obj.providers),
        };

        for to in self.graph.neighbors_directed(asn, Direction::Outgoing) {
            match self.graph.edge_weight(asn, to) {
                Some(Relationship::P2c) => {
                    out_p2c.insert(to);
                }
                Some(Relationship::P2p) => {
                    as_obj.peers.insert(to);
                }
                None => {}
            }
        }
        for from in self.graph.neighbors_directed(asn, Direction::Incoming) {
            match self.graph.edge_weight(from, asn) {
                Some(Relationship::P2c) => {
                    in_p2c.insert(from);
                }
                Some(Relationship::P2p) => {
                    as_obj.peers.insert(from);
                }
                None => {}
            }
        }

        Some(as_obj)
    }

    pub fn iter(&self) -> impl Iterator<Item = AS> + '_ {
        self.graph.nodes().filter_map(move |asn| self.get_as(asn))
    }

    /// Compares the adjacency listing of `asn` with the listing derived from
    /// relationship labels. The two must always agree.
    pub fn neighbor_consistency(&self, asn: ASN) -> Result<usize, GraphError> {
        let as_obj = self.get_as(asn).ok_or(GraphError::UnknownAs(asn))?;
        let adjacency: BTreeSet<ASN> = self.successors(asn).into_iter().collect();

        let mut outgoing: BTreeSet<ASN> = match self.orientation {
            EdgeOrientation::Reversed => as_obj.providers.clone(),
            EdgeOrientation::AsRecorded => as_obj.customers.clone(),
        };
        outgoing.extend(
            as_obj
                .peers
                .iter()
                .copied()
                .filter(|peer| self.graph.contains_edge(asn, *peer)),
        );

        if adjacency != outgoing {
            return Err(GraphError::NeighborMismatch {
                asn,
                adjacency: adjacency.len(),
                relationships: outgoing.len(),
            });
        }
        Ok(adjacency.len())
    }

    /// Fails when the provider/customer edges form a cycle.
    pub fn check_for_cycles(&self) -> Result<(), GraphError> {
        let mut hierarchy: DiGraphMap<ASN, ()> = DiGraphMap::new();
        for (from, to, rel) in self.graph.all_edges() {
            if *rel == Relationship::P2c {
                hierarchy.add_edge(from, to, ());
            }
        }
        if is_cyclic_directed(&hierarchy) {
            return Err(GraphError::ProviderCycle);
        }
        Ok(())
    }

    /// Ground-truth check for the direction convention: a Tier-1 AS has no
    /// providers.
    pub fn validate_orientation<I>(&self, known_tier_1: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = ASN>,
    {
        for asn in known_tier_1 {
            if let Some(as_obj) = self.get_as(asn) {
                if !as_obj.providers.is_empty() {
                    return Err(GraphError::OrientationMismatch {
                        asn,
                        providers: as_obj.providers.len(),
                        orientation: self.orientation,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn asn_groups(&self) -> HashMap<ASNGroups, HashSet<ASN>> {
        let mut groups: HashMap<ASNGroups, HashSet<ASN>> = HashMap::new();
        let ases: Vec<AS> = self.iter().collect();

        let tier_1: HashSet<ASN> = ases.iter().filter(|a| a.tier_1).map(|a| a.asn).collect();
        groups.insert(ASNGroups::Tier1, tier_1);

        let stubs: HashSet<ASN> = ases.iter().filter(|a| a.is_stub()).map(|a| a.asn).collect();
        groups.insert(ASNGroups::Stubs, stubs.clone());

        let multihomed: HashSet<ASN> = ases
            .iter()
            .filter(|a| a.is_multihomed())
            .map(|a| a.asn)
            .collect();
        groups.insert(ASNGroups::Multihomed, multihomed.clone());

        let mut stubs_or_mh = stubs;
        stubs_or_mh.extend(&multihomed);
        groups.insert(ASNGroups::StubsOrMh, stubs_or_mh);

        let transit: HashSet<ASN> = ases.iter().filter(|a| a.is_transit()).map(|a| a.asn).collect();
        groups.insert(ASNGroups::Transit, transit);

        let ixp: HashSet<ASN> = ases.iter().filter(|a| a.ixp).map(|a| a.asn).collect();
        groups.insert(ASNGroups::Ixp, ixp);

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<RelationshipRecord> {
        vec![
            RelationshipRecord::new(100, 200, RelCode::P2c),
            RelationshipRecord::new(200, 300, RelCode::P2c),
            RelationshipRecord::new(100, 300, RelCode::P2p),
        ]
    }

    #[test]
    fn test_reversal_toggles_orientation() {
        let recorded = ASGraph::build_recorded(&records());
        assert_eq!(recorded.orientation, EdgeOrientation::AsRecorded);
        assert_eq!(recorded.reversed().orientation, EdgeOrientation::Reversed);
        assert_eq!(
            recorded.reversed().reversed().orientation,
            EdgeOrientation::AsRecorded
        );
    }

    #[test]
    fn test_as_view_matches_between_orientations() {
        let recorded = ASGraph::build_recorded(&records());
        let reversed = recorded.reversed();

        for asn in [100, 200, 300] {
            assert_eq!(recorded.get_as(asn), reversed.get_as(asn));
        }

        let as200 = reversed.get_as(200).unwrap();
        assert_eq!(as200.providers, BTreeSet::from([100]));
        assert_eq!(as200.customers, BTreeSet::from([300]));
        assert!(as200.peers.is_empty());
    }

    #[test]
    fn test_max_neighbour_tie_goes_to_last() {
        let graph = ASGraph::build_recorded(&[
            RelationshipRecord::new(1, 2, RelCode::P2c),
            RelationshipRecord::new(3, 4, RelCode::P2c),
        ]);
        let (asn, neighbours) = graph.max_neighbour_node().unwrap();
        // 1, 2, 3, 4 in insertion order; 1 and 3 both have one successor.
        assert_eq!(asn, 3);
        assert_eq!(neighbours, vec![4]);
    }
}
