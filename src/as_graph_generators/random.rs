use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::as_graph::ASGraph;
use crate::shared::{EdgeOrientation, RelCode, RelationshipRecord, ASN};

use super::ASGraphGenerator;

/// Seeded generator for small internet-like AS hierarchies.
///
/// Tier-1 ASes are numbered from 1 and fully meshed with peer links. Transit
/// ASes follow and buy transit from one or two ASes numbered below them, so
/// the provider hierarchy never has a cycle. Stubs come last and buy transit
/// from transit ASes.
#[derive(Debug, Clone)]
pub struct RandomASGraphGenerator {
    pub tier_1: usize,
    pub transit: usize,
    pub stubs: usize,
    pub peering_probability: f64,
    pub seed: u64,
    pub orientation: EdgeOrientation,
}

impl RandomASGraphGenerator {
    pub fn new(seed: u64) -> Self {
        RandomASGraphGenerator {
            tier_1: 4,
            transit: 10,
            stubs: 16,
            peering_probability: 0.1,
            seed,
            orientation: EdgeOrientation::default(),
        }
    }

    pub fn with_sizes(mut self, tier_1: usize, transit: usize, stubs: usize) -> Self {
        self.tier_1 = tier_1.max(1);
        self.transit = transit;
        self.stubs = stubs;
        self
    }

    pub fn with_peering_probability(mut self, probability: f64) -> Self {
        self.peering_probability = probability.clamp(0.0, 1.0);
        self
    }

    pub fn with_orientation(mut self, orientation: EdgeOrientation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn tier_1_asns(&self) -> HashSet<ASN> {
        (1..=self.tier_1 as ASN).collect()
    }

    pub fn records(&self) -> Vec<RelationshipRecord> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut records = Vec::new();

        let tier_1: Vec<ASN> = (1..=self.tier_1 as ASN).collect();
        for (i, &left) in tier_1.iter().enumerate() {
            for &right in &tier_1[i + 1..] {
                records.push(RelationshipRecord::new(left, right, RelCode::P2p));
            }
        }

        let first_transit = self.tier_1 as ASN + 1;
        let transit: Vec<ASN> = (first_transit..first_transit + self.transit as ASN).collect();
        for (i, &asn) in transit.iter().enumerate() {
            let mut upstream: Vec<ASN> = tier_1.clone();
            upstream.extend(&transit[..i]);
            let count = rng.gen_range(1..=2).min(upstream.len());
            let providers: Vec<ASN> = upstream.choose_multiple(&mut rng, count).copied().collect();
            for &provider in &providers {
                records.push(RelationshipRecord::new(provider, asn, RelCode::P2c));
            }
            for &other in &transit[..i] {
                if !providers.contains(&other) && rng.gen_bool(self.peering_probability) {
                    records.push(RelationshipRecord::new(asn, other, RelCode::P2p));
                }
            }
        }

        let first_stub = first_transit + self.transit as ASN;
        let stub_upstream: &[ASN] = if transit.is_empty() { &tier_1 } else { &transit };
        for asn in first_stub..first_stub + self.stubs as ASN {
            let count = rng.gen_range(1..=2).min(stub_upstream.len());
            for &provider in stub_upstream.choose_multiple(&mut rng, count) {
                // Recorded from the customer's side to exercise c2p rows.
                records.push(RelationshipRecord::new(asn, provider, RelCode::C2p));
            }
        }

        records
    }
}

impl ASGraphGenerator for RandomASGraphGenerator {
    fn generate(&self) -> Result<ASGraph, Box<dyn std::error::Error>> {
        let records = self.records();
        Ok(ASGraph::from_records_with(&records, self.orientation)
            .with_metadata(self.tier_1_asns(), HashSet::new()))
    }
}
