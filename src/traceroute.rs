use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::Path;

use ipnetwork::IpNetwork;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::prefix_to_as::PrefixToAs;
use crate::shared::{ParseError, ASN};

lazy_static::lazy_static! {
    /// Address blocks that are never routed on the public internet.
    static ref SPECIAL_PURPOSE_NETWORKS: Vec<IpNetwork> = [
        "0.0.0.0/8",
        "10.0.0.0/8",
        "100.64.0.0/10",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "172.16.0.0/12",
        "192.0.0.0/24",
        "192.0.2.0/24",
        "192.168.0.0/16",
        "198.18.0.0/15",
        "198.51.100.0/24",
        "203.0.113.0/24",
        "240.0.0.0/4",
        "255.255.255.255/32",
        "::/128",
        "::1/128",
        "::ffff:0:0/96",
        "100::/64",
        "2001::/23",
        "2001:db8::/32",
        "fc00::/7",
        "fe80::/10",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect();

    static ref PRIVATE_NETWORKS: Vec<IpNetwork> = [
        "10.0.0.0/8",
        "172.16.0.0/12",
        "192.168.0.0/16",
        "127.0.0.0/8",
        "169.254.0.0/16",
        "fc00::/7",
        "fe80::/10",
        "::1/128",
    ]
    .iter()
    .filter_map(|net| net.parse().ok())
    .collect();
}

pub fn is_global(ip: IpAddr) -> bool {
    !SPECIAL_PURPOSE_NETWORKS.iter().any(|net| net.contains(ip))
}

pub fn is_private(ip: IpAddr) -> bool {
    PRIVATE_NETWORKS.iter().any(|net| net.contains(ip))
}

/// One reply to a traceroute probe packet. Timeouts only carry `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HopReply {
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub rtt: Option<f64>,
    #[serde(default)]
    pub x: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteHop {
    pub hop: u32,
    #[serde(default)]
    pub result: Vec<HopReply>,
    #[serde(default)]
    pub error: Option<String>,
}

impl TracerouteHop {
    /// Address of the first reply, if it parses.
    pub fn first_address(&self) -> Option<IpAddr> {
        self.result.first()?.from.as_deref()?.parse().ok()
    }
}

/// A RIPE Atlas traceroute result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracerouteResult {
    pub msm_id: u64,
    pub prb_id: u64,
    pub dst_addr: String,
    #[serde(default)]
    pub result: Vec<TracerouteHop>,
}

pub fn load_traceroutes(path: &Path) -> Result<Vec<TracerouteResult>, ParseError> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

/// Latency samples of the hops a single AS answered for.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HopStats {
    pub rtts: Vec<f64>,
    pub median_rtt: Option<f64>,
    pub hop_ips: Vec<IpAddr>,
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Groups the RTTs of a trace by responding ASN and hop number. Only global
/// addresses that resolve are counted.
pub fn asn_hops(trace: &TracerouteResult, resolver: &PrefixToAs) -> BTreeMap<ASN, BTreeMap<u32, HopStats>> {
    let mut by_asn: BTreeMap<ASN, BTreeMap<u32, HopStats>> = BTreeMap::new();

    for hop in &trace.result {
        for reply in &hop.result {
            let ip = match reply.from.as_deref().and_then(|from| from.parse::<IpAddr>().ok()) {
                Some(ip) if is_global(ip) => ip,
                _ => continue,
            };
            let asn = match resolver.lookup(ip) {
                Some(asn) => asn,
                None => continue,
            };

            let stats = by_asn.entry(asn).or_default().entry(hop.hop).or_default();
            if let Some(rtt) = reply.rtt {
                stats.rtts.push(rtt);
            }
            if !stats.hop_ips.contains(&ip) {
                stats.hop_ips.push(ip);
            }
        }
    }

    for stats in by_asn.values_mut().flat_map(|hops| hops.values_mut()) {
        stats.median_rtt = median(&stats.rtts);
    }
    by_asn
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AsPathElement {
    Asn(ASN),
    /// `hop-N` marker for a hop that could not be mapped to an AS.
    Unresolved(String),
}

impl AsPathElement {
    pub fn marker(hop: u32) -> Self {
        AsPathElement::Unresolved(format!("hop-{}", hop))
    }
}

impl fmt::Display for AsPathElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsPathElement::Asn(asn) => write!(f, "{}", asn),
            AsPathElement::Unresolved(marker) => write!(f, "{}", marker),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AsPath(pub Vec<AsPathElement>);

impl AsPath {
    pub fn resolved_count(&self) -> usize {
        self.0
            .iter()
            .filter(|element| matches!(element, AsPathElement::Asn(_)))
            .count()
    }

    /// A path is worth analysing once more than three hops resolved.
    pub fn is_viable(&self) -> bool {
        self.resolved_count() > 3
    }

    pub fn cleaned(&self) -> Vec<ASN> {
        self.0
            .iter()
            .filter_map(|element| match element {
                AsPathElement::Asn(asn) => Some(*asn),
                AsPathElement::Unresolved(_) => None,
            })
            .collect()
    }
}

/// Turns a traceroute into an AS-level path, starting at the probe's AS.
pub fn to_as_path(trace: &TracerouteResult, resolver: &PrefixToAs, probe_asn: Option<ASN>) -> AsPath {
    let mut elements = Vec::with_capacity(trace.result.len() + 1);
    if let Some(asn) = probe_asn {
        elements.push(AsPathElement::Asn(asn));
    }

    for hop in &trace.result {
        let marker = AsPathElement::marker(hop.hop);
        let element = match hop.first_address() {
            None => marker,
            Some(ip) if hop.hop == 1 && is_private(ip) => {
                probe_asn.map(AsPathElement::Asn).unwrap_or(marker)
            }
            Some(ip) if is_global(ip) => resolver.lookup(ip).map(AsPathElement::Asn).unwrap_or(marker),
            Some(_) => marker,
        };
        elements.push(element);
    }

    let mut seen = HashSet::new();
    elements.retain(|element| seen.insert(element.clone()));

    debug!(
        "Probe {} msm {}: {} elements, {} resolved",
        trace.prb_id,
        trace.msm_id,
        elements.len(),
        elements.iter().filter(|e| matches!(e, AsPathElement::Asn(_))).count()
    );
    AsPath(elements)
}

fn multiset(path: &[ASN]) -> HashMap<ASN, usize> {
    let mut counts = HashMap::new();
    for &asn in path {
        *counts.entry(asn).or_insert(0) += 1;
    }
    counts
}

/// Drops every path that holds the same ASNs, in any order, as an earlier one.
pub fn dedup_paths(paths: Vec<Vec<ASN>>) -> Vec<Vec<ASN>> {
    let mut kept: Vec<(HashMap<ASN, usize>, Vec<ASN>)> = Vec::new();
    for path in paths {
        let counts = multiset(&path);
        if !kept.iter().any(|(seen, _)| *seen == counts) {
            kept.push((counts, path));
        }
    }
    kept.into_iter().map(|(_, path)| path).collect()
}
