use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::net::IpAddr;
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use ipnetwork::IpNetwork;
use log::{info, warn};
use lru::LruCache;

use crate::shared::{ParseError, ASN};

const CACHE_SIZE: usize = 10_000;

#[derive(Debug, Default)]
struct PrefixNode {
    origin: Option<(IpNetwork, ASN)>,
    left: Option<Box<PrefixNode>>,
    right: Option<Box<PrefixNode>>,
}

/// Bits of an address, left aligned in a u128, and the address width.
fn address_bits(ip: IpAddr) -> (u128, u8) {
    match ip {
        IpAddr::V4(addr) => ((u32::from(addr) as u128) << 96, 32),
        IpAddr::V6(addr) => (u128::from(addr), 128),
    }
}

fn bit_at(bits: u128, index: u8) -> bool {
    (bits >> (127 - index as u32)) & 1 == 1
}

/// Longest-prefix-match table from IP prefixes to origin ASNs.
pub struct PrefixToAs {
    v4_root: PrefixNode,
    v6_root: PrefixNode,
    overrides: HashMap<IpAddr, ASN>,
    cache: Mutex<LruCache<IpAddr, Option<ASN>>>,
}

impl PrefixToAs {
    pub fn new() -> Self {
        let size = NonZeroUsize::new(CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        PrefixToAs {
            v4_root: PrefixNode::default(),
            v6_root: PrefixNode::default(),
            overrides: HashMap::new(),
            cache: Mutex::new(LruCache::new(size)),
        }
    }

    fn clear_cache(&mut self) {
        if let Ok(cache) = self.cache.get_mut() {
            cache.clear();
        }
    }

    pub fn insert(&mut self, prefix: IpNetwork, origin: ASN) {
        let prefix = IpNetwork::new(prefix.network(), prefix.prefix()).unwrap_or(prefix);
        let (bits, _) = address_bits(prefix.network());
        let mut node = match prefix {
            IpNetwork::V4(_) => &mut self.v4_root,
            IpNetwork::V6(_) => &mut self.v6_root,
        };

        for index in 0..prefix.prefix() {
            let child = if bit_at(bits, index) {
                &mut node.right
            } else {
                &mut node.left
            };
            node = child.get_or_insert_with(Box::default).as_mut();
        }
        node.origin = Some((prefix, origin));
        self.clear_cache();
    }

    /// Pins an address to an ASN regardless of the prefix table.
    pub fn add_override(&mut self, ip: IpAddr, origin: ASN) {
        self.overrides.insert(ip, origin);
        self.clear_cache();
    }

    /// Most specific stored prefix covering `ip`.
    pub fn longest_match(&self, ip: IpAddr) -> Option<(IpNetwork, ASN)> {
        let (_, width) = address_bits(ip);
        self.match_within(ip, width)
    }

    fn match_within(&self, ip: IpAddr, max_len: u8) -> Option<(IpNetwork, ASN)> {
        let (bits, _) = address_bits(ip);
        let mut node = match ip {
            IpAddr::V4(_) => &self.v4_root,
            IpAddr::V6(_) => &self.v6_root,
        };

        let mut best = node.origin;
        for index in 0..max_len {
            let child = if bit_at(bits, index) {
                &node.right
            } else {
                &node.left
            };
            match child {
                Some(next) => node = &**next,
                None => break,
            }
            if node.origin.is_some() {
                best = node.origin;
            }
        }
        best
    }

    pub fn lookup(&self, ip: IpAddr) -> Option<ASN> {
        if let Some(&asn) = self.overrides.get(&ip) {
            return Some(asn);
        }

        if let Ok(mut cache) = self.cache.lock() {
            if let Some(result) = cache.get(&ip) {
                return *result;
            }
        }

        let result = self.longest_match(ip).map(|(_, asn)| asn);
        if let Ok(mut cache) = self.cache.lock() {
            cache.put(ip, result);
        }
        result
    }

    /// Origin of the most specific stored prefix that covers all of `prefix`.
    pub fn lookup_prefix(&self, prefix: &IpNetwork) -> Option<ASN> {
        self.match_within(prefix.network(), prefix.prefix())
            .map(|(_, asn)| asn)
    }

    pub fn len(&self) -> usize {
        fn count(node: &PrefixNode) -> usize {
            node.origin.is_some() as usize
                + node.left.as_deref().map_or(0, count)
                + node.right.as_deref().map_or(0, count)
        }
        count(&self.v4_root) + count(&self.v6_root)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads a pfx2as table. Lines are `prefix length asns` or
    /// `prefix/length asns`; of several origins the last one is kept.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self, ParseError> {
        let mut table = PrefixToAs::new();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = index as u64 + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            let (prefix, asns) = match fields.as_slice() {
                [prefix, asns, ..] if prefix.contains('/') => (parse_prefix(prefix, line_no)?, *asns),
                [addr, len, asns, ..] => (parse_split_prefix(addr, len, line_no)?, *asns),
                _ => {
                    return Err(ParseError::MissingField {
                        line: line_no,
                        expected: 3,
                        found: fields.len(),
                    })
                }
            };

            let origin = asns
                .split(|c: char| c == '_' || c == ',')
                .filter(|asn| !asn.is_empty())
                .last()
                .ok_or_else(|| ParseError::InvalidAsn {
                    line: line_no,
                    value: asns.to_string(),
                })?;
            let origin = origin.parse::<ASN>().map_err(|_| ParseError::InvalidAsn {
                line: line_no,
                value: asns.to_string(),
            })?;

            table.insert(prefix, origin);
        }

        Ok(table)
    }

    pub fn load_pfx2as(path: &Path) -> Result<Self, ParseError> {
        let table = Self::from_reader(BufReader::new(File::open(path)?))?;
        info!("Loaded {} prefixes from {:?}", table.len(), path);
        Ok(table)
    }

    /// Adds the `{"ip": asn}` overrides stored in a JSON file.
    pub fn load_overrides_json(&mut self, path: &Path) -> Result<usize, ParseError> {
        let data = std::fs::read_to_string(path)?;
        let map: HashMap<String, ASN> = serde_json::from_str(&data)?;

        let mut added = 0;
        for (ip_str, asn) in map {
            match ip_str.parse::<IpAddr>() {
                Ok(ip) => {
                    self.add_override(ip, asn);
                    added += 1;
                }
                Err(_) => warn!("Skipping override for invalid address '{}'", ip_str),
            }
        }
        Ok(added)
    }
}

impl Default for PrefixToAs {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_prefix(value: &str, line: u64) -> Result<IpNetwork, ParseError> {
    value.parse::<IpNetwork>().map_err(|_| ParseError::InvalidPrefix {
        line,
        value: value.to_string(),
    })
}

fn parse_split_prefix(addr: &str, len: &str, line: u64) -> Result<IpNetwork, ParseError> {
    let invalid = || ParseError::InvalidPrefix {
        line,
        value: format!("{}/{}", addr, len),
    };
    let ip = addr.parse::<IpAddr>().map_err(|_| invalid())?;
    let len = len.parse::<u8>().map_err(|_| invalid())?;
    IpNetwork::new(ip, len).map_err(|_| invalid())
}
