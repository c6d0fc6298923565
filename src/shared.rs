use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub type ASN = u32;

/// Label carried by every edge of the AS graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    P2c,
    P2p,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Relationship::P2c => "p2c",
            Relationship::P2p => "p2p",
        };
        write!(f, "{}", s)
    }
}

/// Relationship code as it appears in the third field of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelCode {
    /// Left AS is the provider of the right AS.
    P2c,
    /// Left AS is a customer of the right AS.
    C2p,
    P2p,
    Unknown,
}

/// Every code the graph builder understands. Symbolic codes come from
/// tab-separated exports, numeric ones from CAIDA's pipe-separated files.
pub const RELATIONSHIP_CODES: &[(&str, RelCode)] = &[
    ("p2c", RelCode::P2c),
    ("-1", RelCode::P2c),
    ("c2p", RelCode::C2p),
    ("1", RelCode::C2p),
    ("p2p", RelCode::P2p),
    ("0", RelCode::P2p),
    ("unknown", RelCode::Unknown),
];

impl FromStr for RelCode {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        RELATIONSHIP_CODES
            .iter()
            .find(|(text, _)| *text == code)
            .map(|(_, rel)| *rel)
            .ok_or_else(|| ParseError::UnrecognizedCode(code.to_string()))
    }
}

/// One `(AS-left, AS-right, code)` row of a relationship file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub left: ASN,
    pub right: ASN,
    pub code: RelCode,
}

impl RelationshipRecord {
    pub fn new(left: ASN, right: ASN, code: RelCode) -> Self {
        RelationshipRecord { left, right, code }
    }
}

/// Direction convention of the finished graph.
///
/// `Reversed` flips the edges produced from the raw records, so an outgoing
/// `p2c` edge leads from a customer up to its provider. `AsRecorded` keeps the
/// provider -> customer direction of the dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EdgeOrientation {
    #[default]
    Reversed,
    AsRecorded,
}

impl fmt::Display for EdgeOrientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeOrientation::Reversed => "reversed",
            EdgeOrientation::AsRecorded => "as-recorded",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for EdgeOrientation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reversed" => Ok(EdgeOrientation::Reversed),
            "as-recorded" => Ok(EdgeOrientation::AsRecorded),
            other => Err(format!("unknown orientation '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ASNGroups {
    Tier1,
    StubsOrMh,
    Stubs,
    Multihomed,
    Transit,
    Ixp,
}

impl fmt::Display for ASNGroups {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ASNGroups::Tier1 => "TIER_1",
            ASNGroups::StubsOrMh => "STUBS_OR_MH",
            ASNGroups::Stubs => "STUBS",
            ASNGroups::Multihomed => "MULTIHOMED",
            ASNGroups::Transit => "TRANSIT",
            ASNGroups::Ixp => "IXP",
        };
        write!(f, "{}", s)
    }
}

/// Errors raised while reading input files.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("line {line}: expected at least {expected} fields, found {found}")]
    MissingField {
        line: u64,
        expected: usize,
        found: usize,
    },
    #[error("line {line}: invalid ASN '{value}'")]
    InvalidAsn { line: u64, value: String },
    #[error("unrecognized relationship code '{0}'")]
    UnrecognizedCode(String),
    #[error("line {line}: invalid prefix '{value}'")]
    InvalidPrefix { line: u64, value: String },
}

/// Errors raised by graph queries and sanity checks.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("AS {0} is not in the graph")]
    UnknownAs(ASN),
    #[error("Cycle detected in the provider hierarchy")]
    ProviderCycle,
    #[error("Tier-1 AS {asn} has {providers} providers under the {orientation} orientation")]
    OrientationMismatch {
        asn: ASN,
        providers: usize,
        orientation: EdgeOrientation,
    },
    #[error("Neighbour listings of AS {asn} disagree: {adjacency} adjacent vs {relationships} by relationship")]
    NeighborMismatch {
        asn: ASN,
        adjacency: usize,
        relationships: usize,
    },
}

/// Errors raised while fetching CAIDA snapshots.
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to download {url}: {status}")]
    Status { url: String, status: reqwest::StatusCode },
    #[error("No AS relationship snapshot on or before {0}")]
    NoSnapshot(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
