use std::collections::HashSet;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bzip2::read::BzDecoder;
use chrono::{Duration, NaiveDate, Utc};
use log::{debug, info, warn};
use scraper::{Html, Selector};

use crate::shared::{CollectorError, ParseError, RelCode, RelationshipRecord, ASN};

pub const SERIAL_2_URL: &str = "https://publicdata.caida.org/datasets/as-relationships/serial-2/";
const SNAPSHOT_SUFFIX: &str = ".as-rel2.txt.bz2";

/// Header information CAIDA puts in `#` comment lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaidaMetadata {
    pub tier_1_asns: HashSet<ASN>,
    pub ixp_asns: HashSet<ASN>,
}

pub fn parse_metadata(data: &str) -> CaidaMetadata {
    let mut metadata = CaidaMetadata::default();

    for line in data.lines().take_while(|line| line.starts_with('#')) {
        let (target, asns_str) = if let Some(rest) = line.strip_prefix("# input clique:") {
            (&mut metadata.tier_1_asns, rest)
        } else if let Some(rest) = line.strip_prefix("# IXP ASes:") {
            (&mut metadata.ixp_asns, rest)
        } else {
            continue;
        };
        for asn_str in asns_str.split_whitespace() {
            if let Ok(asn) = asn_str.parse::<ASN>() {
                target.insert(asn);
            }
        }
    }

    metadata
}

fn parse_asn(value: &str, line: u64) -> Result<ASN, ParseError> {
    value.trim().parse::<ASN>().map_err(|_| ParseError::InvalidAsn {
        line,
        value: value.to_string(),
    })
}

fn parse_with_delimiter(data: &[u8], delimiter: u8) -> Result<Vec<RelationshipRecord>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .quoting(false)
        .comment(Some(b'#'))
        .from_reader(data);

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let line = row.position().map(|pos| pos.line()).unwrap_or(0);

        if row.len() == 1 && row[0].trim().is_empty() {
            continue;
        }
        if row.len() < 3 {
            return Err(ParseError::MissingField {
                line,
                expected: 3,
                found: row.len(),
            });
        }

        let left = parse_asn(&row[0], line)?;
        let right = parse_asn(&row[1], line)?;
        let code = match row[2].parse::<RelCode>() {
            Ok(code) => code,
            Err(err) => {
                warn!("line {}: {}, record skipped", line, err);
                continue;
            }
        };
        records.push(RelationshipRecord::new(left, right, code));
    }

    Ok(records)
}

/// Parses relationship rows, tab-delimited first and pipe-delimited if a row
/// turns out to have fewer than three fields. Only the first three fields are
/// read. When both attempts fail, the error of the one that read further is
/// returned.
pub fn parse_relationship_records(data: &[u8]) -> Result<Vec<RelationshipRecord>, ParseError> {
    let tab_err = match parse_with_delimiter(data, b'\t') {
        Err(err @ ParseError::MissingField { .. }) => err,
        other => return other,
    };
    let tab_line = match tab_err {
        ParseError::MissingField { line, .. } => line,
        _ => 0,
    };
    debug!("Not tab-delimited (line {}), retrying with '|'", tab_line);

    match parse_with_delimiter(data, b'|') {
        Err(ParseError::MissingField { line, .. }) if line < tab_line => Err(tab_err),
        other => other,
    }
}

pub fn read_relationship_file(
    path: &Path,
) -> Result<(Vec<RelationshipRecord>, CaidaMetadata), ParseError> {
    let data = fs::read(path)?;
    let records = parse_relationship_records(&data)?;
    let metadata = parse_metadata(&String::from_utf8_lossy(&data));
    info!(
        "Read {} relationship records from {:?} ({} clique ASes)",
        records.len(),
        path,
        metadata.tier_1_asns.len()
    );
    Ok((records, metadata))
}

/// Writes records in CAIDA's pipe-delimited numeric format.
pub fn write_relationship_records<W: Write>(
    writer: W,
    records: &[RelationshipRecord],
    metadata: &CaidaMetadata,
) -> std::io::Result<()> {
    let mut writer = BufWriter::new(writer);

    let mut clique: Vec<ASN> = metadata.tier_1_asns.iter().copied().collect();
    clique.sort_unstable();
    if !clique.is_empty() {
        let asns: Vec<String> = clique.iter().map(|asn| asn.to_string()).collect();
        writeln!(writer, "# input clique: {}", asns.join(" "))?;
    }

    for record in records {
        let (left, right, code) = match record.code {
            RelCode::P2c => (record.left, record.right, "-1"),
            RelCode::C2p => (record.right, record.left, "-1"),
            RelCode::P2p => (record.left, record.right, "0"),
            RelCode::Unknown => (record.left, record.right, "unknown"),
        };
        writeln!(writer, "{}|{}|{}", left, right, code)?;
    }
    writer.flush()
}

pub fn decompress_bz2(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = BzDecoder::new(data);
    let mut decompressed = Vec::new();
    std::io::copy(&mut decoder, &mut decompressed)?;
    Ok(decompressed)
}

/// Lists the `(date, file name)` of every snapshot linked from a serial-2
/// directory index.
pub fn snapshots_from_index(html: &str) -> Vec<(NaiveDate, String)> {
    let document = Html::parse_document(html);
    let selector = match Selector::parse("a[href]") {
        Ok(selector) => selector,
        Err(_) => return Vec::new(),
    };

    let mut snapshots: Vec<(NaiveDate, String)> = document
        .select(&selector)
        .filter_map(|element| element.value().attr("href"))
        .filter(|href| href.ends_with(SNAPSHOT_SUFFIX))
        .filter_map(|href| {
            let date = NaiveDate::parse_from_str(href.get(..8)?, "%Y%m%d").ok()?;
            Some((date, href.to_string()))
        })
        .collect();
    snapshots.sort();
    snapshots.dedup();
    snapshots
}

/// Newest snapshot dated on or before `date`.
pub fn pick_snapshot(snapshots: &[(NaiveDate, String)], date: NaiveDate) -> Option<&(NaiveDate, String)> {
    snapshots.iter().filter(|(day, _)| *day <= date).max_by_key(|(day, _)| *day)
}

/// Downloads and caches CAIDA serial-2 AS relationship snapshots.
pub struct CAIDAASGraphCollector {
    days_ago: u32,
    cache_dir: PathBuf,
    base_url: String,
}

impl CAIDAASGraphCollector {
    pub fn new(days_ago: u32, cache_dir: &Path) -> Self {
        CAIDAASGraphCollector {
            days_ago,
            cache_dir: cache_dir.to_path_buf(),
            base_url: SERIAL_2_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    pub fn target_date(&self) -> NaiveDate {
        (Utc::now() - Duration::days(self.days_ago as i64)).date_naive()
    }

    pub fn cached_path(&self, snapshot: &str) -> PathBuf {
        self.cache_dir.join(snapshot.trim_end_matches(".bz2"))
    }

    /// Returns the path of a decompressed snapshot, downloading it if needed.
    pub fn run(&self) -> Result<PathBuf, CollectorError> {
        fs::create_dir_all(&self.cache_dir)?;

        let date = self.target_date();
        let exact = format!("{}{}", date.format("%Y%m%d"), SNAPSHOT_SUFFIX);
        let exact_path = self.cached_path(&exact);
        if exact_path.exists() {
            info!("Using cached CAIDA data from {:?}", exact_path);
            return Ok(exact_path);
        }

        let index = self.download(&self.base_url)?;
        let snapshots = snapshots_from_index(&String::from_utf8_lossy(&index));
        let (_, snapshot) = pick_snapshot(&snapshots, date)
            .ok_or_else(|| CollectorError::NoSnapshot(date.to_string()))?;

        let cached_path = self.cached_path(snapshot);
        if cached_path.exists() {
            info!("Using cached CAIDA data from {:?}", cached_path);
            return Ok(cached_path);
        }

        let url = format!("{}{}", self.base_url, snapshot);
        info!("Downloading CAIDA AS relationships from {}", url);
        let bz2_data = self.download(&url)?;
        self.store_snapshot(snapshot, &bz2_data)
    }

    /// Decompresses a downloaded snapshot into the cache. Nothing is left at
    /// the cache path unless the whole archive decompressed.
    pub fn store_snapshot(&self, snapshot: &str, bz2_data: &[u8]) -> Result<PathBuf, CollectorError> {
        let cached_path = self.cached_path(snapshot);
        let written = decompress_bz2(bz2_data).and_then(|data| fs::write(&cached_path, data));
        if let Err(err) = written {
            if cached_path.exists() {
                fs::remove_file(&cached_path)?;
            }
            return Err(err.into());
        }

        info!("CAIDA data saved to {:?}", cached_path);
        Ok(cached_path)
    }

    fn download(&self, url: &str) -> Result<Vec<u8>, CollectorError> {
        let response = reqwest::blocking::get(url)?;
        if !response.status().is_success() {
            return Err(CollectorError::Status {
                url: url.to_string(),
                status: response.status(),
            });
        }
        Ok(response.bytes()?.to_vec())
    }
}
