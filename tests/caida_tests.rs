use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;

use chrono::NaiveDate;
use pathdiversity::as_graph_generators::caida::{
    parse_metadata, parse_relationship_records, pick_snapshot, snapshots_from_index,
    write_relationship_records, CAIDAASGraphCollector, CaidaMetadata,
};
use pathdiversity::as_graph_generators::{ASGraphGenerator, FileASGraphGenerator};
use pathdiversity::shared::{EdgeOrientation, ParseError, RelCode, RelationshipRecord};

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pathdiversity_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_tab_delimited_symbolic_codes() {
    let data = b"1\t2\tp2c\n2\t3\tc2p\n3\t4\tp2p\n4\t5\tunknown\n";
    let records = parse_relationship_records(data).unwrap();

    assert_eq!(
        records,
        vec![
            RelationshipRecord::new(1, 2, RelCode::P2c),
            RelationshipRecord::new(2, 3, RelCode::C2p),
            RelationshipRecord::new(3, 4, RelCode::P2p),
            RelationshipRecord::new(4, 5, RelCode::Unknown),
        ]
    );
}

#[test]
fn test_pipe_fallback_with_serial_2_source_field() {
    let data = b"# source:topology|BGP\n# input clique: 174 3356\n174|3356|0|bgp\n174|64512|-1|bgp\n";
    let records = parse_relationship_records(data).unwrap();

    assert_eq!(
        records,
        vec![
            RelationshipRecord::new(174, 3356, RelCode::P2p),
            RelationshipRecord::new(174, 64512, RelCode::P2c),
        ]
    );
}

#[test]
fn test_other_delimiters_fail() {
    let result = parse_relationship_records(b"1,2,-1\n2,3,0\n");
    assert!(matches!(result, Err(ParseError::MissingField { .. })));
}

#[test]
fn test_invalid_asn_is_reported() {
    let result = parse_relationship_records(b"1|AS2|-1\n");
    assert!(matches!(result, Err(ParseError::InvalidAsn { value, .. }) if value == "AS2"));
}

#[test]
fn test_written_file_reads_back_as_same_graph() {
    let records = vec![
        RelationshipRecord::new(1, 2, RelCode::P2c),
        RelationshipRecord::new(3, 1, RelCode::C2p),
        RelationshipRecord::new(2, 3, RelCode::P2p),
    ];
    let metadata = CaidaMetadata {
        tier_1_asns: HashSet::from([1]),
        ixp_asns: HashSet::new(),
    };

    let mut out = Vec::new();
    write_relationship_records(&mut out, &records, &metadata).unwrap();
    let text = String::from_utf8(out).unwrap();

    assert_eq!(text, "# input clique: 1\n1|2|-1\n1|3|-1\n2|3|0\n");
    assert_eq!(parse_metadata(&text), metadata);
}

#[test]
fn test_file_generator_applies_header_and_orientation() {
    let dir = scratch_dir("file_generator");
    let path = dir.join("20240101.as-rel2.txt");
    fs::write(&path, "# input clique: 1\n# IXP ASes: 9\n1|2|-1|bgp\n2|3|-1|bgp\n").unwrap();

    let reversed = FileASGraphGenerator::new(path.clone()).generate().unwrap();
    assert_eq!(reversed.orientation, EdgeOrientation::Reversed);
    assert!(reversed.graph.contains_edge(2, 1));
    assert_eq!(reversed.tier_1_asns, HashSet::from([1]));
    assert_eq!(reversed.ixp_asns, HashSet::from([9]));
    assert!(reversed.validate_orientation([1]).is_ok());

    let recorded = FileASGraphGenerator::new(path)
        .with_orientation(EdgeOrientation::AsRecorded)
        .generate()
        .unwrap();
    assert!(recorded.graph.contains_edge(1, 2));
    assert!(recorded.validate_orientation([1]).is_ok());

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_snapshot_index() {
    let html = r#"<html><body>
        <a href="../">Parent</a>
        <a href="20240101.as-rel2.txt.bz2">20240101.as-rel2.txt.bz2</a>
        <a href="20240201.as-rel2.txt.bz2">20240201.as-rel2.txt.bz2</a>
        <a href="20240201.as-rel.txt.bz2">20240201.as-rel.txt.bz2</a>
        <a href="20231201.as-rel2.txt.bz2">20231201.as-rel2.txt.bz2</a>
    </body></html>"#;
    let snapshots = snapshots_from_index(html);

    assert_eq!(snapshots.len(), 3);
    assert_eq!(snapshots[0].1, "20231201.as-rel2.txt.bz2");

    let mid_january = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
    let (day, name) = pick_snapshot(&snapshots, mid_january).unwrap();
    assert_eq!(*day, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    assert_eq!(name, "20240101.as-rel2.txt.bz2");

    let too_early = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    assert!(pick_snapshot(&snapshots, too_early).is_none());
}

#[test]
fn test_collector_reuses_cached_snapshot() {
    let dir = scratch_dir("collector_cache");
    let collector = CAIDAASGraphCollector::new(3, &dir).with_base_url("http://127.0.0.1:9/".to_string());

    let name = format!("{}.as-rel2.txt.bz2", collector.target_date().format("%Y%m%d"));
    let cached = collector.cached_path(&name);
    assert_eq!(cached.file_name().unwrap(), name.trim_end_matches(".bz2"));
    fs::write(&cached, "1|2|-1\n").unwrap();

    assert_eq!(collector.run().unwrap(), cached);

    fs::remove_dir_all(dir).unwrap();
}

fn compress(data: &[u8]) -> Vec<u8> {
    use std::io::Write;
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

#[test]
fn test_truncated_download_is_not_cached() {
    let dir = scratch_dir("collector_truncated");
    let collector = CAIDAASGraphCollector::new(0, &dir).with_base_url("http://127.0.0.1:9/".to_string());
    let name = format!("{}.as-rel2.txt.bz2", collector.target_date().format("%Y%m%d"));

    let body: String = (1..2000).map(|asn| format!("{}|{}|-1|bgp\n", asn, asn + 1)).collect();
    let archive = compress(body.as_bytes());
    let truncated = &archive[..archive.len() / 2];

    assert!(collector.store_snapshot(&name, truncated).is_err());
    assert!(!collector.cached_path(&name).exists());
    // Nothing cached, so the collector goes back to the (unreachable) index.
    assert!(collector.run().is_err());

    let stored = collector.store_snapshot(&name, &archive).unwrap();
    assert_eq!(fs::read_to_string(&stored).unwrap(), body);
    assert_eq!(collector.run().unwrap(), stored);

    fs::remove_dir_all(dir).unwrap();
}

#[test]
fn test_short_row_inside_tab_file_reports_its_line() {
    let result = parse_relationship_records(b"1\t2\tp2c\n2\t3\tp2p\n3\t4\n4\t5\tp2c\n");
    assert!(matches!(
        result,
        Err(ParseError::MissingField { line: 3, found: 2, .. })
    ));
}

#[test]
fn test_bad_asn_is_reported_before_unknown_code() {
    let result = parse_relationship_records(b"AS1\tAS2\tsibling\n");
    assert!(matches!(result, Err(ParseError::InvalidAsn { line: 1, value }) if value == "AS1"));
}
