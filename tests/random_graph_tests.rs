use pathdiversity::as_graph_generators::{ASGraphGenerator, RandomASGraphGenerator};
use pathdiversity::shared::{EdgeOrientation, RelCode};

#[test]
fn test_same_seed_same_records() {
    let first = RandomASGraphGenerator::new(42).records();
    let second = RandomASGraphGenerator::new(42).records();
    assert_eq!(first, second);
}

#[test]
fn test_every_as_is_connected() {
    let generator = RandomASGraphGenerator::new(1).with_sizes(3, 5, 8);
    let as_graph = generator.generate().unwrap();

    assert_eq!(as_graph.node_count(), 16);
    for asn in 1..=16 {
        assert!(as_graph.contains(asn));
        assert!(as_graph.out_degree(asn) + as_graph.in_degree(asn) > 0);
    }
}

#[test]
fn test_hierarchy_shape() {
    let generator = RandomASGraphGenerator::new(11).with_peering_probability(0.5);
    let as_graph = generator.generate().unwrap();

    assert!(as_graph.check_for_cycles().is_ok());
    assert!(as_graph.validate_orientation(generator.tier_1_asns()).is_ok());

    let first_stub = (generator.tier_1 + generator.transit) as u32 + 1;
    for asn in first_stub..first_stub + generator.stubs as u32 {
        let as_obj = as_graph.get_as(asn).unwrap();
        assert!(as_obj.is_stub());
        assert!(!as_obj.providers.is_empty());
        assert!(as_obj.providers.len() <= 2);
    }

    for tier_1 in generator.tier_1_asns() {
        let peers = as_graph.get_as(tier_1).unwrap().peers;
        assert!(peers.len() >= generator.tier_1 - 1);
    }
}

#[test]
fn test_stub_links_are_recorded_from_the_customer() {
    let generator = RandomASGraphGenerator::new(5);
    let first_stub = (generator.tier_1 + generator.transit) as u32 + 1;

    for record in generator.records() {
        if record.left >= first_stub {
            assert_eq!(record.code, RelCode::C2p);
        }
    }
}

#[test]
fn test_recorded_orientation() {
    let generator = RandomASGraphGenerator::new(5).with_orientation(EdgeOrientation::AsRecorded);
    let as_graph = generator.generate().unwrap();

    assert_eq!(as_graph.orientation, EdgeOrientation::AsRecorded);
    assert!(as_graph.validate_orientation(generator.tier_1_asns()).is_ok());
}
