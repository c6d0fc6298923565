use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use log::{error, info, warn};

use pathdiversity::as_graph_generators::caida::{self, CAIDAASGraphCollector};
use pathdiversity::as_graph_generators::{ASGraphGenerator, FileASGraphGenerator, RandomASGraphGenerator};
use pathdiversity::prefix_to_as::PrefixToAs;
use pathdiversity::traceroute::{self, AsPath};
use pathdiversity::{ASGraph, DiversityRun, EdgeOrientation, NeighborSummary, ASN};

#[derive(Parser, Debug)]
#[command(about = "AS-relationship graphs and path diversity analysis", long_about = None)]
struct Args {
    /// Edge direction of the built graph.
    #[arg(long, global = true, default_value_t = EdgeOrientation::Reversed)]
    orientation: EdgeOrientation,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Degree, neighbour and subgraph summary of one AS.
    Neighbors {
        /// AS relationship file.
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        asn: ASN,
        /// Neighbours with at most this many predecessors count as low degree.
        #[arg(long, default_value_t = 600)]
        threshold: usize,
    },
    /// Path diversity of a source AS towards a list of targets.
    Diversity {
        #[arg(short, long)]
        input: PathBuf,
        #[arg(short, long)]
        source: ASN,
        #[arg(short, long, num_args = 1.., required = true)]
        targets: Vec<ASN>,
        /// Output directory for the JSON results.
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
        #[arg(long)]
        no_progress: bool,
    },
    /// Download the CAIDA serial-2 snapshot for a given age.
    Fetch {
        #[arg(long, default_value_t = 10)]
        days_ago: u32,
        #[arg(long)]
        cache_dir: Option<PathBuf>,
    },
    /// Resolve traceroutes to AS paths.
    Aspaths {
        /// RIPE Atlas traceroute results (JSON array).
        #[arg(short, long)]
        traces: PathBuf,
        /// CAIDA pfx2as file.
        #[arg(short, long)]
        pfx2as: PathBuf,
        /// JSON map of IP address to ASN, applied before the prefix table.
        #[arg(long)]
        overrides: Option<PathBuf>,
        /// JSON map of probe id to probe ASN.
        #[arg(long)]
        probe_asns: Option<PathBuf>,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Write a seeded random relationship file.
    Random {
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long, default_value_t = 4)]
        tier1: usize,
        #[arg(long, default_value_t = 10)]
        transit: usize,
        #[arg(long, default_value_t = 16)]
        stubs: usize,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let result = match args.command {
        Command::Neighbors {
            input,
            asn,
            threshold,
        } => run_neighbors(&input, asn, threshold, args.orientation),
        Command::Diversity {
            input,
            source,
            targets,
            output_dir,
            no_progress,
        } => run_diversity(&input, source, targets, output_dir, !no_progress, args.orientation),
        Command::Fetch { days_ago, cache_dir } => run_fetch(days_ago, cache_dir),
        Command::Aspaths {
            traces,
            pfx2as,
            overrides,
            probe_asns,
            output,
        } => run_aspaths(&traces, &pfx2as, overrides.as_deref(), probe_asns.as_deref(), &output),
        Command::Random {
            seed,
            tier1,
            transit,
            stubs,
            output,
        } => run_random(seed, tier1, transit, stubs, &output),
    };

    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

fn load_graph(input: &Path, orientation: EdgeOrientation) -> Result<ASGraph, Box<dyn std::error::Error>> {
    let as_graph = FileASGraphGenerator::new(input.to_path_buf())
        .with_orientation(orientation)
        .generate()?;

    if as_graph.tier_1_asns.is_empty() {
        warn!("No clique in the file header, orientation not validated");
    } else {
        as_graph.validate_orientation(as_graph.tier_1_asns.iter().copied())?;
    }
    Ok(as_graph)
}

fn run_neighbors(
    input: &Path,
    asn: ASN,
    threshold: usize,
    orientation: EdgeOrientation,
) -> Result<(), Box<dyn std::error::Error>> {
    let as_graph = load_graph(input, orientation)?;
    let summary = NeighborSummary::new(&as_graph, asn, threshold)?;
    for line in summary.text_lines() {
        println!("{}", line);
    }

    if let Some((busiest, neighbours)) = as_graph.max_neighbour_node() {
        println!("AS {} has the most neighbours ({})", busiest, neighbours.len());
    }
    let edges = as_graph.separate_edges();
    println!("{} p2c edges, {} p2p edges", edges.p2c.len(), edges.p2p.len());
    Ok(())
}

fn run_diversity(
    input: &Path,
    source: ASN,
    targets: Vec<ASN>,
    output_dir: Option<PathBuf>,
    show_progress: bool,
    orientation: EdgeOrientation,
) -> Result<(), Box<dyn std::error::Error>> {
    let as_graph = load_graph(input, orientation)?;

    let mut run = DiversityRun::new(&as_graph, source, targets).with_progress(show_progress);
    if let Some(dir) = output_dir {
        run = run.with_output_dir(dir);
    }
    let report = run.run()?;

    for line in report.text_lines() {
        println!("{}", line);
    }
    Ok(())
}

fn run_fetch(days_ago: u32, cache_dir: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let cache_dir = match cache_dir {
        Some(dir) => dir,
        None => dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pathdiversity"),
    };
    let path = CAIDAASGraphCollector::new(days_ago, &cache_dir).run()?;
    println!("{}", path.display());
    Ok(())
}

fn run_aspaths(
    traces: &Path,
    pfx2as: &Path,
    overrides: Option<&Path>,
    probe_asns: Option<&Path>,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut resolver = PrefixToAs::load_pfx2as(pfx2as)?;
    if let Some(path) = overrides {
        let added = resolver.load_overrides_json(path)?;
        info!("Loaded {} address overrides", added);
    }

    let probe_asns: HashMap<String, ASN> = match probe_asns {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => HashMap::new(),
    };

    let results = traceroute::load_traceroutes(traces)?;
    info!("Resolving {} traceroutes", results.len());

    let mut viable: BTreeMap<u64, AsPath> = BTreeMap::new();
    let mut unviable = 0usize;
    for trace in &results {
        let probe_asn = probe_asns.get(&trace.prb_id.to_string()).copied();
        let path = traceroute::to_as_path(trace, &resolver, probe_asn);
        if path.is_viable() {
            viable.insert(trace.prb_id, path);
        } else {
            unviable += 1;
        }
    }

    println!(
        "Number of unviable probes: {}, Number of viable probes: {}",
        unviable,
        viable.len()
    );
    if !viable.is_empty() {
        serde_json::to_writer_pretty(File::create(output)?, &viable)?;
        info!("AS paths written to {:?}", output);
    }
    Ok(())
}

fn run_random(
    seed: u64,
    tier1: usize,
    transit: usize,
    stubs: usize,
    output: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let generator = RandomASGraphGenerator::new(seed).with_sizes(tier1, transit, stubs);
    let records = generator.records();
    let metadata = caida::CaidaMetadata {
        tier_1_asns: generator.tier_1_asns(),
        ixp_asns: Default::default(),
    };
    caida::write_relationship_records(File::create(output)?, &records, &metadata)?;
    println!("Wrote {} relationships to {}", records.len(), output.display());
    Ok(())
}
